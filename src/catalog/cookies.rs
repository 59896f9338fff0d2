//! `JSESSIONID` handling on the cookie-needed service

use super::session::{message_frame, open_frame};
use super::JSON;
use crate::endpoint::Endpoints;
use crate::error::AssertionFailure;
use crate::http::ProbeRequest;
use crate::scenario::Scenario;
use crate::verify::{
    expect_content_type, expect_cookie_value, expect_json_info, expect_no_cookie, expect_status,
    Check, Findings,
};

const JSESSIONID: &str = "JSESSIONID";

/// Value the server picks when the client sent none
const DUMMY: &str = "dummy";

/// `JSESSIONID=<value>; path=/`
pub fn jsessionid(value: &str) -> Check {
    let path = Check::rule("path", |resp| {
        let path = resp.cookie(JSESSIONID).and_then(|c| c.attribute("path"));
        match path {
            Some("/") => Ok(()),
            other => Err(AssertionFailure::new(
                "path",
                "path=/",
                other.map(|p| format!("path={}", p)).unwrap_or_else(|| "<absent>".into()),
            )),
        }
    });
    Check::empty("jsessionid")
        .and(expect_cookie_value(JSESSIONID, value))
        .and(path)
}

fn streaming_scenario(
    endpoints: &Endpoints,
    name: &str,
    method: &'static str,
    transport: &str,
    first_line: &'static [u8],
) -> Scenario {
    let url = endpoints.cookie_needed.fresh_session().transport(transport);
    Scenario::new(name, format!("{} sets JSESSIONID on the streaming response", transport))
        .interact("stream", move |ctx| {
            let url = url.clone();
            async move {
                let mut findings = Findings::new();
                let mut resp = ctx.stream(method, &url, &[]).await?;
                findings.check(
                    &expect_status(200).and(jsessionid(DUMMY)),
                    &resp.head_response(),
                );
                let read = resp.read_until(first_line, ctx.stream_wait()).await?;
                findings.expect(
                    read.is_some(),
                    "first_frame",
                    "body begins streaming",
                    "nothing before timeout or end of body",
                );
                Ok(findings)
            }
        })
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let cookie_needed = &endpoints.cookie_needed;

    let info = Scenario::new(
        "cookie/info",
        "/info on the cookie-needed service asks for cookies without setting one",
    )
    .get(
        &cookie_needed.url("/info"),
        Check::empty("info")
            .and(expect_status(200))
            .and(expect_content_type(JSON))
            .and(expect_no_cookie())
            .and(expect_json_info(|info| {
                if info.cookie_needed {
                    Ok(())
                } else {
                    Err(AssertionFailure::new("cookie_needed", "true", "false"))
                }
            })),
    );

    let xhr = Scenario::new(
        "cookie/xhr",
        "xhr sets a dummy JSESSIONID and echoes a supplied one",
    )
    .post(
        &cookie_needed.fresh_session().transport("xhr"),
        Vec::new(),
        open_frame().and(jsessionid(DUMMY)),
    )
    .probe(
        ProbeRequest::post(cookie_needed.fresh_session().transport("xhr"))
            .header("Cookie", "JSESSIONID=abcdef"),
        open_frame().and(jsessionid("abcdef")),
    );

    let session = cookie_needed.fresh_session();
    let jsonp = Scenario::new("cookie/jsonp", "jsonp sets JSESSIONID")
        .get(
            &session.transport("jsonp?c=x"),
            expect_status(200).and(jsessionid(DUMMY)),
        )
        .probe(
            ProbeRequest::post(session.transport("jsonp_send"))
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body("d=%5B%22x%22%5D"),
            expect_status(200).and(jsessionid(DUMMY)),
        );

    let session = cookie_needed.fresh_session();
    let (poll, send) = (session.transport("xhr"), session.transport("xhr_send"));
    let jar = Scenario::new(
        "cookie/jar",
        "the scenario jar replays the server's JSESSIONID on later requests",
    )
    .interact("round trip", move |ctx| {
        let (poll, send) = (poll.clone(), send.clone());
        async move {
            let mut findings = Findings::new();
            let opened = ctx.http.post(&poll, &[], Vec::new()).await?;
            findings.check(&jsessionid(DUMMY), &opened);
            findings.expect_eq(
                "jar",
                Some(DUMMY.to_string()),
                ctx.jar.get(JSESSIONID).map(|c| c.value),
            );

            let sent = ctx.http.post(&send, &[], r#"["a"]"#).await?;
            findings.check(&expect_status(204).and(jsessionid(DUMMY)), &sent);
            let polled = ctx.http.post(&poll, &[], Vec::new()).await?;
            findings.check(&message_frame(&["a"]), &polled);
            Ok(findings)
        }
    });

    vec![
        info,
        xhr,
        jsonp,
        jar,
        streaming_scenario(endpoints, "cookie/xhr_streaming", "POST", "xhr_streaming", b"\n"),
        streaming_scenario(endpoints, "cookie/eventsource", "GET", "eventsource", b"\r\n"),
        streaming_scenario(
            endpoints,
            "cookie/htmlfile",
            "GET",
            "htmlfile?c=%63allback",
            b"</script>\r\n",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Headers, NormalizedResponse};

    fn with_cookie(set_cookie: &str) -> NormalizedResponse {
        let headers: Headers = [("Set-Cookie", set_cookie)].into_iter().collect();
        NormalizedResponse::new(200, headers, Vec::new())
    }

    #[test]
    fn test_jsessionid_check() {
        assert!(jsessionid("dummy")
            .verify(&with_cookie("JSESSIONID=dummy; path=/"))
            .is_ok());

        let failures = jsessionid("dummy").evaluate(&with_cookie("JSESSIONID=dummy"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "jsessionid/path");

        let failures = jsessionid("abcdef").evaluate(&with_cookie("JSESSIONID=dummy; Path=/"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "jsessionid/set-cookie");
    }
}
