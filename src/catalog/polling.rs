//! Polling transports: `xhr`/`xhr_send` and `jsonp`/`jsonp_send`

use super::session::{message_frame, open_frame, send_accepted};
use super::{preflight, JAVASCRIPT, PLAIN};
use crate::endpoint::{new_session_id, Endpoints};
use crate::http::ProbeRequest;
use crate::scenario::Scenario;
use crate::verify::{
    expect_404, expect_body_equals, expect_content_type, expect_cors, expect_header_value,
    expect_no_cookie, expect_no_header, expect_not_cached, expect_status, Check,
};

/// Content types `xhr_send` must accept regardless of value
const SEND_CONTENT_TYPES: [&str; 8] = [
    "text/plain",
    "T",
    "application/json",
    "application/xml",
    "",
    "application/json; charset=utf-8",
    "text/xml; charset=utf-8",
    "text/xml",
];

const FORM: &str = "application/x-www-form-urlencoded";

pub(super) fn server_error(message: &str) -> Check {
    Check::empty("500")
        .and(expect_status(500))
        .and(expect_body_equals(message))
}

/// `jsonp_send` success: a plain `ok`
fn jsonp_accepted() -> Check {
    Check::empty("jsonp_send")
        .and(expect_status(200))
        .and(expect_content_type(PLAIN))
        .and(expect_body_equals("ok"))
        .and(expect_not_cached())
}

fn jsonp_body(body: &str) -> Check {
    Check::empty("jsonp")
        .and(expect_status(200))
        .and(expect_content_type(JAVASCRIPT))
        .and(expect_body_equals(body))
        .and(expect_not_cached())
}

fn form_send(url: &str, body: &str) -> ProbeRequest {
    ProbeRequest::post(url).header("Content-Type", FORM).body(body)
}

fn xhr_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let session = echo.session("000", &new_session_id());
    let options = preflight(
        preflight(
            Scenario::new("xhr/options", "xhr and xhr_send answer CORS preflight"),
            &session.transport("xhr"),
            "OPTIONS, POST",
        ),
        &session.transport("xhr_send"),
        "OPTIONS, POST",
    );

    let session = echo.fresh_session();
    let transport = Scenario::new("xhr/transport", "xhr polling delivers sent messages")
        .post(
            &session.transport("xhr"),
            Vec::new(),
            open_frame()
                .and(expect_content_type(JAVASCRIPT))
                .and(expect_cors(None)),
        )
        .post(
            &session.transport("xhr_send"),
            r#"["x"]"#,
            send_accepted()
                .and(expect_content_type(PLAIN))
                .and(expect_cors(None)),
        )
        .post(&session.transport("xhr"), Vec::new(), message_frame(&["x"]));

    let invalid_session = Scenario::new(
        "xhr/invalid_session",
        "xhr_send to a session that was never opened is 404",
    )
    .post(
        &echo.fresh_session().transport("xhr_send"),
        r#"["x"]"#,
        expect_404(),
    );

    let session = echo.fresh_session();
    let invalid_json = Scenario::new(
        "xhr/invalid_json",
        "malformed or empty xhr_send payloads are 500 and leave the session usable",
    )
    .post(&session.transport("xhr"), Vec::new(), open_frame())
    .post(
        &session.transport("xhr_send"),
        r#"["x"#,
        server_error("Broken JSON encoding."),
    )
    .post(
        &session.transport("xhr_send"),
        Vec::new(),
        server_error("Payload expected."),
    )
    .post(&session.transport("xhr_send"), r#"["a"]"#, send_accepted())
    .post(&session.transport("xhr"), Vec::new(), message_frame(&["a"]));

    let session = echo.fresh_session();
    let mut content_types = Scenario::new(
        "xhr/content_types",
        "xhr_send ignores the request content type",
    )
    .post(&session.transport("xhr"), Vec::new(), open_frame());
    for content_type in SEND_CONTENT_TYPES {
        content_types = content_types.probe(
            ProbeRequest::post(session.transport("xhr_send"))
                .header("Content-Type", content_type)
                .body(r#"["a"]"#),
            send_accepted(),
        );
    }
    let expected = vec!["a"; SEND_CONTENT_TYPES.len()];
    content_types = content_types.post(
        &session.transport("xhr"),
        Vec::new(),
        message_frame(&expected),
    );

    let session = echo.fresh_session();
    let request_headers = Scenario::new(
        "xhr/request_headers_cors",
        "Access-Control-Request-Headers is echoed as Access-Control-Allow-Headers",
    )
    .probe(
        ProbeRequest::post(session.transport("xhr"))
            .header("Access-Control-Request-Headers", "a, b, c"),
        open_frame()
            .and(expect_cors(None))
            .and(expect_header_value("access-control-allow-headers", "a, b, c")),
    )
    .probe(
        ProbeRequest::post(echo.fresh_session().transport("xhr"))
            .header("Access-Control-Request-Headers", ""),
        open_frame().and(expect_no_header("access-control-allow-headers")),
    )
    .post(
        &echo.fresh_session().transport("xhr"),
        Vec::new(),
        open_frame().and(expect_no_header("access-control-allow-headers")),
    );

    vec![
        options,
        transport,
        invalid_session,
        invalid_json,
        content_types,
        request_headers,
    ]
}

fn jsonp_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let session = echo.fresh_session();
    let transport = Scenario::new("jsonp/transport", "jsonp polling wraps frames in the callback")
        .get(
            &session.transport("jsonp?c=%63allback"),
            jsonp_body("callback(\"o\");\r\n").and(expect_no_cookie()),
        )
        .probe(
            form_send(&session.transport("jsonp_send"), "d=%5B%22x%22%5D"),
            jsonp_accepted(),
        )
        .get(
            &session.transport("jsonp?c=%63allback"),
            jsonp_body("callback(\"a[\\\"x\\\"]\");\r\n"),
        );

    let no_callback = Scenario::new(
        "jsonp/no_callback",
        "jsonp without a callback parameter is 500",
    )
    .get(
        &echo.session("a", "a").transport("jsonp"),
        server_error("\"callback\" parameter required"),
    );

    let session = echo.fresh_session();
    let send = session.transport("jsonp_send");
    let invalid_json = Scenario::new(
        "jsonp/invalid_json",
        "malformed or empty jsonp_send payloads are 500 and leave the session usable",
    )
    .get(&session.transport("jsonp?c=x"), jsonp_body("x(\"o\");\r\n"))
    .probe(form_send(&send, "d=%5B%22x"), server_error("Broken JSON encoding."))
    .probe(form_send(&send, ""), server_error("Payload expected."))
    .probe(form_send(&send, "d="), server_error("Payload expected."))
    .probe(form_send(&send, "p=p"), server_error("Payload expected."))
    .probe(form_send(&send, "d=%5B%22b%22%5D"), jsonp_accepted())
    .get(
        &session.transport("jsonp?c=x"),
        jsonp_body("x(\"a[\\\"b\\\"]\");\r\n"),
    );

    let session = echo.fresh_session();
    let send = session.transport("jsonp_send");
    let content_types = Scenario::new(
        "jsonp/content_types",
        "jsonp_send takes form-encoded and plain bodies",
    )
    .get(&session.transport("jsonp?c=x"), jsonp_body("x(\"o\");\r\n"))
    .probe(form_send(&send, "d=%5B%22abc%22%5D"), jsonp_accepted())
    .probe(
        ProbeRequest::post(send.clone())
            .header("Content-Type", "text/plain")
            .body(r#"["%61bc"]"#),
        jsonp_accepted(),
    )
    .get(
        &session.transport("jsonp?c=x"),
        jsonp_body("x(\"a[\\\"abc\\\",\\\"%61bc\\\"]\");\r\n"),
    );

    vec![transport, no_callback, invalid_json, content_types]
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let mut scenarios = xhr_scenarios(endpoints);
    scenarios.extend(jsonp_scenarios(endpoints));
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Headers, NormalizedResponse};

    #[test]
    fn test_jsonp_body_check() {
        let headers: Headers = [
            ("Content-Type", "application/javascript; charset=UTF-8"),
            ("Cache-Control", "no-store, no-cache, no-transform, must-revalidate, max-age=0"),
        ]
        .into_iter()
        .collect();
        let resp = NormalizedResponse::new(
            200,
            headers,
            b"callback(\"a[\\\"x\\\"]\");\r\n".to_vec(),
        );
        assert_eq!(
            jsonp_body("callback(\"a[\\\"x\\\"]\");\r\n").evaluate(&resp),
            vec![]
        );
    }

    #[test]
    fn test_content_type_scenario_expects_every_message() {
        let endpoints = Endpoints::from_root("http://localhost:8081").unwrap();
        let scenarios = scenarios(&endpoints);
        let content_types = scenarios
            .iter()
            .find(|s| s.name == "xhr/content_types")
            .unwrap();
        // open, one send per content type, final poll
        assert_eq!(content_types.steps().len(), SEND_CONTENT_TYPES.len() + 2);
    }
}
