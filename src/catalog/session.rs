//! Session URLs and the session lifecycle

use std::time::Duration;

use crate::config::Config;
use crate::endpoint::{new_session_id, Endpoints};
use crate::error::TransportError;
use crate::http::ProbeRequest;
use crate::protocol::{SockJsFrame, CLOSE_ANOTHER_CONNECTION, CLOSE_GO_AWAY};
use crate::scenario::Scenario;
use crate::verify::{
    each, exactly_one, expect_404, expect_frame, expect_no_body, expect_status, Check, Findings,
};
use tracing::debug;

/// Session parts that must be accepted as `<server_id>/<session_id>`
const ANY_VALUE: [&str; 4] = ["/a/a", "/_/_", "/1/1", "/abcdefgh_i-j%20/abcdefg_i-j%20"];

/// Session parts that must be rejected
const INVALID_PATHS: [&str; 6] = ["//", "/a./a", "/a/a.", "/./.", "/", "///"];

/// How long a poll is given to park before the competing one is sent
const PARK_DELAY: Duration = Duration::from_millis(250);

pub fn open_frame() -> Check {
    Check::empty("open")
        .and(expect_status(200))
        .and(expect_frame(SockJsFrame::Open))
}

pub fn message_frame(messages: &[&str]) -> Check {
    Check::empty("messages")
        .and(expect_status(200))
        .and(expect_frame(SockJsFrame::Messages(
            messages.iter().map(|m| m.to_string()).collect(),
        )))
}

pub fn close_frame((code, reason): (u16, &str)) -> Check {
    Check::empty("close")
        .and(expect_status(200))
        .and(expect_frame(SockJsFrame::close(code, reason)))
}

pub fn send_accepted() -> Check {
    Check::empty("send")
        .and(expect_status(204))
        .and(expect_no_body())
}

pub(super) fn scenarios(config: &Config, endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let mut any_value = Scenario::new(
        "session/any_value",
        "any non-empty, dot-free server and session id is accepted",
    );
    for part in ANY_VALUE {
        any_value = any_value.post(&echo.url(&format!("{}/xhr", part)), Vec::new(), open_frame());
    }

    let invalid_paths = Scenario::new(
        "session/invalid_paths",
        "empty or dotted server and session ids are 404",
    )
    .concurrent(
        INVALID_PATHS
            .iter()
            .flat_map(|part| {
                let url = echo.url(&format!("{}/xhr", part));
                [ProbeRequest::get(url.clone()), ProbeRequest::post(url)]
            })
            .collect(),
        vec![each(expect_404())],
    );

    let session_id = new_session_id();
    let ignoring_server_id = Scenario::new(
        "session/ignoring_server_id",
        "the server id part does not select the session",
    )
    .post(&echo.session("000", &session_id).transport("xhr"), Vec::new(), open_frame())
    .post(
        &echo.session("000", &session_id).transport("xhr_send"),
        r#"["a"]"#,
        send_accepted(),
    )
    .post(
        &echo.session("999", &session_id).transport("xhr"),
        Vec::new(),
        message_frame(&["a"]),
    );

    let session = echo.fresh_session();
    let simple = Scenario::new("protocol/simple_session", "open, send, receive on one session")
        .post(&session.transport("xhr"), Vec::new(), open_frame())
        .post(&session.transport("xhr_send"), r#"["a"]"#, send_accepted())
        .post(&session.transport("xhr"), Vec::new(), message_frame(&["a"]))
        .post(
            &echo.session("000", "bad_session").transport("xhr_send"),
            r#"["a"]"#,
            expect_404(),
        );

    let session = echo.fresh_session();
    let (poll, send) = (session.transport("xhr"), session.transport("xhr_send"));
    let single_flight = Scenario::new(
        "protocol/single_flight",
        "a second concurrent poll on a session is refused with 2010 or queued",
    )
    .post(&poll, Vec::new(), open_frame())
    .interact("race two polls", move |ctx| {
        let (poll, send) = (poll.clone(), send.clone());
        async move {
            let mut findings = Findings::new();
            let first = ctx.http.spawn_post(&poll, &[], Vec::new());
            tokio::time::sleep(PARK_DELAY).await;
            let second = ctx.http.spawn_post(&poll, &[], Vec::new());
            tokio::time::sleep(PARK_DELAY).await;

            // release the parked poll
            let sent = ctx.http.post(&send, &[], r#"["x"]"#).await?;
            findings.check(&send_accepted(), &sent);

            let mut answered = Vec::new();
            for (name, handle) in [("first", first), ("second", second)] {
                match handle.join_within(ctx.stream_wait()).await {
                    Ok(Some(resp)) => answered.push(resp),
                    Ok(None) | Err(TransportError::Timeout { .. }) => {
                        debug!(poll = name, "poll still held, treating it as queued");
                    }
                    Err(e) => return Err(e),
                }
            }

            let delivered = exactly_one(message_frame(&["x"]).labelled("delivered"));
            findings.extend(delivered.evaluate(&answered));
            if answered.len() == 2 {
                let refusal = exactly_one(close_frame(CLOSE_ANOTHER_CONNECTION).labelled("refused"));
                findings.extend(refusal.evaluate(&answered));
            }
            Ok(findings)
        }
    });

    let session = endpoints.close.fresh_session();
    let close_session = Scenario::new(
        "protocol/close_session",
        "a closed session answers every poll with the close frame",
    )
    .post(&session.transport("xhr"), Vec::new(), open_frame())
    .post(&session.transport("xhr"), Vec::new(), close_frame(CLOSE_GO_AWAY))
    .concurrent(
        vec![
            ProbeRequest::post(session.transport("xhr")),
            ProbeRequest::post(session.transport("xhr")),
        ],
        vec![each(close_frame(CLOSE_GO_AWAY))],
    );

    let session = echo.fresh_session();
    let timeout = Scenario::new(
        "protocol/session_timeout",
        "a session with no receiver expires after the timeout window",
    )
    .post(&session.transport("xhr"), Vec::new(), open_frame())
    .post(&session.transport("xhr_send"), r#"["a"]"#, send_accepted())
    .pace(config.expiry_pause())
    .post(&session.transport("xhr_send"), r#"["b"]"#, expect_404());

    vec![
        any_value,
        invalid_paths,
        ignoring_server_id,
        simple,
        single_flight,
        close_session,
        timeout,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Headers, NormalizedResponse};

    fn body(status: u16, text: &str) -> NormalizedResponse {
        NormalizedResponse::new(status, Headers::new(), text.as_bytes().to_vec())
    }

    #[test]
    fn test_frame_checks() {
        assert!(open_frame().verify(&body(200, "o\n")).is_ok());
        assert!(message_frame(&["a"]).verify(&body(200, "a[\"a\"]\n")).is_ok());
        assert!(close_frame(CLOSE_GO_AWAY)
            .verify(&body(200, "c[3000,\"Go away!\"]\n"))
            .is_ok());
        assert!(send_accepted().verify(&body(204, "")).is_ok());
        assert!(send_accepted().verify(&body(200, "ok")).is_err());
    }

    #[test]
    fn test_timeout_scenario_paces_past_window() {
        let config = Config {
            session_timeout_secs: 2,
            ..Config::default()
        };
        let endpoints = Endpoints::from_root("http://localhost:8081").unwrap();
        let scenarios = scenarios(&config, &endpoints);
        let timeout = scenarios
            .iter()
            .find(|s| s.name == "protocol/session_timeout")
            .unwrap();
        assert!(timeout
            .steps()
            .iter()
            .any(|step| step.label() == "pace 3s"));
    }
}
