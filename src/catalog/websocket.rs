//! The `websocket` session transport and the raw `/websocket` endpoint

use crate::endpoint::Endpoints;
use crate::error::{AssertionFailure, HandshakeError, TransportError};
use crate::http::ProbeRequest;
use crate::protocol::{SockJsFrame, CLOSE_GO_AWAY};
use crate::scenario::{Scenario, ScenarioContext};
use crate::verify::{expect_405, expect_body_matches, expect_status, Check, Findings};
use crate::ws::{Frame, HandshakeRequest, OpenSocket, Received, WireFrame};

/// Versions a server must upgrade for
const VERSIONS: [&str; 3] = ["7", "8", "13"];

/// Bytes per fragment in the fragmented-message scenario
const FRAGMENT_LEN: usize = 2;

const RAW_ECHO: &str = "Hello world!\u{ffff}";

fn bad_request(message: &str) -> Check {
    Check::empty("400")
        .and(expect_status(400))
        .and(expect_body_matches(&regex::escape(message)))
}

/// Handshake; an unexpected rejection is a finding, not an abort
async fn open(
    ctx: &ScenarioContext,
    url: &str,
    findings: &mut Findings,
) -> Result<Option<OpenSocket>, TransportError> {
    match ctx.websocket(url).await {
        Ok(socket) => Ok(Some(socket)),
        Err(HandshakeError::Transport(e)) => Err(e),
        Err(e) => {
            findings.push(AssertionFailure::new("handshake", "101", e.to_string()));
            Ok(None)
        }
    }
}

fn expect_text(findings: &mut Findings, rule: &str, expected: &str, received: Received) {
    match received {
        Received::Frame(Frame::Text(text)) if text == expected => {}
        other => findings.push(AssertionFailure::new(
            rule,
            format!("text {:?}", expected),
            format!("{:?}", other),
        )),
    }
}

/// The server closed the socket, with or without a close frame
fn expect_closed(findings: &mut Findings, rule: &str, received: Received) {
    match received {
        Received::Closed | Received::Frame(Frame::Close(..)) => {}
        other => findings.push(AssertionFailure::new(
            rule,
            "connection closed",
            format!("{:?}", other),
        )),
    }
}

fn http_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let url = endpoints.echo.fresh_session().transport("websocket");

    let http_errors = Scenario::new(
        "websocket/http_errors",
        "plain HTTP requests to the websocket URL are refused",
    )
    .get(&url, bad_request("Can \"Upgrade\" only to \"WebSocket\"."))
    .probe(
        ProbeRequest::get(url.clone())
            .header("Upgrade", "WebSocket")
            .header("Connection", "close"),
        bad_request("\"Connection\" must be \"Upgrade\"."),
    );

    let http_method = Scenario::new(
        "websocket/http_method",
        "POST to the websocket URL is 405 with or without upgrade headers",
    )
    .post(&url, Vec::new(), expect_405())
    .probe(
        ProbeRequest::post(url.clone())
            .header("Upgrade", "WebSocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13"),
        expect_405(),
    );

    vec![http_errors, http_method]
}

fn handshake_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let url = endpoints.echo.fresh_session().ws();
    let headers_sanity = Scenario::new(
        "websocket/headers_sanity",
        "every supported version upgrades with a bodiless 101",
    )
    .interact("handshake per version", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            for version in VERSIONS {
                let request = HandshakeRequest::standard()
                    .version(version)
                    .header("Origin", "http://asdf/");
                match ctx.raw_websocket(&url, request).await {
                    Ok(socket) => findings.expect(
                        !socket.head().headers.contains("content-length"),
                        &format!("version {}/content-length", version),
                        "absent",
                        "present",
                    ),
                    Err(HandshakeError::Transport(e)) => return Err(e),
                    Err(e) => findings.push(AssertionFailure::new(
                        format!("version {}/handshake", version),
                        "101",
                        e.to_string(),
                    )),
                }
            }
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let firefox = Scenario::new(
        "websocket/firefox_connection_header",
        "`Connection: keep-alive, Upgrade` is accepted",
    )
    .interact("handshake", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let request = HandshakeRequest::standard().header("Connection", "keep-alive, Upgrade");
            match ctx.raw_websocket(&url, request).await {
                Ok(mut socket) => {
                    let received = socket.recv(ctx.stream_wait()).await?;
                    expect_text(&mut findings, "open", "o", received);
                }
                Err(HandshakeError::Transport(e)) => return Err(e),
                Err(e) => findings.push(AssertionFailure::new("handshake", "101", e.to_string())),
            }
            Ok(findings)
        }
    });

    let url = endpoints.wsoff.fresh_session().ws();
    let disabled = Scenario::new(
        "websocket/disabled",
        "a service with websockets off answers the upgrade with 404",
    )
    .interact("handshake", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            match ctx.websocket(&url).await {
                Err(HandshakeError::Transport(e)) => return Err(e),
                Err(e) => findings.expect_eq("rejected", Some(404), e.status()),
                Ok(_) => findings.push(AssertionFailure::new("rejected", "404", "101")),
            }
            Ok(findings)
        }
    });

    vec![headers_sanity, firefox, disabled]
}

fn session_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let url = endpoints.echo.fresh_session().ws();
    let transport = Scenario::new("websocket/transport", "open frame, then echo")
        .interact("echo", move |ctx| {
            let url = url.clone();
            async move {
                let mut findings = Findings::new();
                let wait = ctx.stream_wait();
                let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                    return Ok(findings);
                };
                expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
                socket.send_text(r#"["a"]"#).await?;
                expect_text(&mut findings, "message", r#"a["a"]"#, socket.recv_text(wait).await?);
                socket.close(1000, "").await?;
                Ok(findings)
            }
        });

    let url = endpoints.close.fresh_session().ws();
    let close = Scenario::new(
        "websocket/close",
        "the close service sends the close frame and drops the socket",
    )
    .interact("receive close", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
            let (code, reason) = CLOSE_GO_AWAY;
            let close = SockJsFrame::close(code, reason).encode();
            expect_text(&mut findings, "close", &close, socket.recv_text(wait).await?);
            expect_closed(&mut findings, "closed", socket.recv_text(wait).await?);
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let empty = Scenario::new(
        "websocket/empty_frame",
        "empty messages are ignored without closing the session",
    )
    .interact("send empty frames", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
            socket.send_text("").await?;
            socket.send_text("[]").await?;
            socket.send_text(r#"["a"]"#).await?;
            expect_text(&mut findings, "message", r#"a["a"]"#, socket.recv_text(wait).await?);
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let reuse = Scenario::new(
        "websocket/reuse_session_id",
        "two sockets on one session URL are independent sessions",
    )
    .interact("two sockets", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut first) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            let Some(mut second) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "first/open", "o", first.recv_text(wait).await?);
            expect_text(&mut findings, "second/open", "o", second.recv_text(wait).await?);

            first.send_text(r#"["a"]"#).await?;
            second.send_text(r#"["b"]"#).await?;
            let received = first.recv_text(wait).await?;
            expect_text(&mut findings, "first/message", r#"a["a"]"#, received);
            let received = second.recv_text(wait).await?;
            expect_text(&mut findings, "second/message", r#"a["b"]"#, received);
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let broken_json = Scenario::new(
        "websocket/broken_json",
        "a message that is not a JSON array closes the socket",
    )
    .interact("send broken json", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
            socket.send_text(r#"["a"#).await?;
            let received = socket.recv_text(ctx.config.request_timeout()).await?;
            expect_closed(&mut findings, "closed", received);
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let fragmented = Scenario::new(
        "websocket/fragmented",
        "a message split into continuation frames is reassembled",
    )
    .interact("send fragments", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
            socket.send_fragmented(r#"["a"]"#, FRAGMENT_LEN).await?;
            expect_text(&mut findings, "message", r#"a["a"]"#, socket.recv_text(wait).await?);
            Ok(findings)
        }
    });

    let url = endpoints.echo.fresh_session().ws();
    let unmasked = Scenario::new(
        "websocket/unmasked_frame",
        "an unmasked client frame closes the socket",
    )
    .interact("send unmasked", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_text(&mut findings, "open", "o", socket.recv_text(wait).await?);
            socket.send_wire(&WireFrame::text(r#"["a"]"#).unmasked()).await?;
            let received = socket.recv_text(ctx.config.request_timeout()).await?;
            expect_closed(&mut findings, "closed", received);
            Ok(findings)
        }
    });

    vec![transport, close, empty, reuse, broken_json, fragmented, unmasked]
}

fn raw_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let url = endpoints.echo.ws_url("/websocket");
    let transport = Scenario::new(
        "raw_websocket/transport",
        "the raw endpoint echoes text byte for byte in unmasked frames",
    )
    .interact("raw echo", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let mut socket = match ctx.raw_websocket(&url, HandshakeRequest::standard()).await {
                Ok(socket) => socket,
                Err(HandshakeError::Transport(e)) => return Err(e),
                Err(e) => {
                    findings.push(AssertionFailure::new("handshake", "101", e.to_string()));
                    return Ok(findings);
                }
            };
            socket.send_text(RAW_ECHO).await?;
            match socket.recv_wire(ctx.stream_wait()).await? {
                Some(frame) => {
                    findings.expect_eq("mask", None, frame.mask);
                    findings.expect_eq("fin", true, frame.fin);
                    findings.expect_eq("payload", RAW_ECHO.as_bytes(), frame.payload.as_slice());
                }
                None => findings.push(AssertionFailure::new(
                    "echo",
                    format!("{:?}", RAW_ECHO),
                    "nothing before timeout",
                )),
            }
            Ok(findings)
        }
    });

    let url = endpoints.close.ws_url("/websocket");
    let close = Scenario::new(
        "raw_websocket/close",
        "the raw close endpoint closes the socket right away",
    )
    .interact("raw close", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let Some(mut socket) = open(&ctx, &url, &mut findings).await? else {
                return Ok(findings);
            };
            expect_closed(&mut findings, "closed", socket.recv(ctx.stream_wait()).await?);
            Ok(findings)
        }
    });

    let url = endpoints.echo.url("/websocket");
    let http = Scenario::new(
        "raw_websocket/http_errors",
        "plain GET on the raw endpoint is refused",
    )
    .get(&url, bad_request("Can \"Upgrade\" only to \"WebSocket\"."));

    vec![transport, close, http]
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let mut scenarios = http_scenarios(endpoints);
    scenarios.extend(handshake_scenarios(endpoints));
    scenarios.extend(session_scenarios(endpoints));
    scenarios.extend(raw_scenarios(endpoints));
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_closed() {
        let mut findings = Findings::new();
        expect_closed(&mut findings, "closed", Received::Closed);
        expect_closed(
            &mut findings,
            "closed",
            Received::Frame(Frame::Close(1002, String::new())),
        );
        assert!(findings.is_empty());
        expect_closed(&mut findings, "closed", Received::Timeout);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_expect_text() {
        let mut findings = Findings::new();
        expect_text(&mut findings, "open", "o", Received::Frame(Frame::Text("o".into())));
        expect_text(&mut findings, "open", "o", Received::Frame(Frame::Text("h".into())));
        let failures = findings.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "open");
    }
}
