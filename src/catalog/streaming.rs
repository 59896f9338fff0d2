//! Streaming transports: `xhr_streaming`, `eventsource`, `htmlfile`
//!
//! Each scenario holds one raw connection open and reads the body as the
//! server produces it. Reads are split on the frame delimiter of the
//! transport, never on chunk boundaries.

use std::time::Duration;

use super::polling::server_error;
use super::session::send_accepted;
use super::{expect_read, preflight, EVENT_STREAM, HTML, JAVASCRIPT};
use crate::endpoint::Endpoints;
use crate::error::{AssertionFailure, TransportError};
use crate::raw::StreamingResponse;
use crate::scenario::{Scenario, ScenarioContext};
use crate::verify::{
    expect_content_type, expect_cors, expect_not_cached, expect_status, Check, Findings,
};

/// Number of `h` bytes before the first frame on `xhr_streaming`
const PRELUDE_LEN: usize = 2048;

/// Messages of `LIMIT_MESSAGE_LEN` bytes; the last one crosses the
/// 4096-byte response limit of the test server (the prelude is not counted)
const LIMIT_MESSAGES: usize = 31;
const LIMIT_MESSAGE_LEN: usize = 128;

/// Minimum size of the htmlfile page before the first script tag
const HTMLFILE_MIN_HEAD: usize = 1024;

const OPEN_SCRIPT: &str = "<script>\np(\"o\");\n</script>\r\n";

fn prelude() -> String {
    format!("{}\n", "h".repeat(PRELUDE_LEN))
}

fn xhr_streaming_head() -> Check {
    Check::empty("xhr_streaming")
        .and(expect_status(200))
        .and(expect_content_type(JAVASCRIPT))
        .and(expect_cors(None))
}

/// Open an `xhr_streaming` response and consume the prelude and open frame
async fn open_xhr_stream(
    ctx: &ScenarioContext,
    url: &str,
    findings: &mut Findings,
) -> Result<StreamingResponse, TransportError> {
    let wait = ctx.stream_wait();
    let mut resp = ctx.stream("POST", url, &[]).await?;
    findings.check(&xhr_streaming_head(), &resp.head_response());
    expect_read(findings, "prelude", &prelude(), resp.read_until(b"\n", wait).await?);
    expect_read(findings, "open", "o\n", resp.read_until(b"\n", wait).await?);
    Ok(resp)
}

async fn send(
    ctx: &ScenarioContext,
    url: &str,
    payload: &str,
    findings: &mut Findings,
) -> Result<(), TransportError> {
    let resp = ctx.http.post(url, &[], payload.to_string()).await?;
    findings.check(&send_accepted(), &resp);
    Ok(())
}

/// After the close frame the server must end the body
async fn expect_stream_end(
    resp: &mut StreamingResponse,
    wait: Duration,
    findings: &mut Findings,
) -> Result<(), TransportError> {
    let rest = resp.read_available(wait).await?;
    findings.expect(
        rest.is_empty(),
        "after_close",
        "no further bytes",
        format!("{:?}", String::from_utf8_lossy(&rest)),
    );
    findings.expect(
        resp.is_finished(),
        "end_of_stream",
        "body ended",
        "still open",
    );
    Ok(())
}

fn xhr_streaming_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let options = preflight(
        Scenario::new("xhr_streaming/options", "xhr_streaming answers CORS preflight"),
        &echo.fresh_session().transport("xhr_streaming"),
        "OPTIONS, POST",
    );

    let session = echo.fresh_session();
    let (stream, send_url) = (session.transport("xhr_streaming"), session.transport("xhr_send"));
    let transport = Scenario::new(
        "xhr_streaming/transport",
        "prelude, open frame, then messages on one response",
    )
    .interact("stream and send", move |ctx| {
        let (stream, send_url) = (stream.clone(), send_url.clone());
        async move {
            let mut findings = Findings::new();
            let mut resp = open_xhr_stream(&ctx, &stream, &mut findings).await?;
            send(&ctx, &send_url, r#"["x"]"#, &mut findings).await?;
            let read = resp.read_until(b"\n", ctx.stream_wait()).await?;
            expect_read(&mut findings, "message", "a[\"x\"]\n", read);
            Ok(findings)
        }
    });

    let session = echo.fresh_session();
    let (stream, send_url) = (session.transport("xhr_streaming"), session.transport("xhr_send"));
    let response_limit = Scenario::new(
        "xhr_streaming/response_limit",
        "a streaming response is closed once the server's byte limit is passed",
    )
    .interact("stream past the limit", move |ctx| {
        let (stream, send_url) = (stream.clone(), send_url.clone());
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let mut resp = open_xhr_stream(&ctx, &stream, &mut findings).await?;

            let message = "x".repeat(LIMIT_MESSAGE_LEN);
            let payload = format!(r#"["{}"]"#, message);
            let expected = format!("a[\"{}\"]\n", message);
            for i in 0..LIMIT_MESSAGES {
                send(&ctx, &send_url, &payload, &mut findings).await?;
                let read = resp.read_until(b"\n", wait).await?;
                expect_read(&mut findings, &format!("message[{}]", i), &expected, read);
            }
            expect_stream_end(&mut resp, wait, &mut findings).await?;
            Ok(findings)
        }
    });

    vec![options, transport, response_limit]
}

fn eventsource_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let session = endpoints.echo.fresh_session();
    let (stream, send_url) = (session.transport("eventsource"), session.transport("xhr_send"));
    let transport = Scenario::new(
        "eventsource/transport",
        "frames arrive as server-sent events with escaped payloads",
    )
    .interact("stream events", move |ctx| {
        let (stream, send_url) = (stream.clone(), send_url.clone());
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let mut resp = ctx.stream("GET", &stream, &[]).await?;
            findings.check(
                &Check::empty("eventsource")
                    .and(expect_status(200))
                    .and(expect_content_type(EVENT_STREAM))
                    .and(expect_not_cached()),
                &resp.head_response(),
            );
            expect_read(&mut findings, "prelude", "\r\n", resp.read_until(b"\r\n", wait).await?);
            let read = resp.read_until(b"\r\n\r\n", wait).await?;
            expect_read(&mut findings, "open", "data: o\r\n\r\n", read);

            // control characters must reach the client escaped
            send(&ctx, &send_url, r#"["  \u0000\n\r "]"#, &mut findings).await?;
            let read = resp.read_until(b"\r\n\r\n", wait).await?;
            expect_read(
                &mut findings,
                "message",
                "data: a[\"  \\u0000\\n\\r \"]\r\n\r\n",
                read,
            );
            Ok(findings)
        }
    });

    vec![transport]
}

fn htmlfile_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let session = echo.fresh_session();
    let (stream, send_url) = (
        session.transport("htmlfile?c=%63allback"),
        session.transport("xhr_send"),
    );
    let transport = Scenario::new(
        "htmlfile/transport",
        "frames arrive as script tags after a padded page head",
    )
    .interact("stream script tags", move |ctx| {
        let (stream, send_url) = (stream.clone(), send_url.clone());
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let mut resp = ctx.stream("GET", &stream, &[]).await?;
            findings.check(
                &Check::empty("htmlfile")
                    .and(expect_status(200))
                    .and(expect_content_type(HTML))
                    .and(expect_not_cached()),
                &resp.head_response(),
            );

            match resp.read_until(OPEN_SCRIPT.as_bytes(), wait).await? {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let page = text.strip_suffix(OPEN_SCRIPT).unwrap_or(&text);
                    findings.expect(
                        page.len() > HTMLFILE_MIN_HEAD,
                        "page/padding",
                        format!("> {} bytes", HTMLFILE_MIN_HEAD),
                        page.len().to_string(),
                    );
                    findings.expect(
                        page.contains("var c = parent.callback;"),
                        "page/callback",
                        "page binds the decoded callback name",
                        "no `var c = parent.callback;`",
                    );
                }
                None => findings.push(AssertionFailure::new(
                    "open",
                    format!("{:?}", OPEN_SCRIPT),
                    "nothing before timeout or end of body",
                )),
            }

            send(&ctx, &send_url, r#"["x"]"#, &mut findings).await?;
            let read = resp.read_until(b"</script>\r\n", wait).await?;
            expect_read(
                &mut findings,
                "message",
                "<script>\np(\"a[\\\"x\\\"]\");\n</script>\r\n",
                read,
            );
            Ok(findings)
        }
    });

    let no_callback = Scenario::new(
        "htmlfile/no_callback",
        "htmlfile without a callback parameter is 500",
    )
    .get(
        &echo.session("a", "a").transport("htmlfile"),
        server_error("\"callback\" parameter required"),
    );

    vec![transport, no_callback]
}

fn close_scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let stream = endpoints.close.fresh_session().transport("xhr_streaming");
    let close_frame = Scenario::new(
        "close/streaming_close_frame",
        "the close service sends the close frame and ends the stream",
    )
    .interact("stream until closed", move |ctx| {
        let stream = stream.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let mut resp = open_xhr_stream(&ctx, &stream, &mut findings).await?;
            let read = resp.read_until(b"\n", wait).await?;
            expect_read(&mut findings, "close", "c[3000,\"Go away!\"]\n", read);
            expect_stream_end(&mut resp, wait, &mut findings).await?;
            Ok(findings)
        }
    });

    let stream = endpoints.echo.fresh_session().transport("xhr_streaming");
    let another = Scenario::new(
        "close/streaming_another_connection",
        "a second streaming receiver gets 2010 and the first stays open",
    )
    .interact("two receivers", move |ctx| {
        let stream = stream.clone();
        async move {
            let mut findings = Findings::new();
            let wait = ctx.stream_wait();
            let mut first = open_xhr_stream(&ctx, &stream, &mut findings).await?;

            let mut second = ctx.stream("POST", &stream, &[]).await?;
            findings.check(&xhr_streaming_head(), &second.head_response());
            let read = second.read_until(b"\n", wait).await?;
            expect_read(&mut findings, "second/prelude", &prelude(), read);
            let read = second.read_until(b"\n", wait).await?;
            expect_read(
                &mut findings,
                "second/close",
                "c[2010,\"Another connection still open\"]\n",
                read,
            );
            expect_stream_end(&mut second, wait, &mut findings).await?;

            first.read_available(wait).await?;
            findings.expect(
                !first.is_finished(),
                "first/open",
                "first receiver still streaming",
                "ended",
            );
            Ok(findings)
        }
    });

    vec![close_frame, another]
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let mut scenarios = xhr_streaming_scenarios(endpoints);
    scenarios.extend(eventsource_scenarios(endpoints));
    scenarios.extend(htmlfile_scenarios(endpoints));
    scenarios.extend(close_scenarios(endpoints));
    scenarios
}
