//! StubServer - a minimal SockJS echo service served by axum
//!
//! Serves the greeting, `/info` with its preflight, `xhr`/`xhr_send` with
//! in-memory sessions and long polls, a websocket echo, a raw body echo, and a slow chunked
//! stream. Any other OPTIONS is answered as a transport preflight; anything
//! else is 404.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use sockprobe::catalog;
use sockprobe::{Config, Endpoints, RunSummary, Runner};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Frames written by `/echo/chunked`, one chunk each
pub const CHUNKED_FRAMES: u32 = 3;

const NOT_CACHED: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";
const ONE_YEAR_SECS: i64 = 31_536_000;

/// How long an idle poll is held before it is answered with a heartbeat
const POLL_HOLD: Duration = Duration::from_secs(2);
const POLL_TICK: Duration = Duration::from_millis(10);

/// How a poll is answered while another poll holds the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingleFlight {
    /// Close frame 2010
    Refuse,
    /// Wait for the holder to finish
    Queue,
}

#[derive(Default)]
struct Session {
    queue: Vec<String>,
    polling: bool,
}

#[derive(Clone)]
struct Sessions {
    map: Arc<Mutex<HashMap<String, Session>>>,
    single_flight: SingleFlight,
}

/// Holds a session's poll slot; released on drop, including when the
/// client goes away mid-poll
struct PollSlot {
    sessions: Sessions,
    session: String,
}

impl Drop for PollSlot {
    fn drop(&mut self) {
        if let Some(session) = self.sessions.map.lock().get_mut(&self.session) {
            session.polling = false;
        }
    }
}

/// In-process SockJS target. Shuts down on drop.
pub struct StubServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubServer {
    /// Bind a random local port and start serving; concurrent polls are refused
    pub async fn start() -> Result<Self> {
        Self::start_with(SingleFlight::Refuse).await
    }

    pub async fn start_with(single_flight: SingleFlight) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router(single_flight))
                .with_graceful_shutdown(async move {
                    rx.await.ok();
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown: Some(tx),
        })
    }

    /// Root URL; the echo service lives at `/echo`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Config pointed at this stub with short timeouts
    pub fn config(&self) -> Config {
        Config {
            url: self.url(),
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
            stream_wait_ms: 500,
            session_timeout_secs: 1,
            follow_redirects: false,
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::from_root(&self.url()).expect("stub URL is a valid root")
    }

    pub fn runner(&self) -> Runner {
        Runner::new(self.config(), self.endpoints()).expect("HTTP client builds")
    }

    /// Run the named catalog scenarios, in catalog order
    pub async fn run_catalog(&self, names: &[&str]) -> RunSummary {
        let scenarios: Vec<_> = catalog::all(&self.config(), &self.endpoints())
            .into_iter()
            .filter(|s| names.contains(&s.name.as_str()))
            .collect();
        assert_eq!(scenarios.len(), names.len(), "unknown scenario in {:?}", names);
        self.runner().run(&scenarios).await
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn router(single_flight: SingleFlight) -> Router {
    Router::new()
        .route("/echo", get(greeting))
        .route("/echo/", get(greeting))
        .route("/echo/info", get(info).options(info_options))
        .route("/echo/websocket", get(websocket))
        .route("/echo/raw_echo", post(raw_echo))
        .route("/echo/chunked", get(chunked))
        .route("/echo/{server}/{session}/xhr", post(xhr).options(xhr_options))
        .route(
            "/echo/{server}/{session}/xhr_send",
            post(xhr_send).options(xhr_options),
        )
        .fallback(fallback)
        .with_state(Sessions {
            map: Arc::default(),
            single_flight,
        })
}

async fn fallback(method: Method, headers: HeaderMap) -> Response {
    if method == Method::OPTIONS {
        preflight(&headers, "OPTIONS, POST")
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn greeting() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        "Welcome to SockJS!\n",
    )
}

async fn info() -> impl IntoResponse {
    let body = serde_json::json!({
        "websocket": true,
        "cookie_needed": false,
        "origins": ["*:*"],
        "entropy": rand::random::<u32>(),
    });
    (
        [
            (header::CONTENT_TYPE, "application/json; charset=UTF-8"),
            (header::CACHE_CONTROL, NOT_CACHED),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body.to_string(),
    )
}

/// 204 with a year of caching and the CORS grant for the request origin
fn preflight(headers: &HeaderMap, methods: &'static str) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*")
        .to_string();
    let expires = (chrono::Utc::now() + chrono::Duration::seconds(ONE_YEAR_SECS))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    (
        StatusCode::NO_CONTENT,
        [
            (header::CACHE_CONTROL, format!("public, max-age={}", ONE_YEAR_SECS)),
            (header::EXPIRES, expires),
            (header::ACCESS_CONTROL_MAX_AGE, ONE_YEAR_SECS.to_string()),
            (header::ACCESS_CONTROL_ALLOW_METHODS, methods.to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string()),
        ],
    )
        .into_response()
}

async fn info_options(headers: HeaderMap) -> Response {
    preflight(&headers, "OPTIONS, GET")
}

async fn xhr_options(headers: HeaderMap) -> Response {
    preflight(&headers, "OPTIONS, POST")
}

enum Poll {
    Answer(String),
    Claimed(PollSlot),
    Wait,
}

impl Sessions {
    fn try_poll(&self, id: &str) -> Poll {
        let mut map = self.map.lock();
        let Some(session) = map.get_mut(id) else {
            map.insert(id.to_string(), Session::default());
            return Poll::Answer("o\n".to_string());
        };
        if !session.polling {
            session.polling = true;
            return Poll::Claimed(PollSlot {
                sessions: self.clone(),
                session: id.to_string(),
            });
        }
        match self.single_flight {
            SingleFlight::Refuse => {
                Poll::Answer("c[2010,\"Another connection still open\"]\n".to_string())
            }
            SingleFlight::Queue => Poll::Wait,
        }
    }

    fn drain(&self, id: &str) -> Option<Vec<String>> {
        let mut map = self.map.lock();
        let session = map.get_mut(id)?;
        if session.queue.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut session.queue))
        }
    }
}

/// Open on first poll, then park until messages arrive or the hold ends
async fn xhr(
    State(sessions): State<Sessions>,
    Path((_server, session)): Path<(String, String)>,
) -> Response {
    let deadline = Instant::now() + POLL_HOLD;
    let body = loop {
        match sessions.try_poll(&session) {
            Poll::Answer(body) => break body,
            Poll::Claimed(_slot) => break hold(&sessions, &session, deadline).await,
            Poll::Wait if Instant::now() >= deadline => break "h\n".to_string(),
            Poll::Wait => tokio::time::sleep(POLL_TICK).await,
        }
    };
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=UTF-8"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

async fn hold(sessions: &Sessions, session: &str, deadline: Instant) -> String {
    loop {
        if let Some(messages) = sessions.drain(session) {
            return format!("a{}\n", serde_json::Value::from(messages));
        }
        if Instant::now() >= deadline {
            return "h\n".to_string();
        }
        tokio::time::sleep(POLL_TICK).await;
    }
}

async fn xhr_send(
    State(sessions): State<Sessions>,
    Path((_server, session)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let mut map = sessions.map.lock();
    let Some(session) = map.get_mut(&session) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if body.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Payload expected.").into_response();
    }
    match serde_json::from_slice::<Vec<String>>(&body) {
        Ok(messages) => {
            session.queue.extend(messages);
            (
                StatusCode::NO_CONTENT,
                [
                    (header::CONTENT_TYPE, "text/plain; charset=UTF-8"),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                ],
            )
                .into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Broken JSON encoding.").into_response(),
    }
}

async fn websocket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
        if matches!(msg, Message::Text(_) | Message::Binary(_)) && socket.send(msg).await.is_err() {
            break;
        }
    }
}

async fn raw_echo(body: Bytes) -> Bytes {
    body
}

/// `frame N\n` per chunk, spaced out so each lands in its own read
async fn chunked() -> Response {
    let frames = futures_util::stream::unfold(0u32, |i| async move {
        if i == CHUNKED_FRAMES {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((Ok::<_, Infallible>(Bytes::from(format!("frame {}\n", i))), i + 1))
    });
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=UTF-8")],
        Body::from_stream(frames),
    )
        .into_response()
}
