//! WebSocket probe client
//!
//! Two ways in:
//! - `handshake` - a well-formed upgrade via tokio-tungstenite, returning an
//!   `OpenSocket` for typed send/receive (plus raw wire writes)
//! - `raw::raw_handshake` - a hand-built upgrade over the raw transport, for
//!   malformed requests and byte-exact frame exchange

pub mod raw;
pub mod wire;

use std::io;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{HandshakeError, TransportError};
use crate::response::Headers;

pub use raw::{raw_handshake, HandshakeRequest, RawSocket};
pub use wire::WireFrame;

/// A WebSocket message as the harness sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close(u16, String),
}

/// Outcome of waiting for a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(Frame),
    Timeout,
    Closed,
}

impl Received {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Received::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An upgraded WebSocket connection. Dropping it closes the socket.
pub struct OpenSocket {
    stream: WsStream,
    headers: Headers,
}

/// Perform the opening handshake against `url` (`ws://` or `wss://`)
pub async fn handshake(
    url: &str,
    extra_headers: &[(&str, &str)],
    wait: Duration,
) -> Result<OpenSocket, HandshakeError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| invalid_url(url, e.to_string()))?;

    for (name, value) in extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid_url(url, format!("header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid_url(url, format!("header value {:?}: {}", value, e)))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, response) = match timeout(wait, connect_async(request)).await {
        Err(_) => return Err(TransportError::timeout("websocket handshake", wait).into()),
        Ok(Err(e)) => return Err(classify_handshake_error(e)),
        Ok(Ok(pair)) => pair,
    };

    let headers: Headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    debug!(url, status = response.status().as_u16(), "websocket open");

    Ok(OpenSocket { stream, headers })
}

fn invalid_url(url: &str, reason: String) -> HandshakeError {
    TransportError::InvalidUrl {
        url: url.to_string(),
        reason,
    }
    .into()
}

fn classify_handshake_error(err: tungstenite::Error) -> HandshakeError {
    use tungstenite::error::ProtocolError;

    match err {
        tungstenite::Error::Http(response) => HandshakeError::Rejected {
            status: response.status().as_u16(),
            body: response.body().clone().unwrap_or_default(),
        },
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            HandshakeError::ConnectionDropped
        }
        tungstenite::Error::Protocol(ProtocolError::HandshakeIncomplete) => {
            HandshakeError::ConnectionDropped
        }
        tungstenite::Error::Protocol(e) => HandshakeError::Protocol(e.to_string()),
        tungstenite::Error::Io(e) if is_drop(&e) => HandshakeError::ConnectionDropped,
        tungstenite::Error::Io(e) => HandshakeError::Transport(TransportError::Io(e)),
        tungstenite::Error::Url(e) => HandshakeError::Transport(TransportError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }),
        other => HandshakeError::Transport(TransportError::WebSocket(other)),
    }
}

pub(crate) fn is_drop(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

impl OpenSocket {
    /// Headers of the 101 response
    pub fn response_headers(&self) -> &Headers {
        &self.headers
    }

    /// Subprotocol the server selected, if any
    pub fn subprotocol(&self) -> Option<&str> {
        self.headers.get("sec-websocket-protocol")
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping => Message::Ping(Vec::new().into()),
            Frame::Pong => Message::Pong(Vec::new().into()),
            Frame::Close(code, reason) => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.send(Frame::Text(text.to_string())).await
    }

    /// Write an exactly-encoded frame straight to the socket, bypassing
    /// the protocol state machine (unmasked, oversized, reserved bits, ...)
    pub async fn send_wire(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        let socket = self.stream.get_mut();
        socket.write_all(&frame.encode()).await?;
        socket.flush().await?;
        Ok(())
    }

    /// Send `text` as a fragmented message of `fragment_len`-byte pieces
    pub async fn send_fragmented(
        &mut self,
        text: &str,
        fragment_len: usize,
    ) -> Result<(), TransportError> {
        for frame in wire::fragment(wire::OP_TEXT, text.as_bytes(), fragment_len) {
            self.send_wire(&frame).await?;
        }
        Ok(())
    }

    /// Wait up to `wait` for the next frame
    pub async fn recv(&mut self, wait: Duration) -> Result<Received, TransportError> {
        let next = match timeout(wait, self.stream.next()).await {
            Err(_) => return Ok(Received::Timeout),
            Ok(next) => next,
        };

        let message = match next {
            None => return Ok(Received::Closed),
            Some(Ok(message)) => message,
            Some(Err(tungstenite::Error::ConnectionClosed))
            | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(Received::Closed),
            Some(Err(tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
            ))) => return Ok(Received::Closed),
            Some(Err(tungstenite::Error::Io(e))) if is_drop(&e) => return Ok(Received::Closed),
            Some(Err(e)) => return Err(e.into()),
        };

        let frame = match message {
            Message::Text(text) => Frame::Text(text.to_string()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Ping(_) => Frame::Ping,
            Message::Pong(_) => Frame::Pong,
            Message::Close(Some(close)) => Frame::Close(u16::from(close.code), close.reason.to_string()),
            Message::Close(None) => Frame::Close(wire::CLOSE_NO_STATUS, String::new()),
            Message::Frame(raw) => Frame::Binary(raw.into_payload().to_vec()),
        };
        Ok(Received::Frame(frame))
    }

    /// Wait for the next text frame, skipping pings and pongs
    pub async fn recv_text(&mut self, wait: Duration) -> Result<Received, TransportError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Received::Timeout);
            }
            match self.recv(remaining).await? {
                Received::Frame(Frame::Ping) | Received::Frame(Frame::Pong) => continue,
                other => return Ok(other),
            }
        }
    }

    /// Start the closing handshake
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.send(Frame::Close(code, reason.to_string())).await
    }
}
