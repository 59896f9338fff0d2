//! Error taxonomy
//!
//! Three kinds of outcome leave a probe:
//! - `TransportError` - the network let us down; the scenario is aborted
//! - `HandshakeError` - a WebSocket upgrade did not complete (often expected)
//! - `AssertionFailure` - a protocol rule did not hold; collected, never raised

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Infrastructure failures: the request never produced a response
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection closed by peer before a response")]
    Closed,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("probe task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransportError {
    pub(crate) fn timeout(op: &'static str, after: Duration) -> Self {
        TransportError::Timeout { op, after }
    }
}

/// WebSocket opening handshake did not produce an open socket
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Server answered the upgrade with an ordinary HTTP response
    #[error("handshake rejected with HTTP {status}")]
    Rejected { status: u16, body: Vec<u8> },

    /// Server closed the connection without answering
    #[error("connection dropped during handshake")]
    ConnectionDropped,

    /// Server answered 101 but the upgrade response was invalid
    #[error("handshake protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandshakeError {
    /// Status code of a rejected handshake, if the server sent one
    pub fn status(&self) -> Option<u16> {
        match self {
            HandshakeError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Endpoint construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("base URL must not end with '/': {0}")]
    TrailingSlash(String),

    #[error("invalid base URL {url}: {reason}")]
    Invalid { url: String, reason: String },
}

/// A protocol rule that did not hold
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule}: expected {expected}, observed {observed}")]
pub struct AssertionFailure {
    pub rule: String,
    pub expected: String,
    pub observed: String,
}

impl AssertionFailure {
    pub fn new(
        rule: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Prefix the rule name with the rule that composed it
    pub fn within(mut self, parent: &str) -> Self {
        if !parent.is_empty() && parent != self.rule {
            self.rule = format!("{}/{}", parent, self.rule);
        }
        self
    }
}

/// Outcome of a single rule
pub type Verdict = Result<(), AssertionFailure>;
