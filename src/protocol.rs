//! SockJS framing
//!
//! Every transport carries the same frames, one per line (streaming) or one
//! per response (polling):
//!
//! ```text
//! o                  open
//! h                  heartbeat
//! a["msg1","msg2"]   messages
//! c[3000,"Go away!"] close
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of the greeting page
pub const GREETING: &str = "Welcome to SockJS!\n";

/// Close frame sent by the `/close` service
pub const CLOSE_GO_AWAY: (u16, &str) = (3000, "Go away!");

/// Close frame sent to a second concurrent receiver on one session
pub const CLOSE_ANOTHER_CONNECTION: (u16, &str) = (2010, "Another connection still open");

/// One decoded SockJS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

impl SockJsFrame {
    pub fn message(text: &str) -> Self {
        SockJsFrame::Messages(vec![text.to_string()])
    }

    pub fn close(code: u16, reason: &str) -> Self {
        SockJsFrame::Close {
            code,
            reason: reason.to_string(),
        }
    }

    /// Decode a single frame (no trailing newline)
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let (kind, rest) = text
            .split_at_checked(1)
            .ok_or_else(|| FrameError::new(text, "empty frame"))?;

        match (kind, rest) {
            ("o", "") => Ok(SockJsFrame::Open),
            ("h", "") => Ok(SockJsFrame::Heartbeat),
            ("a", payload) => serde_json::from_str::<Vec<String>>(payload)
                .map(SockJsFrame::Messages)
                .map_err(|e| FrameError::new(text, e.to_string())),
            ("c", payload) => serde_json::from_str::<(u16, String)>(payload)
                .map(|(code, reason)| SockJsFrame::Close { code, reason })
                .map_err(|e| FrameError::new(text, e.to_string())),
            _ => Err(FrameError::new(text, "unknown frame type")),
        }
    }

    /// Encode without the trailing newline
    pub fn encode(&self) -> String {
        match self {
            SockJsFrame::Open => "o".to_string(),
            SockJsFrame::Heartbeat => "h".to_string(),
            SockJsFrame::Messages(messages) => {
                format!("a{}", serde_json::Value::from(messages.clone()))
            }
            SockJsFrame::Close { code, reason } => {
                format!("c[{},{}]", code, serde_json::Value::from(reason.as_str()))
            }
        }
    }
}

impl fmt::Display for SockJsFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A frame that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad frame {input:?}: {reason}")]
pub struct FrameError {
    pub input: String,
    pub reason: String,
}

impl FrameError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Decode a body of newline-terminated frames. A trailing fragment without
/// its newline is an error.
pub fn parse_frames(body: &str) -> Result<Vec<SockJsFrame>, FrameError> {
    let Some(complete) = body.strip_suffix('\n') else {
        if body.is_empty() {
            return Ok(Vec::new());
        }
        return Err(FrameError::new(body, "missing trailing newline"));
    };
    complete.split('\n').map(SockJsFrame::parse).collect()
}

/// Decode an eventsource stream: `data: <frame>\r\n\r\n` events
pub fn parse_event_stream(body: &str) -> Result<Vec<SockJsFrame>, FrameError> {
    body.split("\r\n\r\n")
        .map(|event| event.trim_start_matches("\r\n"))
        .filter(|event| !event.is_empty())
        .map(|event| {
            event
                .strip_prefix("data: ")
                .ok_or_else(|| FrameError::new(event, "event without data field"))
                .and_then(SockJsFrame::parse)
        })
        .collect()
}

/// JSON array body posted to `xhr_send` and `jsonp_send`
pub fn send_payload(messages: &[&str]) -> String {
    serde_json::Value::from(messages.to_vec()).to_string()
}

/// Body of `/info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoDocument {
    pub websocket: bool,
    pub cookie_needed: bool,
    pub origins: Vec<String>,
    pub entropy: u64,
}

impl InfoDocument {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_frames() {
        assert_eq!(SockJsFrame::parse("o").unwrap(), SockJsFrame::Open);
        assert_eq!(SockJsFrame::parse("h").unwrap(), SockJsFrame::Heartbeat);
        assert_eq!(
            SockJsFrame::parse(r#"a["x","y"]"#).unwrap(),
            SockJsFrame::Messages(vec!["x".into(), "y".into()])
        );
        assert_eq!(
            SockJsFrame::parse(r#"c[3000,"Go away!"]"#).unwrap(),
            SockJsFrame::close(3000, "Go away!")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SockJsFrame::parse("").is_err());
        assert!(SockJsFrame::parse("ox").is_err());
        assert!(SockJsFrame::parse("a[1]").is_err());
        assert!(SockJsFrame::parse("c[3000]").is_err());
        assert!(SockJsFrame::parse("z").is_err());
    }

    #[test]
    fn test_frame_error_display() {
        let err = parse_frames("o").unwrap_err();
        assert_eq!(err.to_string(), "bad frame \"o\": missing trailing newline");
    }

    #[test]
    fn test_encode_matches_wire() {
        assert_eq!(SockJsFrame::message("a").encode(), r#"a["a"]"#);
        assert_eq!(
            SockJsFrame::close(2010, "Another connection still open").to_string(),
            r#"c[2010,"Another connection still open"]"#
        );
    }

    #[test]
    fn test_parse_frames() {
        let frames = parse_frames("o\na[\"x\"]\n").unwrap();
        assert_eq!(frames, vec![SockJsFrame::Open, SockJsFrame::message("x")]);
        assert!(parse_frames("").unwrap().is_empty());
        assert!(parse_frames("o").is_err());
    }

    #[test]
    fn test_parse_event_stream() {
        let body = "\r\ndata: o\r\n\r\ndata: a[\"x\"]\r\n\r\n";
        let frames = parse_event_stream(body).unwrap();
        assert_eq!(frames, vec![SockJsFrame::Open, SockJsFrame::message("x")]);
    }

    #[test]
    fn test_send_payload() {
        assert_eq!(send_payload(&["x", "y"]), r#"["x","y"]"#);
    }

    #[test]
    fn test_info_document() {
        let info = InfoDocument::parse(
            br#"{"websocket":true,"cookie_needed":false,"origins":["*:*"],"entropy":12345}"#,
        )
        .unwrap();
        assert!(info.websocket);
        assert_eq!(info.origins, vec!["*:*"]);
        assert!(InfoDocument::parse(b"{}").is_err());
    }
}
