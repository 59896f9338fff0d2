//! Hand-built WebSocket upgrades over the raw transport
//!
//! Used for negative scenarios (wrong version, missing key, wrong method) and
//! for exchanging frames byte-for-byte, including inspecting whether the
//! server masked its frames.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::debug;

use super::wire::{self, WireFrame};
use super::{is_drop, Frame, Received};
use crate::endpoint::request_target;
use crate::error::{HandshakeError, TransportError};
use crate::raw::{RawConnection, RawHead};

/// An upgrade request whose every header can be bent
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub method: String,
    headers: Vec<(String, String)>,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandshakeRequest {
    /// A correct RFC 6455 upgrade with a fresh key
    pub fn standard() -> Self {
        Self {
            method: "GET".to_string(),
            headers: vec![
                ("Upgrade".to_string(), "websocket".to_string()),
                ("Connection".to_string(), "Upgrade".to_string()),
                ("Sec-WebSocket-Key".to_string(), generate_key()),
                ("Sec-WebSocket-Version".to_string(), "13".to_string()),
            ],
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    /// Set (replace) a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Drop a header entirely
    pub fn without(mut self, name: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    pub fn version(self, version: &str) -> Self {
        self.header("Sec-WebSocket-Version", version)
    }

    pub fn key(&self) -> Option<&str> {
        self.get("sec-websocket-key")
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Random 16-byte nonce, base64-encoded
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

/// Send `request` to `url` over a raw connection and read the answer.
/// A non-101 answer is `Rejected`; silence followed by close is `ConnectionDropped`.
pub async fn raw_handshake(
    url: &str,
    request: HandshakeRequest,
    connect_timeout: Duration,
    wait: Duration,
) -> Result<RawSocket, HandshakeError> {
    let (authority, path) =
        request_target(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut conn = RawConnection::open_authority(&authority, connect_timeout).await?;
    let headers: Vec<(&str, &str)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    conn.write_head(&request.method, &path, &headers).await?;

    let response = match conn.read_response(wait).await {
        Ok(response) => response,
        Err(TransportError::Closed) => return Err(HandshakeError::ConnectionDropped),
        Err(TransportError::Io(e)) if is_drop(&e) => return Err(HandshakeError::ConnectionDropped),
        Err(e) => return Err(e.into()),
    };
    debug!(url, status = response.status(), "raw handshake answered");

    if response.status() != 101 {
        return Err(HandshakeError::Rejected {
            status: response.status(),
            body: response.body,
        });
    }

    verify_upgrade(&response.head, request.key())?;
    Ok(RawSocket {
        conn,
        head: response.head,
    })
}

/// Check the 101 response against RFC 6455 section 4.1
fn verify_upgrade(head: &RawHead, key: Option<&str>) -> Result<(), HandshakeError> {
    let upgrade = head.headers.get("upgrade").unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::Protocol(format!(
            "Upgrade header is {:?}",
            upgrade
        )));
    }
    let connection = head.headers.get("connection").unwrap_or_default();
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(HandshakeError::Protocol(format!(
            "Connection header is {:?}",
            connection
        )));
    }
    if let Some(key) = key {
        let expected = derive_accept_key(key.as_bytes());
        let actual = head.headers.get("sec-websocket-accept").unwrap_or_default();
        if actual != expected {
            return Err(HandshakeError::Protocol(format!(
                "Sec-WebSocket-Accept is {:?}, expected {:?}",
                actual, expected
            )));
        }
    }
    Ok(())
}

/// An upgraded connection driven frame by frame
pub struct RawSocket {
    conn: RawConnection,
    head: RawHead,
}

impl RawSocket {
    /// Status line and headers of the 101 response
    pub fn head(&self) -> &RawHead {
        &self.head
    }

    pub async fn send(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        self.conn.write_body_chunk(&frame.encode()).await
    }

    /// Arbitrary bytes, for frames no encoder would produce
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.conn.write_body_chunk(bytes).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.send(&WireFrame::text(text)).await
    }

    /// Next frame exactly as the server encoded it; `None` on timeout or close
    pub async fn recv_wire(&mut self, wait: Duration) -> Result<Option<WireFrame>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            let buffered = self.conn.take_pending();
            match WireFrame::decode(&buffered) {
                Ok(Some((frame, used))) => {
                    self.conn.put_back(buffered[used..].to_vec());
                    return Ok(Some(frame));
                }
                Ok(None) => self.conn.put_back(buffered),
                Err(e) => return Err(TransportError::Malformed(e.to_string())),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.conn.is_closed() || remaining.is_zero() {
                return Ok(None);
            }
            if self.conn.fill(remaining).await?.is_none() {
                return Ok(None);
            }
        }
    }

    /// Next complete message, reassembling fragments
    pub async fn recv(&mut self, wait: Duration) -> Result<Received, TransportError> {
        let deadline = Instant::now() + wait;
        let mut fragments: Option<(u8, Vec<u8>)> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(frame) = self.recv_wire(remaining).await? else {
                return Ok(if self.conn.is_closed() && self.conn.pending().is_empty() {
                    Received::Closed
                } else {
                    Received::Timeout
                });
            };

            if frame.is_control() {
                return frame
                    .to_frame()
                    .map(Received::Frame)
                    .map_err(|e| TransportError::Malformed(e.to_string()));
            }

            let (opcode, mut payload) = match fragments.take() {
                Some((opcode, buf)) if frame.opcode == wire::OP_CONTINUATION => (opcode, buf),
                Some(_) => {
                    return Err(TransportError::Malformed(
                        "new data frame inside a fragmented message".to_string(),
                    ))
                }
                None => (frame.opcode, Vec::new()),
            };
            payload.extend_from_slice(&frame.payload);

            if frame.fin {
                let frame = match opcode {
                    wire::OP_BINARY => Frame::Binary(payload),
                    _ => Frame::Text(String::from_utf8_lossy(&payload).into_owned()),
                };
                return Ok(Received::Frame(frame));
            }
            fragments = Some((opcode, payload));
        }
    }

    /// Read whatever bytes arrive within `wait`, unparsed
    pub async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        self.conn.read_available(wait).await
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Headers;

    fn head_with(headers: &[(&str, &str)]) -> RawHead {
        RawHead {
            version: "HTTP/1.1".to_string(),
            status: 101,
            reason: "Switching Protocols".to_string(),
            headers: headers.iter().copied().collect::<Headers>(),
        }
    }

    #[test]
    fn test_standard_request_headers() {
        let req = HandshakeRequest::standard();
        assert_eq!(req.method, "GET");
        assert_eq!(req.get("sec-websocket-version"), Some("13"));
        let key = req.key().unwrap();
        assert_eq!(BASE64.decode(key).unwrap().len(), 16);
    }

    #[test]
    fn test_request_mutation() {
        let req = HandshakeRequest::standard()
            .version("8")
            .without("Sec-WebSocket-Key")
            .header("connection", "close")
            .method("POST");
        assert_eq!(req.get("Sec-WebSocket-Version"), Some("8"));
        assert!(req.key().is_none());
        assert_eq!(req.get("Connection"), Some("close"));
        assert_eq!(req.method, "POST");
    }

    #[test]
    fn test_verify_upgrade_rfc_example() {
        // RFC 6455 section 1.3
        let head = head_with(&[
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Accept", "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
        ]);
        assert!(verify_upgrade(&head, Some("dGhlIHNhbXBsZSBub25jZQ==")).is_ok());
        assert!(verify_upgrade(&head, Some("AAAAAAAAAAAAAAAAAAAAAA==")).is_err());
    }

    #[test]
    fn test_verify_upgrade_requires_headers() {
        let head = head_with(&[("Connection", "keep-alive, Upgrade")]);
        assert!(matches!(
            verify_upgrade(&head, None),
            Err(HandshakeError::Protocol(_))
        ));

        let head = head_with(&[("Upgrade", "WebSocket"), ("Connection", "keep-alive, Upgrade")]);
        assert!(verify_upgrade(&head, None).is_ok());
    }
}
