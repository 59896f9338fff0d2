//! Raw transport client
//!
//! A TCP (or TLS) socket with no HTTP client in the way: the caller writes
//! exactly the bytes it wants and reads back exactly what arrived. Streaming
//! transports never close on their own, so every read is bounded by a wait.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::endpoint::Authority;
use crate::error::TransportError;
use crate::response::{Headers, NormalizedResponse};

/// Refuse to buffer a response head larger than this
const MAX_HEAD_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 8192;

trait RawIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawIo for T {}

/// An open raw connection. Dropping it closes the socket.
pub struct RawConnection {
    stream: Box<dyn RawIo>,
    host_header: String,
    /// Bytes read from the socket but not yet handed out
    pending: Vec<u8>,
    closed: bool,
}

impl RawConnection {
    /// Connect to `host:port`, optionally wrapping the socket in TLS
    pub async fn open(
        host: &str,
        port: u16,
        tls: bool,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let target = format!("{}:{}", host, port);
        let tcp = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::timeout("connect", connect_timeout))?
            .map_err(|source| TransportError::Connect {
                target: target.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn RawIo> = if tls {
            let name = ServerName::try_from(host.to_string())
                .map_err(|e| TransportError::Tls(format!("invalid server name {}: {}", host, e)))?;
            let tls_stream = timeout(connect_timeout, tls_connector()?.connect(name, tcp))
                .await
                .map_err(|_| TransportError::timeout("TLS handshake", connect_timeout))?
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            Box::new(tls_stream)
        } else {
            Box::new(tcp)
        };

        debug!(target = %target, tls, "raw connection open");

        let authority = Authority {
            host: host.to_string(),
            port,
            tls,
        };
        Ok(Self {
            stream,
            host_header: authority.host_header(),
            pending: Vec::new(),
            closed: false,
        })
    }

    pub async fn open_authority(
        authority: &Authority,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        Self::open(&authority.host, authority.port, authority.tls, connect_timeout).await
    }

    /// Peer has closed its side
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write a request line and headers. `Host` is added unless supplied.
    pub async fn write_head(
        &mut self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<(), TransportError> {
        let mut head = format!("{} {} HTTP/1.1\r\n", method, path);
        if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("host")) {
            head.push_str(&format!("Host: {}\r\n", self.host_header));
        }
        for (name, value) in headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        trace!(head = %head, "raw request head");
        self.write_all(head.as_bytes()).await
    }

    /// Write body bytes exactly as given
    pub async fn write_body_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.write_all(bytes).await
    }

    /// Write one `Transfer-Encoding: chunked` chunk
    pub async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut framed = format!("{:x}\r\n", bytes.len()).into_bytes();
        framed.extend_from_slice(bytes);
        framed.extend_from_slice(b"\r\n");
        self.write_all(&framed).await
    }

    /// Terminating zero-length chunk
    pub async fn finish_chunked(&mut self) -> Result<(), TransportError> {
        self.write_all(b"0\r\n\r\n").await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Whatever arrives within `max_wait`, possibly nothing.
    /// Returns early only when the peer closes.
    pub async fn read_available(&mut self, max_wait: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = std::mem::take(&mut self.pending);
        let deadline = Instant::now() + max_wait;
        while !self.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.read_some(&mut buf, remaining).await?.is_none() {
                break;
            }
        }
        Ok(buf)
    }

    /// Like `read_available` but returns as soon as `want` bytes are buffered
    pub async fn read_at_least(
        &mut self,
        want: usize,
        max_wait: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = std::mem::take(&mut self.pending);
        let deadline = Instant::now() + max_wait;
        while buf.len() < want && !self.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.read_some(&mut buf, remaining).await?.is_none() {
                break;
            }
        }
        Ok(buf)
    }

    /// Read until the peer closes, `limit` bytes arrive, or `max_wait` passes
    pub async fn read_until_closed(
        &mut self,
        limit: usize,
        max_wait: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = std::mem::take(&mut self.pending);
        let deadline = Instant::now() + max_wait;
        while !self.closed && buf.len() < limit {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.read_some(&mut buf, remaining).await?.is_none() {
                break;
            }
        }
        Ok(buf)
    }

    /// Read one HTTP response: the head, then a body framed by
    /// `Content-Length`, chunked encoding, or connection close.
    /// Bytes past the framed body stay buffered for the next read.
    pub async fn read_response(&mut self, max_wait: Duration) -> Result<RawResponse, TransportError> {
        let deadline = Instant::now() + max_wait;
        let (head, mut rest) = self.read_head(deadline, max_wait).await?;
        let framing = head.framing();
        let mut complete = false;

        match framing {
            Framing::Empty => {
                self.pending = rest;
                rest = Vec::new();
                complete = true;
            }
            Framing::Length(len) => {
                while rest.len() < len && !self.closed {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() || self.read_some(&mut rest, remaining).await?.is_none() {
                        break;
                    }
                }
                if rest.len() >= len {
                    self.pending = rest.split_off(len);
                    complete = true;
                }
            }
            Framing::Chunked => loop {
                let decoded = decode_chunked(&rest);
                if decoded.complete {
                    self.pending = rest.split_off(decoded.consumed);
                    complete = true;
                    break;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if self.closed
                    || remaining.is_zero()
                    || self.read_some(&mut rest, remaining).await?.is_none()
                {
                    break;
                }
            },
            Framing::UntilClose => {
                while !self.closed {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() || self.read_some(&mut rest, remaining).await?.is_none() {
                        break;
                    }
                }
                complete = self.closed;
            }
        }

        let body = match framing {
            Framing::Chunked => decode_chunked(&rest).chunks.concat(),
            _ => rest.clone(),
        };

        Ok(RawResponse {
            head,
            raw_body: rest,
            body,
            complete,
        })
    }

    /// Read a response head and hand the connection over for incremental
    /// body reads
    pub async fn read_streaming(
        mut self,
        max_wait: Duration,
    ) -> Result<StreamingResponse, TransportError> {
        let deadline = Instant::now() + max_wait;
        let (head, rest) = self.read_head(deadline, max_wait).await?;
        let framing = head.framing();
        let mut stream = StreamingResponse {
            conn: self,
            head,
            framing,
            encoded: Vec::new(),
            decoded: Vec::new(),
            chunks: VecDeque::new(),
            received: 0,
            finished: matches!(framing, Framing::Empty | Framing::Length(0)),
        };
        stream.feed(rest);
        Ok(stream)
    }

    /// Buffer until a full head parses; returns it with the bytes after it
    async fn read_head(
        &mut self,
        deadline: Instant,
        max_wait: Duration,
    ) -> Result<(RawHead, Vec<u8>), TransportError> {
        let mut buf = std::mem::take(&mut self.pending);
        loop {
            if let Some((head, len)) = parse_head(&buf)? {
                return Ok((head, buf.split_off(len)));
            }
            if buf.len() > MAX_HEAD_BYTES {
                return Err(TransportError::Malformed("response head too large".to_string()));
            }
            if self.closed {
                return Err(if buf.is_empty() {
                    TransportError::Closed
                } else {
                    TransportError::Malformed("connection closed inside response head".to_string())
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.read_some(&mut buf, remaining).await?.is_none() {
                return Err(TransportError::timeout("response head", max_wait));
            }
        }
    }

    /// Half-close the write side and drop the connection
    pub async fn shutdown(mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Returns `None` on timeout, `Some(0)` when the peer closed
    async fn read_some(
        &mut self,
        buf: &mut Vec<u8>,
        wait: Duration,
    ) -> Result<Option<usize>, TransportError> {
        let mut tmp = [0u8; READ_CHUNK];
        match timeout(wait, self.stream.read(&mut tmp)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.closed = true;
                Ok(Some(0))
            }
            Ok(Ok(n)) => {
                buf.extend_from_slice(&tmp[..n]);
                Ok(Some(n))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    pub(crate) fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn put_back(&mut self, bytes: Vec<u8>) {
        let mut joined = bytes;
        joined.extend_from_slice(&self.pending);
        self.pending = joined;
    }

    pub(crate) async fn fill(&mut self, wait: Duration) -> Result<Option<usize>, TransportError> {
        let mut buf = std::mem::take(&mut self.pending);
        let n = self.read_some(&mut buf, wait).await;
        self.pending = buf;
        n
    }

    pub(crate) fn pending(&self) -> &[u8] {
        &self.pending
    }
}

fn tls_connector() -> Result<TlsConnector, TransportError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Status line and headers of a raw response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

/// How the body after a head is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

impl RawHead {
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get("transfer-encoding")
            .map(|te| te.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn framing(&self) -> Framing {
        if (100..200).contains(&self.status) || self.status == 204 || self.status == 304 {
            Framing::Empty
        } else if self.is_chunked() {
            Framing::Chunked
        } else if let Some(len) = self.content_length() {
            Framing::Length(len)
        } else {
            Framing::UntilClose
        }
    }
}

/// Parse a response head. `Ok(None)` means more bytes are needed; on success
/// returns the head and the number of bytes it occupied.
pub fn parse_head(bytes: &[u8]) -> Result<Option<(RawHead, usize)>, TransportError> {
    let Some(end) = find(bytes, b"\r\n\r\n") else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes[..end]);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TransportError::Malformed(format!(
            "bad status line: {:?}",
            status_line
        )));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Malformed(format!("bad status line: {:?}", status_line)))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Headers::new();
    for line in lines {
        match line.split_once(':') {
            Some((name, value)) => headers.append(name, value.trim()),
            None => {
                return Err(TransportError::Malformed(format!(
                    "bad header line: {:?}",
                    line
                )))
            }
        }
    }

    Ok(Some((
        RawHead {
            version: version.to_string(),
            status,
            reason,
            headers,
        },
        end + 4,
    )))
}

/// Result of decoding a (possibly partial) chunked body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedBody {
    /// Chunk payloads in arrival order
    pub chunks: Vec<Vec<u8>>,
    /// The terminating zero-length chunk was seen
    pub complete: bool,
    /// Bytes of input consumed by whole chunks
    pub consumed: usize,
}

/// Decode `Transfer-Encoding: chunked` data, stopping at the first
/// incomplete chunk
pub fn decode_chunked(bytes: &[u8]) -> ChunkedBody {
    let mut out = ChunkedBody::default();
    let mut pos = 0;
    loop {
        let Some(line_end) = find(&bytes[pos..], b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&bytes[pos..pos + line_end]);
        let size_str = size_line.split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_str, 16) else {
            break;
        };
        let data_start = pos + line_end + 2;

        if size == 0 {
            // Trailers end with an empty line
            if let Some(trailer_end) = find(&bytes[data_start..], b"\r\n") {
                let mut end = data_start + trailer_end + 2;
                if trailer_end > 0 {
                    match find(&bytes[data_start..], b"\r\n\r\n") {
                        Some(idx) => end = data_start + idx + 4,
                        None => break,
                    }
                }
                out.complete = true;
                out.consumed = end;
            }
            break;
        }

        // A size past the end of the address space is never satisfiable
        let Some(data_end) = data_start.checked_add(size) else {
            break;
        };
        match data_end.checked_add(2) {
            Some(end) if end <= bytes.len() => {}
            _ => break,
        }
        out.chunks.push(bytes[data_start..data_end].to_vec());
        pos = data_end + 2;
        out.consumed = pos;
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A response read off a raw connection
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub head: RawHead,
    /// Body bytes exactly as they arrived (chunk framing included)
    pub raw_body: Vec<u8>,
    /// Body with transfer framing removed
    pub body: Vec<u8>,
    /// The framed body arrived in full
    pub complete: bool,
}

impl RawResponse {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Chunk boundaries as the server sent them
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        if self.head.is_chunked() {
            decode_chunked(&self.raw_body).chunks
        } else {
            vec![self.raw_body.clone()]
        }
    }

    pub fn into_normalized(self) -> NormalizedResponse {
        NormalizedResponse::new(self.head.status, self.head.headers, self.body)
    }
}

/// A response consumed piece by piece while the server keeps the
/// connection open. Dropping it closes the connection.
pub struct StreamingResponse {
    conn: RawConnection,
    pub head: RawHead,
    framing: Framing,
    /// Chunked bytes not yet decoded
    encoded: Vec<u8>,
    /// Decoded bytes not yet handed out by `read_until`
    decoded: Vec<u8>,
    /// Transfer chunks (or socket reads, when not chunked) not yet handed out
    chunks: VecDeque<Vec<u8>>,
    /// Body bytes seen so far, for `Content-Length` framing
    received: usize,
    finished: bool,
}

impl StreamingResponse {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// The server ended the body (terminating chunk, full length, or close)
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Headers as a `NormalizedResponse` with an empty body, for header rules
    pub fn head_response(&self) -> NormalizedResponse {
        NormalizedResponse::new(self.head.status, self.head.headers.clone(), Vec::new())
    }

    /// Next transfer chunk as the server framed it; `None` once the body has
    /// ended or nothing arrived within `wait`
    pub async fn next_chunk(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(chunk) = self.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.finished || remaining.is_zero() || !self.pump(remaining).await? {
                return Ok(None);
            }
        }
    }

    /// Decoded body up to and including the next `delimiter`; `None` if the
    /// body ended or `wait` passed first (buffered bytes are kept)
    pub async fn read_until(
        &mut self,
        delimiter: &[u8],
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            while let Some(chunk) = self.chunks.pop_front() {
                self.decoded.extend_from_slice(&chunk);
            }
            if let Some(idx) = find(&self.decoded, delimiter) {
                let rest = self.decoded.split_off(idx + delimiter.len());
                return Ok(Some(std::mem::replace(&mut self.decoded, rest)));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.finished || remaining.is_zero() || !self.pump(remaining).await? {
                return Ok(None);
            }
        }
    }

    /// Decoded body that arrives within `wait`, possibly nothing
    pub async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.finished || remaining.is_zero() || !self.pump(remaining).await? {
                break;
            }
        }
        let mut out = std::mem::take(&mut self.decoded);
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// One socket read; `false` on timeout
    async fn pump(&mut self, wait: Duration) -> Result<bool, TransportError> {
        let mut buf = Vec::new();
        if self.conn.read_some(&mut buf, wait).await?.is_none() {
            return Ok(false);
        }
        self.feed(buf);
        if self.conn.is_closed() {
            self.finished = true;
        }
        Ok(true)
    }

    fn feed(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() || self.finished {
            return;
        }
        match self.framing {
            Framing::Chunked => {
                self.encoded.extend_from_slice(&bytes);
                let decoded = decode_chunked(&self.encoded);
                self.chunks.extend(decoded.chunks);
                self.encoded.drain(..decoded.consumed);
                self.finished = decoded.complete;
            }
            Framing::Length(len) => {
                let take = bytes.len().min(len.saturating_sub(self.received));
                self.received += take;
                self.chunks.push_back(bytes[..take].to_vec());
                self.finished = self.received >= len;
            }
            Framing::UntilClose => self.chunks.push_back(bytes),
            Framing::Empty => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_head_needs_more_bytes() {
        assert!(parse_head(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_head() {
        let raw = b"HTTP/1.1 204 No Content\r\nAccess-Control-Max-Age: 31536000\r\nX-A: 1\r\n\r\nrest";
        let (head, len) = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.status, 204);
        assert_eq!(head.reason, "No Content");
        assert_eq!(head.headers.get("access-control-max-age"), Some("31536000"));
        assert_eq!(&raw[len..], b"rest");
        assert_eq!(head.framing(), Framing::Empty);
    }

    #[test]
    fn test_parse_head_rejects_garbage() {
        assert!(parse_head(b"SSH-2.0-OpenSSH\r\n\r\n").is_err());
        assert!(parse_head(b"HTTP/1.1 abc\r\n\r\n").is_err());
    }

    #[test]
    fn test_framing_selection() {
        let (head, _) = parse_head(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.framing(), Framing::Chunked);

        let (head, _) = parse_head(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.framing(), Framing::Length(12));

        let (head, _) = parse_head(b"HTTP/1.0 200 OK\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.framing(), Framing::UntilClose);
    }

    #[test]
    fn test_decode_chunked_complete() {
        let body = decode_chunked(b"2\r\no\n\r\n5;ext=1\r\nhello\r\n0\r\n\r\nNEXT");
        assert_eq!(body.chunks, vec![b"o\n".to_vec(), b"hello".to_vec()]);
        assert!(body.complete);
        assert_eq!(body.consumed, 28);
    }

    #[test]
    fn test_decode_chunked_partial() {
        let body = decode_chunked(b"2\r\no\n\r\nA\r\nhhh");
        assert_eq!(body.chunks, vec![b"o\n".to_vec()]);
        assert!(!body.complete);
        assert_eq!(body.consumed, 7);
    }

    #[test]
    fn test_decode_chunked_with_trailer() {
        let body = decode_chunked(b"1\r\na\r\n0\r\nX-T: 1\r\n\r\n");
        assert!(body.complete);
        assert_eq!(body.chunks.concat(), b"a");
    }

    #[test]
    fn test_decode_chunked_oversized_length() {
        let body = decode_chunked(b"ffffffffffffffff\r\nabc");
        assert!(body.chunks.is_empty());
        assert!(!body.complete);
        assert_eq!(body.consumed, 0);

        let body = decode_chunked(b"1\r\na\r\nfffffffffffffffe\r\nabc");
        assert_eq!(body.chunks, vec![b"a".to_vec()]);
        assert_eq!(body.consumed, 6);
    }

    #[test]
    fn test_raw_response_chunks() {
        let (head, _) = parse_head(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap()
            .unwrap();
        let raw_body = b"2\r\no\n\r\n2\r\nh\n\r\n".to_vec();
        let resp = RawResponse {
            head,
            body: decode_chunked(&raw_body).chunks.concat(),
            raw_body,
            complete: false,
        };
        assert_eq!(resp.chunks().len(), 2);
        let normalized = resp.into_normalized();
        assert_eq!(normalized.body(), b"o\nh\n");
    }
}
