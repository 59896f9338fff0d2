//! Service endpoints and session URLs
//!
//! A base URL identifies one SockJS service. Everything under it belongs to
//! the server; the harness only appends protocol-defined suffixes.

use std::fmt;

use reqwest::Url;

use crate::error::EndpointError;

/// One logical service exposed by the server under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
}

impl Endpoint {
    /// Create an endpoint. The base URL must be absolute and must not end with `/`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EndpointError> {
        let base_url = base_url.into();
        if base_url.ends_with('/') {
            return Err(EndpointError::TrailingSlash(base_url));
        }
        let parsed = Url::parse(&base_url).map_err(|e| EndpointError::Invalid {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EndpointError::Invalid {
                url: base_url,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if parsed.host_str().is_none() {
            return Err(EndpointError::Invalid {
                url: base_url,
                reason: "missing host".to_string(),
            });
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base_url + suffix`, verbatim (suffixes like `//` are intentional)
    pub fn url(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url, suffix)
    }

    /// Transport URLs for one session
    pub fn session(&self, server_id: &str, session_id: &str) -> SessionUrl {
        SessionUrl {
            prefix: format!("{}/{}/{}", self.base_url, server_id, session_id),
        }
    }

    /// A session with a fresh random id under server id `000`
    pub fn fresh_session(&self) -> SessionUrl {
        self.session("000", &new_session_id())
    }

    /// `ws://` / `wss://` form of `base_url + suffix`
    pub fn ws_url(&self, suffix: &str) -> String {
        to_ws_scheme(&self.url(suffix))
    }

    /// Host, port, and TLS flag for raw connections
    pub fn authority(&self) -> Authority {
        // Validated in `new`
        let parsed = Url::parse(&self.base_url).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or("localhost")
            .to_string();
        let tls = parsed.as_ref().map(|u| u.scheme() == "https").unwrap_or(false);
        let port = parsed
            .as_ref()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(if tls { 443 } else { 80 });
        Authority { host, port, tls }
    }

    /// Path component of `base_url + suffix`, for raw request lines
    pub fn path(&self, suffix: &str) -> String {
        let full = self.url(suffix);
        let after_scheme = full.split_once("://").map(|(_, rest)| rest).unwrap_or(&full);
        match after_scheme.find('/') {
            Some(idx) => after_scheme[idx..].to_string(),
            None => "/".to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Where to open a raw connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Authority {
    /// Value for the `Host` header
    pub fn host_header(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// `base_url/<server_id>/<session_id>`; transports hang off it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUrl {
    prefix: String,
}

impl SessionUrl {
    /// `.../<server_id>/<session_id>/<transport>`
    pub fn transport(&self, transport: &str) -> String {
        format!("{}/{}", self.prefix, transport)
    }

    pub fn ws(&self) -> String {
        to_ws_scheme(&self.transport("websocket"))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// The services a conforming test server exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Echoes every message back
    pub echo: Endpoint,
    /// Closes every session immediately after opening it
    pub close: Endpoint,
    /// Echo with the websocket transport turned off
    pub wsoff: Endpoint,
    /// Echo that requires `JSESSIONID` cookies
    pub cookie_needed: Endpoint,
}

impl Endpoints {
    pub fn from_root(root: &str) -> Result<Self, EndpointError> {
        let root = root.trim_end_matches('/');
        Ok(Self {
            echo: Endpoint::new(format!("{}/echo", root))?,
            close: Endpoint::new(format!("{}/close", root))?,
            wsoff: Endpoint::new(format!("{}/disabled_websocket_echo", root))?,
            cookie_needed: Endpoint::new(format!("{}/cookie_needed_echo", root))?,
        })
    }
}

/// Random session id, unique per scenario
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Authority and request target (path plus query) of an absolute
/// `http`, `https`, `ws` or `wss` URL
pub fn request_target(url: &str) -> Result<(Authority, String), EndpointError> {
    let invalid = |reason: String| EndpointError::Invalid {
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    let tls = match parsed.scheme() {
        "http" | "ws" => false,
        "https" | "wss" => true,
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?
        .to_string();
    let port = parsed
        .port_or_known_default()
        .unwrap_or(if tls { 443 } else { 80 });
    let target = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };
    Ok((Authority { host, port, tls }, target))
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}
