use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::cookie::CookieJar;
use crate::endpoint::{request_target, Endpoint, Endpoints};
use crate::error::{HandshakeError, TransportError};
use crate::http::HttpProbe;
use crate::raw::{RawConnection, StreamingResponse};
use crate::ws::{self, HandshakeRequest, OpenSocket, RawSocket};

/// Everything a step may touch. Built fresh for every scenario; clones
/// share the scenario's cookie jar.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub config: Arc<Config>,
    pub endpoints: Arc<Endpoints>,
    pub http: HttpProbe,
    pub jar: CookieJar,
}

impl ScenarioContext {
    pub fn new(config: Arc<Config>, endpoints: Arc<Endpoints>, http: &HttpProbe) -> Self {
        let jar = CookieJar::new();
        Self {
            config,
            endpoints,
            http: http.with_jar(jar.clone()),
            jar,
        }
    }

    /// How long streaming reads wait for more bytes
    pub fn stream_wait(&self) -> Duration {
        self.config.stream_wait()
    }

    /// Raw connection to the host serving `endpoint`
    pub async fn raw(&self, endpoint: &Endpoint) -> Result<RawConnection, TransportError> {
        RawConnection::open_authority(&endpoint.authority(), self.config.connect_timeout()).await
    }

    /// Send a request over a raw connection and return as soon as the
    /// response head arrives; the body is read incrementally
    pub async fn stream(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<StreamingResponse, TransportError> {
        let (authority, target) = request_target(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut conn =
            RawConnection::open_authority(&authority, self.config.connect_timeout()).await?;

        let mut all: Vec<(&str, &str)> = headers.to_vec();
        if method == "POST" && !all.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-length")) {
            all.push(("Content-Length", "0"));
        }
        let cookie = self.jar.header_value();
        if let Some(cookie) = cookie.as_deref() {
            if !all.iter().any(|(k, _)| k.eq_ignore_ascii_case("cookie")) {
                all.push(("Cookie", cookie));
            }
        }
        conn.write_head(method, &target, &all).await?;

        let response = conn.read_streaming(self.config.request_timeout()).await?;
        self.jar.store_all(response.head_response().cookies());
        Ok(response)
    }

    pub async fn websocket(&self, url: &str) -> Result<OpenSocket, HandshakeError> {
        ws::handshake(url, &[], self.config.request_timeout()).await
    }

    pub async fn raw_websocket(
        &self,
        url: &str,
        request: HandshakeRequest,
    ) -> Result<RawSocket, HandshakeError> {
        ws::raw_handshake(
            url,
            request,
            self.config.connect_timeout(),
            self.config.request_timeout(),
        )
        .await
    }
}
