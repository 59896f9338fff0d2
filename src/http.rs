//! HTTP probe client
//!
//! Thin layer over reqwest that:
//! - never pools connections (every probe opens its own)
//! - never follows redirects unless configured to
//! - takes its cookie jar from the caller
//! - turns every network failure into a `TransportError`

use std::io;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::cookie::CookieJar;
use crate::error::TransportError;
use crate::response::{Headers, NormalizedResponse};

/// Maximum redirects when following is enabled
const MAX_REDIRECTS: usize = 10;

/// One HTTP request to issue
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ProbeRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<K: Into<String>, V: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Handle to a probe running on its own task
pub struct ProbeHandle {
    inner: JoinHandle<Result<NormalizedResponse, TransportError>>,
}

impl ProbeHandle {
    /// Wait for the probe to finish
    pub async fn join(self) -> Result<NormalizedResponse, TransportError> {
        self.inner.await?
    }

    /// Wait at most `wait`; `None` means the server is still holding the
    /// request, which is then abandoned and its connection closed
    pub async fn join_within(
        mut self,
        wait: Duration,
    ) -> Result<Option<NormalizedResponse>, TransportError> {
        match tokio::time::timeout(wait, &mut self.inner).await {
            Ok(joined) => joined?.map(Some),
            Err(_) => {
                self.inner.abort();
                Ok(None)
            }
        }
    }
}

/// Join every handle, preserving launch order. Every request finishes before
/// the first error (in launch order) is returned.
pub async fn join_all(
    handles: Vec<ProbeHandle>,
) -> Result<Vec<NormalizedResponse>, TransportError> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.join().await);
    }
    results.into_iter().collect()
}

/// HTTP probe client; cheap to clone
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    jar: Option<CookieJar>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let policy = if config.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };

        let client = Client::builder()
            .redirect(policy)
            .pool_max_idle_per_host(0)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            jar: None,
            timeout: config.request_timeout(),
        })
    }

    /// Same client, sending and collecting cookies through `jar`
    pub fn with_jar(&self, jar: CookieJar) -> Self {
        Self {
            client: self.client.clone(),
            jar: Some(jar),
            timeout: self.timeout,
        }
    }

    pub fn jar(&self) -> Option<&CookieJar> {
        self.jar.as_ref()
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<NormalizedResponse, TransportError> {
        self.execute(ProbeRequest::get(url).headers(headers.iter().copied()))
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: impl Into<Vec<u8>>,
    ) -> Result<NormalizedResponse, TransportError> {
        self.execute(
            ProbeRequest::post(url)
                .headers(headers.iter().copied())
                .body(body),
        )
        .await
    }

    pub async fn options(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<NormalizedResponse, TransportError> {
        self.execute(ProbeRequest::options(url).headers(headers.iter().copied()))
            .await
    }

    pub fn spawn_get(&self, url: &str, headers: &[(&str, &str)]) -> ProbeHandle {
        self.spawn(ProbeRequest::get(url).headers(headers.iter().copied()))
    }

    pub fn spawn_post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: impl Into<Vec<u8>>,
    ) -> ProbeHandle {
        self.spawn(
            ProbeRequest::post(url)
                .headers(headers.iter().copied())
                .body(body),
        )
    }

    pub fn spawn_options(&self, url: &str, headers: &[(&str, &str)]) -> ProbeHandle {
        self.spawn(ProbeRequest::options(url).headers(headers.iter().copied()))
    }

    /// Issue `request` on its own task without blocking the caller
    pub fn spawn(&self, request: ProbeRequest) -> ProbeHandle {
        let probe = self.clone();
        ProbeHandle {
            inner: tokio::spawn(async move { probe.execute(request).await }),
        }
    }

    /// Issue `request` and wait for the complete response
    pub async fn execute(&self, request: ProbeRequest) -> Result<NormalizedResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.has_header("cookie") {
            if let Some(cookie) = self.jar.as_ref().and_then(CookieJar::header_value) {
                builder = builder.header("cookie", cookie);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| self.classify(e, &request.url))?;

        let status = resp.status().as_u16();
        let headers: Headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| self.classify(e, &request.url))?
            .to_vec();

        debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            "probe complete"
        );

        let response = NormalizedResponse::new(status, headers, body);
        if let Some(jar) = &self.jar {
            jar.store_all(response.cookies());
        }
        Ok(response)
    }

    fn classify(&self, err: reqwest::Error, url: &str) -> TransportError {
        if err.is_timeout() {
            TransportError::timeout("http request", self.timeout)
        } else if err.is_connect() {
            TransportError::Connect {
                target: url.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, err.to_string()),
            }
        } else {
            TransportError::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_request_builder() {
        let req = ProbeRequest::options("http://localhost/echo/info")
            .header("Origin", "test")
            .headers([("Access-Control-Request-Method", "GET")])
            .body("x");
        assert_eq!(req.method, Method::OPTIONS);
        assert_eq!(req.headers.len(), 2);
        assert!(req.has_header("origin"));
        assert!(!req.has_header("cookie"));
        assert_eq!(req.body.as_deref(), Some(&b"x"[..]));
    }

    #[tokio::test]
    async fn test_join_all_waits_for_every_handle() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let finished = Arc::new(AtomicBool::new(false));
        let slow = finished.clone();
        let handles = vec![
            ProbeHandle {
                inner: tokio::spawn(async { Err(TransportError::Closed) }),
            },
            ProbeHandle {
                inner: tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    slow.store(true, Ordering::SeqCst);
                    Ok(NormalizedResponse::new(200, Headers::new(), Vec::new()))
                }),
            },
        ];

        let err = join_all(handles).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_join_within_abandons_held_request() {
        let held = ProbeHandle {
            inner: tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(TransportError::Closed)
            }),
        };
        let joined = held.join_within(Duration::from_millis(50)).await.unwrap();
        assert!(joined.is_none());

        let quick = ProbeHandle {
            inner: tokio::spawn(async {
                Ok(NormalizedResponse::new(204, Headers::new(), Vec::new()))
            }),
        };
        let joined = quick.join_within(Duration::from_secs(1)).await.unwrap();
        assert_eq!(joined.map(|r| r.status()), Some(204));
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        // Port 9 (discard) on loopback is closed on any sane test host
        let config = Config {
            connect_timeout_secs: 1,
            request_timeout_secs: 2,
            ..Config::default()
        };
        let probe = HttpProbe::new(&config).unwrap();
        let err = probe.get("http://127.0.0.1:9/echo", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout { .. } | TransportError::Http(_)
        ));
    }
}
