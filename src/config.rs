//! Run configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `SOCKJS_*` environment variables. The CLI applies its own overrides last.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoints;
use crate::error::EndpointError;

/// Default root URL of the server under test
pub const DEFAULT_URL: &str = "http://localhost:8081";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "sockprobe.toml";

/// Environment variable prefix (`SOCKJS_URL`, `SOCKJS_REQUEST_TIMEOUT_SECS`, ...)
pub const ENV_PREFIX: &str = "SOCKJS_";

/// Harness configuration, constructed once per run and passed to every scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL; services are derived by appending `/echo`, `/close`, ...
    pub url: String,
    /// Whole-request timeout for HTTP probes
    pub request_timeout_secs: u64,
    /// TCP (and TLS) connect timeout
    pub connect_timeout_secs: u64,
    /// How long streaming reads wait for bytes before returning what arrived
    pub stream_wait_ms: u64,
    /// Server-side session inactivity window; pacing steps wait past it
    pub session_timeout_secs: u64,
    /// Follow redirects in HTTP probes (off: redirects are observed, not followed)
    pub follow_redirects: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            stream_wait_ms: 1000,
            session_timeout_secs: 5,
            follow_redirects: false,
        }
    }
}

impl Config {
    /// Load defaults, then `path` (or `sockprobe.toml` if present), then env
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack used by `load`
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Override the root URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_wait(&self) -> Duration {
        Duration::from_millis(self.stream_wait_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Pause long enough for a server session to expire
    pub fn expiry_pause(&self) -> Duration {
        self.session_timeout() + Duration::from_secs(1)
    }

    /// Derive the service endpoints from the root URL
    pub fn endpoints(&self) -> Result<Endpoints, EndpointError> {
        Endpoints::from_root(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.url, "http://localhost:8081");
        assert!(!config.follow_redirects);
        assert_eq!(config.expiry_pause(), Duration::from_secs(6));
    }

    #[test]
    fn test_load_without_sources_gives_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(None)?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_url() {
        Jail::expect_with(|jail| {
            jail.set_env("SOCKJS_URL", "http://example.test:9999");
            jail.set_env("SOCKJS_SESSION_TIMEOUT_SECS", "7");
            let config = Config::load(None)?;
            assert_eq!(config.url, "http://example.test:9999");
            assert_eq!(config.session_timeout_secs, 7);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                    url = "http://from-file:1"
                    stream_wait_ms = 250
                "#,
            )?;
            jail.set_env("SOCKJS_URL", "http://from-env:2");
            let config = Config::load(Some(Path::new("custom.toml")))?;
            assert_eq!(config.url, "http://from-env:2");
            assert_eq!(config.stream_wait_ms, 250);
            assert_eq!(config.request_timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_default_file_is_picked_up() {
        Jail::expect_with(|jail| {
            jail.create_file("sockprobe.toml", "follow_redirects = true")?;
            let config = Config::load(None)?;
            assert!(config.follow_redirects);
            Ok(())
        });
    }
}
