//! Client options.
//!
//! Every field has a default, so a config can be loaded from any serde format
//! with only the fields that differ:
//!
//! ```
//! use micro_client::ClientConfig;
//!
//! let config: ClientConfig = serde_json::from_str(r#"{ "retries": 1, "backoff": { "jitter": 0.0 } }"#).unwrap();
//! assert_eq!(config.retries, 1);
//! assert_eq!(config.redirect_limit, 3);
//! ```

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connections per scheme/host/port.
    pub connection_limit: usize,
    /// Transactions in flight on one connection; 1 disables pipelining.
    pub pipeline_limit: usize,
    /// Transactions one connection may carry before it is retired.
    pub reuse_limit: Option<usize>,
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest silence while waiting for response bytes; 0 disables the read
    /// timeout. Disabled by default rather than the common 60 seconds, so a
    /// slow endpoint only fails when the caller asks for it.
    pub read_timeout_secs: u64,

    pub retry: bool,
    /// Extra attempts after the first one.
    pub retries: usize,
    pub retry_non_idempotent: bool,
    pub retry_statuses: RangeInclusive<u16>,
    pub backoff: BackoffConfig,

    pub redirect: bool,
    pub redirect_limit: usize,
    /// Copy the previous request's headers onto redirected requests.
    pub forward_headers: bool,

    /// Turn error statuses into [`Error::Status`](crate::Error::Status).
    pub status_exception: bool,
    pub cookies: bool,
    pub canonicalize_headers: bool,
    /// Send url credentials as `Authorization: Basic`. Enabled by default:
    /// credentials written into the url are meant to be used.
    pub basic_authorization: bool,
    /// Verify server certificates. Enabled by default; turning it off accepts
    /// any certificate.
    pub require_ssl_verification: bool,
    pub user_agent: Option<String>,
    /// Replaces the query string of the request url.
    pub query: Option<Vec<(String, String)>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_limit: 8,
            pipeline_limit: 16,
            reuse_limit: None,
            idle_timeout_secs: 60,
            connect_timeout_secs: 10,
            read_timeout_secs: 0,
            retry: true,
            retries: 4,
            retry_non_idempotent: false,
            retry_statuses: 500..=599,
            backoff: BackoffConfig::default(),
            redirect: true,
            redirect_limit: 3,
            forward_headers: false,
            status_exception: true,
            cookies: false,
            canonicalize_headers: false,
            basic_authorization: true,
            require_ssl_verification: true,
            user_agent: Some(concat!("micro-client/", env!("CARGO_PKG_VERSION")).to_string()),
            query: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn pipeline_limit(mut self, limit: usize) -> Self {
        self.pipeline_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn reuse_limit(mut self, limit: Option<usize>) -> Self {
        self.reuse_limit = limit;
        self
    }

    /// Sets the read timeout in whole seconds, rounding a fraction up so a
    /// short timeout never turns into none.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn retry_non_idempotent(mut self, enabled: bool) -> Self {
        self.retry_non_idempotent = enabled;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    #[must_use]
    pub fn redirect_limit(mut self, limit: usize) -> Self {
        self.redirect_limit = limit;
        self
    }

    #[must_use]
    pub fn forward_headers(mut self, forward: bool) -> Self {
        self.forward_headers = forward;
        self
    }

    #[must_use]
    pub fn status_exception(mut self, enabled: bool) -> Self {
        self.status_exception = enabled;
        self
    }

    #[must_use]
    pub fn cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    #[must_use]
    pub fn canonicalize_headers(mut self, enabled: bool) -> Self {
        self.canonicalize_headers = enabled;
        self
    }

    #[must_use]
    pub fn basic_authorization(mut self, enabled: bool) -> Self {
        self.basic_authorization = enabled;
        self
    }

    #[must_use]
    pub fn require_ssl_verification(mut self, required: bool) -> Self {
        self.require_ssl_verification = required;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn query<K: Into<String>, V: Into<String>>(mut self, query: impl IntoIterator<Item = (K, V)>) -> Self {
        self.query = Some(query.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            connection_limit: self.connection_limit.max(1),
            pipeline_limit: self.pipeline_limit.max(1),
            reuse_limit: self.reuse_limit,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn read_timeout_duration(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn is_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Randomised exponential backoff between retries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub first_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    /// Each delay is stretched by up to this fraction.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { first_delay_ms: 50, factor: 2.0, max_delay_ms: 10_000, jitter: 0.1 }
    }
}

/// Limits the pool enforces, derived from [`ClientConfig::pool_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub connection_limit: usize,
    pub pipeline_limit: usize,
    pub reuse_limit: Option<usize>,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        ClientConfig::default().pool_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connection_limit, 8);
        assert_eq!(config.pipeline_limit, 16);
        assert_eq!(config.retries, 4);
        assert!(config.is_retry_status(503));
        assert!(!config.is_retry_status(404));
        assert_eq!(config.read_timeout_duration(), None);
        assert!(config.basic_authorization);
        assert!(config.require_ssl_verification);
        assert!(config.user_agent.as_deref().unwrap().starts_with("micro-client/"));
    }

    #[test]
    fn deserialize_partial_config() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "pipeline_limit": 1,
                "reuse_limit": 10,
                "read_timeout_secs": 30,
                "retry_statuses": { "start": 502, "end": 504 },
                "backoff": { "first_delay_ms": 10 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.pipeline_limit, 1);
        assert_eq!(config.reuse_limit, Some(10));
        assert_eq!(config.read_timeout_duration(), Some(Duration::from_secs(30)));
        assert!(config.is_retry_status(503) && !config.is_retry_status(500));
        assert_eq!(config.backoff.first_delay_ms, 10);
        assert_eq!(config.backoff.max_delay_ms, 10_000);
        assert!(config.redirect);
    }

    #[test]
    fn pool_config_never_zero() {
        let mut config = ClientConfig::default();
        config.connection_limit = 0;
        config.pipeline_limit = 0;

        let pool = config.pool_config();
        assert_eq!(pool.connection_limit, 1);
        assert_eq!(pool.pipeline_limit, 1);
        assert_eq!(pool.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn read_timeout_rounds_up() {
        let config = ClientConfig::new().read_timeout(Duration::from_millis(500));
        assert_eq!(config.read_timeout_duration(), Some(Duration::from_secs(1)));

        let config = ClientConfig::new().read_timeout(Duration::from_millis(2001));
        assert_eq!(config.read_timeout_secs, 3);

        let config = ClientConfig::new().read_timeout(Duration::from_secs(2)).read_timeout(Duration::ZERO);
        assert_eq!(config.read_timeout_duration(), None);
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::new().pipeline_limit(1).retries(0).query([("a", "1")]);
        assert_eq!(config.pipeline_limit, 1);
        assert_eq!(config.retries, 0);
        assert_eq!(config.query, Some(vec![("a".to_string(), "1".to_string())]));
    }
}
