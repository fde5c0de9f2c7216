use std::env;
use std::time::Duration;

use crate::{BlobError, BlobResult};

/// Configuration for the HTTP transport a manager builds on first use
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Whole-request timeout. `None` lets long streams run as long as they need.
    pub timeout: Option<Duration>,

    /// Time allowed to establish a connection
    pub connect_timeout: Duration,

    /// How long an idle pooled connection is kept around
    pub pool_idle_timeout: Duration,

    /// `User-Agent` sent with every request
    pub user_agent: String,

    /// Speak HTTP/2 without ALPN negotiation
    pub http2_prior_knowledge: bool,

    /// Cap on how much of an error response body is kept for diagnostics
    pub max_error_body_bytes: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: concat!("urlblob/", env!("CARGO_PKG_VERSION")).to_string(),
            http2_prior_knowledge: false,
            max_error_body_bytes: 64 * 1024,
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `URLBLOB_*` environment variables.
    ///
    /// Recognized: `URLBLOB_TIMEOUT_SECS`, `URLBLOB_CONNECT_TIMEOUT_SECS`,
    /// `URLBLOB_POOL_IDLE_TIMEOUT_SECS`, `URLBLOB_USER_AGENT`, `URLBLOB_HTTP2`.
    pub fn from_env() -> BlobResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> BlobResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn secs(key: &str, value: &str) -> BlobResult<Duration> {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| BlobError::invalid_config(key, value))
        }

        let mut config = Self::default();

        if let Some(value) = lookup("URLBLOB_TIMEOUT_SECS") {
            config.timeout = Some(secs("URLBLOB_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("URLBLOB_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = secs("URLBLOB_CONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("URLBLOB_POOL_IDLE_TIMEOUT_SECS") {
            config.pool_idle_timeout = secs("URLBLOB_POOL_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("URLBLOB_USER_AGENT") {
            config.user_agent = value;
        }
        if let Some(value) = lookup("URLBLOB_HTTP2") {
            config.http2_prior_knowledge = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => return Err(BlobError::invalid_config("URLBLOB_HTTP2", value)),
            };
        }

        Ok(config)
    }

    /// Set a whole-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set idle pool timeout
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use HTTP/2 prior knowledge
    pub fn with_http2_prior_knowledge(mut self) -> Self {
        self.http2_prior_knowledge = true;
        self
    }

    /// Set the diagnostic body cap for error responses
    pub fn with_max_error_body_bytes(mut self, bytes: usize) -> Self {
        self.max_error_body_bytes = bytes;
        self
    }
}
