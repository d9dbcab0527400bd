//! Sync configuration
//!
//! Endpoint and tuning knobs for the replay engine. Values come from
//! the embedding application or from environment variables
//! (`WISHSYNC_ENDPOINT`, `WISHSYNC_AUTH_TOKEN`) for headless use.

use std::time::Duration;

use crate::util::normalize_text_option;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Configuration for the sync core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Base URL of the wishlist API (e.g. `https://api.example.com`)
    pub endpoint: Option<String>,
    /// Bearer token for authenticated requests
    pub auth_token: Option<String>,
    /// Bound on each network call; a timeout counts as transient
    pub request_timeout: Duration,
    /// Fallback drain poll when no event-driven trigger fires
    pub poll_interval: Duration,
    /// First retry delay after a transient failure
    pub retry_base_delay: Duration,
    /// Cap on the exponential retry delay
    pub retry_max_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl SyncSettings {
    /// Create settings for the given endpoint
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Load settings from the environment, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            endpoint: normalize_text_option(std::env::var("WISHSYNC_ENDPOINT").ok()),
            auth_token: normalize_text_option(std::env::var("WISHSYNC_AUTH_TOKEN").ok()),
            ..Self::default()
        }
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the fallback poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry backoff bounds
    #[must_use]
    pub const fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Whether an endpoint is configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}
