//! Shared configuration structures.

use serde::{Deserialize, Serialize};

/// JWT configuration for verifying back-office access tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwtConfig {
    #[serde(skip_serializing)]
    pub secret: String,
    /// Clock skew tolerated on `exp`
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            leeway_seconds: 30,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u64,
    /// Window size in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 60,
        }
    }
}

/// SEFAZ web-service client and polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SefazClientConfig {
    /// Replaces scheme and host of every catalog endpoint (proxies, tests)
    pub base_url_override: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Polls of one document before it is left for manual refresh
    pub max_poll_attempts: u32,
    /// First retry delay; doubled on every attempt
    pub poll_backoff_base_ms: u64,
    /// Worker tick
    pub poll_interval_secs: u64,
    /// Documents handled per tick
    pub poll_batch_size: u64,
    /// How long a claimed batch stays hidden from other pollers
    pub claim_lease_secs: u64,
}

impl Default for SefazClientConfig {
    fn default() -> Self {
        Self {
            base_url_override: None,
            connect_timeout_ms: 5000,
            request_timeout_ms: 30000,
            max_poll_attempts: 12,
            poll_backoff_base_ms: 5000,
            poll_interval_secs: 10,
            poll_batch_size: 50,
            claim_lease_secs: 300,
        }
    }
}
