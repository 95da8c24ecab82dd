//! Gateway configuration.

use std::env;

use common::{JwtConfig, RateLimitConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Redis URL for caching and rate limiting
    pub redis_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Access token verification
    pub jwt: JwtConfig,
    /// Requests per client and path
    pub rate_limit: RateLimitConfig,
    /// How long a SEFAZ status answer is served from cache
    pub sefaz_status_ttl_seconds: u64,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env::var("GATEWAY_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .unwrap_or(defaults.redis_url),
            host: env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").unwrap_or_default(),
                leeway_seconds: env::var("JWT_LEEWAY_SECONDS")
                    .ok()
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(defaults.jwt.leeway_seconds),
            },
            rate_limit: RateLimitConfig {
                max_requests: env::var("RATE_LIMIT_REQUESTS")
                    .ok()
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(defaults.rate_limit.max_requests),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(defaults.rate_limit.window_seconds),
            },
            sefaz_status_ttl_seconds: env::var("SEFAZ_STATUS_CACHE_SECONDS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.sefaz_status_ttl_seconds),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            jwt: JwtConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sefaz_status_ttl_seconds: 60,
        }
    }
}
