//! Middleware for authentication, rate limiting, and caching.

mod auth;
mod cache;
mod rate_limit;

pub use auth::{auth_middleware, require_admin, Claims, CurrentUser, TokenVerifier};
pub use cache::{Cache, CacheBackend, RedisBackend};
pub use rate_limit::rate_limit_middleware;

#[cfg(test)]
pub use auth::testing;
#[cfg(test)]
pub use cache::memory::MemoryBackend;
