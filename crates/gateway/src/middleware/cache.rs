//! Redis cache for SEFAZ status answers and rate limiting.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{FiscalModel, SefazStatus};

/// Cache key prefix for SEFAZ status answers
const CACHE_PREFIX_SEFAZ_STATUS: &str = "sefaz_status:";

/// Cache key prefix for rate limiting
const CACHE_PREFIX_RATE_LIMIT: &str = "rate_limit:";

/// Key/value operations the gateway needs from its cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Increment a counter, starting its expiry on the first hit.
    async fn incr_window(&self, key: &str, window_seconds: u64) -> AppResult<u64>;
}

/// Redis-backed cache.
pub struct RedisBackend {
    conn: ConnectionManager,
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| {
            warn!("Redis get error for key {}: {}", key, e);
            AppError::Cache(e)
        })
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(|e| {
                warn!("Redis set error for key {}: {}", key, e);
                AppError::Cache(e)
            })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| {
            warn!("Redis delete error for key {}: {}", key, e);
            AppError::Cache(e)
        })
    }

    async fn incr_window(&self, key: &str, window_seconds: u64) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let count = conn.incr::<_, _, u64>(key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, window_seconds as i64).await?;
        }
        Ok(count)
    }
}

/// Typed cache on top of a [`CacheBackend`].
pub struct Cache {
    backend: Box<dyn CacheBackend>,
}

impl Cache {
    /// Connect to Redis.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        debug!("Connecting to Redis at {}", url);
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_backend(RedisBackend { conn }))
    }

    pub fn with_backend(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    // =========================================================================
    // Generic Cache Operations
    // =========================================================================

    /// Get a value from cache.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.backend.get(key).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Failed to deserialize cached value for key {}: {}", key, e);
                    Ok(None) // Treat deserialization errors as cache miss
                }
            },
            None => Ok(None),
        }
    }

    /// Set a value in cache with TTL.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::internal(format!("Serialization error: {}", e)))?;
        self.backend.set_ex(key, json, ttl_seconds).await
    }

    /// Delete a value from cache.
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.backend.delete(key).await
    }

    // =========================================================================
    // SEFAZ Status
    // =========================================================================

    pub async fn get_sefaz_status(&self, tenant_id: &Uuid, model: FiscalModel) -> AppResult<Option<SefazStatus>> {
        self.get(&sefaz_status_key(tenant_id, model)).await
    }

    pub async fn set_sefaz_status(
        &self,
        tenant_id: &Uuid,
        status: &SefazStatus,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        self.set_with_ttl(&sefaz_status_key(tenant_id, status.model), status, ttl_seconds)
            .await
    }

    /// Forget cached answers after the tenant's profile changed.
    pub async fn invalidate_sefaz_status(&self, tenant_id: &Uuid) -> AppResult<()> {
        for model in [FiscalModel::Nfe, FiscalModel::Nfce] {
            self.delete(&sefaz_status_key(tenant_id, model)).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Rate Limiting
    // =========================================================================

    /// Check rate limit and increment counter.
    /// Returns (current_count, allowed).
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u64,
        window_seconds: u64,
    ) -> AppResult<(u64, bool)> {
        let key = format!("{}{}", CACHE_PREFIX_RATE_LIMIT, identifier);
        let count = self.backend.incr_window(&key, window_seconds).await?;
        Ok((count, count <= max_requests))
    }
}

fn sefaz_status_key(tenant_id: &Uuid, model: FiscalModel) -> String {
    format!("{}{}:{}", CACHE_PREFIX_SEFAZ_STATUS, tenant_id, model)
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryBackend;
    use super::*;
    use chrono::Utc;
    use domain::{Environment, Uf};

    fn status(model: FiscalModel) -> SefazStatus {
        SefazStatus {
            uf: Uf::SP,
            model,
            environment: Environment::Homologation,
            status_code: 107,
            status_message: "Servico em Operacao".to_string(),
            received_at: None,
            average_seconds: Some(1),
            observation: None,
            checked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sefaz_status_is_cached_per_model() {
        let cache = Cache::with_backend(MemoryBackend::default());
        let tenant = Uuid::new_v4();

        cache.set_sefaz_status(&tenant, &status(FiscalModel::Nfce), 60).await.unwrap();
        assert!(cache.get_sefaz_status(&tenant, FiscalModel::Nfce).await.unwrap().is_some());
        assert!(cache.get_sefaz_status(&tenant, FiscalModel::Nfe).await.unwrap().is_none());
        assert!(cache.get_sefaz_status(&Uuid::new_v4(), FiscalModel::Nfce).await.unwrap().is_none());

        cache.invalidate_sefaz_status(&tenant).await.unwrap();
        assert!(cache.get_sefaz_status(&tenant, FiscalModel::Nfce).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_counts_per_identifier() {
        let cache = Cache::with_backend(MemoryBackend::default());

        assert_eq!(cache.check_rate_limit("a", 2, 60).await.unwrap(), (1, true));
        assert_eq!(cache.check_rate_limit("a", 2, 60).await.unwrap(), (2, true));
        assert_eq!(cache.check_rate_limit("a", 2, 60).await.unwrap(), (3, false));
        assert_eq!(cache.check_rate_limit("b", 2, 60).await.unwrap(), (1, true));
    }

    #[tokio::test]
    async fn test_garbage_entry_is_a_miss() {
        let backend = MemoryBackend::default();
        backend
            .set_ex("sefaz_status:x", "not json".to_string(), 60)
            .await
            .unwrap();
        let cache = Cache::with_backend(backend);
        let value: Option<SefazStatus> = cache.get("sefaz_status:x").await.unwrap();
        assert!(value.is_none());
    }
}
