//! Redis store backend.
//!
//! One Redis hash per key, accessed through a `deadpool-redis` connection
//! pool so concurrent request tasks never share a connection.
//!
//! | Operation              | Command                 |
//! |------------------------|-------------------------|
//! | `get_hash`             | `HGETALL key`           |
//! | `set_hash_fields`      | `HSET key f1 v1 f2 v2…` |
//! | `increment_hash_field` | `HINCRBY key field n`   |
//! | `list_keys_by_prefix`  | `KEYS prefix*`          |

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::traits::KvStore;

/// Connection settings for [`RedisStore::connect`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of pooled connections
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Redis-backed [`KvStore`].
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a pool from `options` and verify that a connection can be opened.
    pub async fn connect(options: &RedisOptions) -> Result<Self, StoreError> {
        let mut redis_config = deadpool_redis::Config::from_url(&options.url);
        if let Some(ref mut pool_config) = redis_config.pool {
            pool_config.max_size = options.pool_size;
            pool_config.timeouts.wait = Some(options.timeout);
            pool_config.timeouts.create = Some(options.timeout);
            pool_config.timeouts.recycle = Some(options.timeout);
        } else {
            let mut pool_config = deadpool_redis::PoolConfig::new(options.pool_size);
            pool_config.timeouts.wait = Some(options.timeout);
            pool_config.timeouts.create = Some(options.timeout);
            pool_config.timeouts.recycle = Some(options.timeout);
            redis_config.pool = Some(pool_config);
        }

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::unavailable(format!("failed to create Redis pool: {e}")))?;

        let store = Self::new(pool);
        store.check_connection().await?;
        Ok(store)
    }

    /// Acquire a pooled connection, opening one if the pool is empty.
    pub async fn check_connection(&self) -> Result<(), StoreError> {
        self.conn().await.map(|_| ())
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to get Redis connection");
            StoreError::unavailable(e.to_string())
        })
    }
}

fn command_error(op: &'static str, key: &str, e: redis::RedisError) -> StoreError {
    tracing::warn!(key = %key, error = %e, "Redis {op} error");
    StoreError::unavailable(e.to_string())
}

/// Escape glob metacharacters so `prefix` matches literally in `KEYS`.
pub(crate) fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| command_error("HGETALL", key, e))?;
        if fields.is_empty() {
            return Err(StoreError::not_found(key));
        }
        Ok(fields)
    }

    async fn set_hash_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(|e| command_error("HSET", key, e))
    }

    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.hincr::<_, _, _, i64>(key, field, delta)
            .await
            .map_err(|e| command_error("HINCRBY", key, e))
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<HashSet<String>, StoreError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| command_error("KEYS", &pattern, e))?;
        Ok(keys.into_iter().collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_connection().await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_glob_leaves_plain_prefix_alone() {
        assert_eq!(escape_glob("user:"), "user:");
    }

    #[test]
    fn escape_glob_escapes_metacharacters() {
        assert_eq!(escape_glob("a*b?c[d]e\\"), "a\\*b\\?c\\[d\\]e\\\\");
    }
}
