//! KV cache boundary (§6 "KV cache").
//!
//! A narrow trait over the handful of Redis operations this core actually
//! needs (`SETEX`/`GET`/`EXISTS`/`DEL`/`MGET`/`INCR`/`EXPIRE`); the list
//! operations named in §6 for the sibling log-buffer/WS-token subsystems
//! are out of this core's scope and are not exposed here (see
//! SPEC_FULL.md §6).

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{Error, Result};

/// Backend-agnostic KV store used by C3 (dedup cache), C11 (cancellation)
/// and the rate limiter.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;
    /// Atomically increments `key`, returning the post-increment value. If
    /// the key did not exist, it is created with TTL `ttl_on_create`.
    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64>;
}

/// Redis-backed [`KvStore`].
#[derive(Clone)]
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| Error::Kv(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Kv(format!("failed to connect to redis: {e}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(|e| Error::Kv(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|e| Error::Kv(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        conn.exists(key).await.map_err(|e| Error::Kv(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::Kv(e.to_string()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        conn.mget(keys).await.map_err(|e| Error::Kv(e.to_string()))
    }

    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64> {
        let mut conn = self.manager.clone();
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .ignore()
            .get(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Kv(e.to_string()))?;
        if value == 1 {
            let _: () = conn
                .expire(key, ttl_on_create.as_secs().max(1) as i64)
                .await
                .map_err(|e| Error::Kv(e.to_string()))?;
        }
        Ok(value)
    }
}

/// In-memory [`KvStore`] used in unit tests for C3/C11/the rate limiter
/// without a live Redis instance.
#[cfg(any(test, feature = "unsafe-dev"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    pub struct FakeKvStore {
        entries: Mutex<HashMap<String, (String, Instant)>>,
    }

    impl FakeKvStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn is_live(value: &(String, Instant)) -> bool {
            Instant::now() < value.1
        }
    }

    #[async_trait]
    impl KvStore for FakeKvStore {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|v| Self::is_live(v))
                .map(|(v, _)| v.clone()))
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.get(key).await?.is_some())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(key);
            Ok(())
        }

        async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            let mut out = Vec::with_capacity(keys.len());
            for k in keys {
                out.push(self.get(k).await?);
            }
            Ok(out)
        }

        async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64> {
            let mut entries = self.entries.lock().unwrap();
            let now_live = entries.get(key).map(Self::is_live).unwrap_or(false);
            if !now_live {
                entries.insert(key.to_string(), ("1".to_string(), Instant::now() + ttl_on_create));
                return Ok(1);
            }
            let (v, expiry) = entries.get(key).unwrap().clone();
            let next = v.parse::<i64>().unwrap_or(0) + 1;
            entries.insert(key.to_string(), (next.to_string(), expiry));
            Ok(next)
        }
    }
}
