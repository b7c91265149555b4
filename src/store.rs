use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::AccountError;

/// Backend trait for pluggable expiring key-value stores.
///
/// Tokens, sessions, and the recovery throttle all live behind this
/// interface. Connectivity failures must surface as
/// [`AccountError::StoreUnavailable`], never as a missing key.
#[async_trait::async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Get a raw value.
    async fn get(&self, key: &str) -> Result<Option<String>, AccountError>;

    /// Set a raw value with optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AccountError>;

    /// Set a value only if the key holds no live entry. Returns `true`
    /// when the write won. This is the atomic claim used to keep token
    /// issuance linearizable per key.
    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError>;

    /// Delete a key. Returns `true` if a live entry was removed.
    async fn del(&self, key: &str) -> Result<bool, AccountError>;

    /// Delete a key only if it still holds exactly `expected`. Returns
    /// `true` when an entry was removed. Lets a caller clear a record it
    /// observed without clobbering a concurrent writer's replacement.
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, AccountError>;

    /// Check if a key holds a live entry.
    async fn exists(&self, key: &str) -> Result<bool, AccountError>;

    /// Flush all keys (use with caution).
    async fn flush(&self) -> Result<(), AccountError>;
}

/// The store service handed to the lifecycle, session, and throttle layers.
///
/// Wraps a backend and adds JSON helpers so callers persist typed records
/// without repeating the serialization plumbing.
#[derive(Clone)]
pub struct StoreService {
    backend: Arc<dyn ExpiringStore>,
}

impl StoreService {
    /// Create a store service with the given backend.
    pub fn new(backend: impl ExpiringStore + 'static) -> Self {
        StoreService {
            backend: Arc::new(backend),
        }
    }

    /// Create an in-memory store (good for development and testing).
    pub fn in_memory() -> Self {
        StoreService::new(InMemoryStore::new())
    }

    /// Get a JSON-deserialized value.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AccountError> {
        match self.backend.get(key).await? {
            Some(raw) => {
                let value: T = serde_json::from_str(&raw).map_err(|e| {
                    AccountError::StoreUnavailable(format!("store deserialize error: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a JSON-serialized value.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), AccountError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AccountError::StoreUnavailable(format!("store serialize error: {}", e)))?;
        self.backend.set(key, &raw, ttl).await
    }

    /// Set a JSON-serialized value only if the key is free. Returns `true`
    /// when the write won.
    pub async fn set_nx_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AccountError::StoreUnavailable(format!("store serialize error: {}", e)))?;
        self.backend.set_nx(key, &raw, ttl).await
    }

    /// Get a raw string.
    pub async fn get(&self, key: &str) -> Result<Option<String>, AccountError> {
        self.backend.get(key).await
    }

    /// Set a raw string.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AccountError> {
        self.backend.set(key, value, ttl).await
    }

    /// Set a raw string only if the key is free.
    pub async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError> {
        self.backend.set_nx(key, value, ttl).await
    }

    /// Delete a key.
    pub async fn del(&self, key: &str) -> Result<bool, AccountError> {
        self.backend.del(key).await
    }

    /// Delete a key only if it still holds exactly `expected`.
    pub async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, AccountError> {
        self.backend.del_if_eq(key, expected).await
    }

    /// Check if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool, AccountError> {
        self.backend.exists(key).await
    }

    /// Flush the entire store.
    pub async fn flush(&self) -> Result<(), AccountError> {
        self.backend.flush().await
    }
}

// ── In-Memory Store Backend ──

/// Simple in-memory store using a HashMap. Good for development, testing,
/// and single-process hosts. For production, use `RedisStore`.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<std::collections::HashMap<String, StoreEntry>>>,
}

#[derive(Clone)]
struct StoreEntry {
    value: String,
    expires_at: Option<std::time::Instant>,
}

impl StoreEntry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => std::time::Instant::now() <= expires_at,
            None => true,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            entries: Arc::new(RwLock::new(std::collections::HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExpiringStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AccountError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => {
                if !entry.is_live() {
                    drop(entries);
                    let mut entries = self.entries.write().await;
                    // A fresh entry may have landed between the locks;
                    // only an entry that is still dead gets cleaned up.
                    if entries.get(key).is_some_and(|e| !e.is_live()) {
                        entries.remove(key);
                    }
                    return Ok(None);
                }
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AccountError> {
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        self.entries.write().await.insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError> {
        let mut entries = self.entries.write().await;
        // Expired entries do not block the claim.
        if let Some(existing) = entries.get(key) {
            if existing.is_live() {
                return Ok(false);
            }
        }
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        entries.insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool, AccountError> {
        match self.entries.write().await.remove(key) {
            Some(entry) => Ok(entry.is_live()),
            None => Ok(false),
        }
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, AccountError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_live() && entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AccountError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => Ok(entry.is_live()),
            None => Ok(false),
        }
    }

    async fn flush(&self) -> Result<(), AccountError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

// ── Redis Store Backend ──

/// Redis-backed store for production use.
///
/// Requires a Redis connection URL (e.g., `redis://127.0.0.1:6379`).
///
/// ```rust,ignore
/// let store = StoreService::new(RedisStore::new("redis://127.0.0.1:6379").await?);
/// ```
#[cfg(feature = "redis")]
pub struct RedisStore {
    #[allow(dead_code)]
    client: redis::Client,
    conn: Arc<RwLock<redis::aio::MultiplexedConnection>>,
}

#[cfg(feature = "redis")]
impl RedisStore {
    /// Create a new Redis store from a connection URL.
    pub async fn new(url: &str) -> Result<Self, AccountError> {
        let client = redis::Client::open(url)
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis connection error: {}", e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis connection error: {}", e)))?;
        Ok(RedisStore {
            client,
            conn: Arc::new(RwLock::new(conn)),
        })
    }
}

#[cfg(feature = "redis")]
#[async_trait::async_trait]
impl ExpiringStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AccountError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        let result: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis GET error: {}", e)))?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AccountError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        if let Some(ttl) = ttl {
            let _: () = conn
                .set_ex(key, value, ttl.as_secs())
                .await
                .map_err(|e| AccountError::StoreUnavailable(format!("Redis SETEX error: {}", e)))?;
        } else {
            let _: () = conn
                .set(key, value)
                .await
                .map_err(|e| AccountError::StoreUnavailable(format!("Redis SET error: {}", e)))?;
        }
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError> {
        let mut conn = self.conn.write().await;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        // SET ... NX replies OK when the write won, nil otherwise.
        let reply: Option<String> = cmd
            .query_async(&mut *conn)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis SET NX error: {}", e)))?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool, AccountError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        let count: i64 = conn
            .del(key)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis DEL error: {}", e)))?;
        Ok(count > 0)
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, AccountError> {
        let mut conn = self.conn.write().await;
        // GET-compare-DEL must be one atomic step on the server.
        let script = redis::Script::new(
            r"if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end",
        );
        let removed: i64 = script
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis EVAL error: {}", e)))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, AccountError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis EXISTS error: {}", e)))?;
        Ok(exists)
    }

    async fn flush(&self) -> Result<(), AccountError> {
        let mut conn = self.conn.write().await;
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut *conn)
            .await
            .map_err(|e| AccountError::StoreUnavailable(format!("Redis FLUSHDB error: {}", e)))?;
        Ok(())
    }
}
