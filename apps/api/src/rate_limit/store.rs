//! Key-value backends for the rate-limit ledger.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal string key-value interface the ledger needs.
///
/// Carried by `RateLimiter` as `Arc<dyn LedgerStore>`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Process-local store. The ledger does not survive a restart.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Redis-backed store; the ledger survives restarts and is shared by every
/// process pointed at the same server.
///
/// One `ConnectionManager` is opened on first use and shared by every call.
/// A failed connect leaves the cell empty so the next call retries.
pub struct RedisLedgerStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisLedgerStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_connection_manager())
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}

#[cfg(test)]
pub use failing::{FailingLedgerStore, StalledLedgerStore};

#[cfg(test)]
mod failing {
    use super::*;

    /// Store whose every call fails, for fail-open tests.
    pub struct FailingLedgerStore;

    #[async_trait]
    impl LedgerStore for FailingLedgerStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("store offline".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("store offline".to_string()))
        }
    }

    /// Store that never answers, like a blackholed Redis host.
    pub struct StalledLedgerStore;

    #[async_trait]
    impl LedgerStore for StalledLedgerStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryLedgerStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "[1,2]").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("[1,2]"));

        store.set("k", "[]").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("[]"));
    }
}
