//! Window membership set, shared by every request and the aggregator.
//!
//! The only exclusivity boundary is the store itself: `add_member` must map to a
//! single atomic store primitive, while a snapshot is two separate commands
//! (read the cardinality, then clear). An id added between those two commands
//! misses the count being reported and is then erased, so it never shows up in
//! the next window either. Rotations may therefore under-count by the ids that
//! land in that gap.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::time::timeout;
use tracing::error;

use crate::prometheus::MARKS_TOTAL;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("timed out waiting for the dedup store")]
    Timeout,
    #[error("dedup store error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("dedup store unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio::time::error::Elapsed> for StoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StoreError::Timeout
    }
}

/// Result of testing and marking an id in the open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    First,
    Duplicate,
    Unavailable,
}

impl MarkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkOutcome::First => "new",
            MarkOutcome::Duplicate => "duplicate",
            MarkOutcome::Unavailable => "unavailable",
        }
    }
}

#[async_trait]
pub trait DedupStore {
    /// Add `id` to the open window, returning whether it was absent before.
    async fn add_member(&self, id: &str) -> Result<bool, StoreError>;
    async fn cardinality(&self) -> Result<u64, StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;

    async fn try_mark(&self, id: &str) -> MarkOutcome {
        let outcome = match self.add_member(id).await {
            Ok(true) => MarkOutcome::First,
            Ok(false) => MarkOutcome::Duplicate,
            Err(err) => {
                error!("failed to add id to dedup store: {}", err);
                MarkOutcome::Unavailable
            }
        };
        counter!(MARKS_TOTAL, "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    /// Read the open window's cardinality, then empty it for the next window.
    /// Nothing is cleared when the read fails, and no count is returned when the
    /// clear fails.
    async fn snapshot_and_clear(&self) -> Result<u64, StoreError> {
        let count = self.cardinality().await?;
        self.clear().await?;
        Ok(count)
    }
}

pub struct RedisStore {
    client: redis::Client,
    key: String,
    timeout: Duration,
}

impl RedisStore {
    pub fn new(addr: String, key: String, timeout: Duration) -> Result<RedisStore, StoreError> {
        let client = redis::Client::open(addr)?;

        Ok(RedisStore {
            client,
            key,
            timeout,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection()).await??;
        Ok(conn)
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn add_member(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;

        // SADD replies with the number of members actually added
        let added: i64 = timeout(self.timeout, conn.sadd(&self.key, id)).await??;
        Ok(added == 1)
    }

    async fn cardinality(&self) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;

        let count: u64 = timeout(self.timeout, conn.scard(&self.key)).await??;
        Ok(count)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;

        let _removed: i64 = timeout(self.timeout, conn.del(&self.key)).await??;
        Ok(())
    }
}

/// In-process store for tests and local runs, with switches to inject failures.
#[derive(Default)]
pub struct MemoryStore {
    members: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    clear_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Make every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `clear` fail, leaving reads and writes working.
    pub fn set_clear_unavailable(&self, unavailable: bool) {
        self.clear_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members
            .lock()
            .expect("poisoned memory store")
            .contains(id)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn add_member(&self, id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .members
            .lock()
            .expect("poisoned memory store")
            .insert(id.to_owned()))
    }

    async fn cardinality(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        let len = self.members.lock().expect("poisoned memory store").len();
        Ok(len as u64)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if self.clear_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("clear switched off".to_string()));
        }
        self.members.lock().expect("poisoned memory store").clear();
        Ok(())
    }
}
