//! Best-effort key-value store used by every guard component.
//!
//! The store is never a source of truth: callers wrap each operation in
//! [`or_fallback`] so an unreachable store degrades to a safe default
//! instead of failing the request that triggered it.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::error::GuardResult;
use async_trait::async_trait;
use std::future::Future;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> GuardResult<Option<String>>;

    /// Replace the value and reset the TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> GuardResult<()>;

    /// Add `delta` to an integer value, creating it at 0 first. Keeps any existing TTL.
    async fn incr_by(&self, key: &str, delta: i64) -> GuardResult<i64>;

    async fn incr(&self, key: &str) -> GuardResult<i64> {
        self.incr_by(key, 1).await
    }

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> GuardResult<bool>;

    async fn exists(&self, key: &str) -> GuardResult<bool>;

    /// Returns true if a key was removed.
    async fn delete(&self, key: &str) -> GuardResult<bool>;

    async fn ping(&self) -> GuardResult<()>;
}

/// Run a store operation, logging and substituting `fallback` on failure.
pub async fn or_fallback<T, F>(operation: &str, fut: F, fallback: T) -> T
where
    F: Future<Output = GuardResult<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(operation, error = %e, "store operation failed, using fallback");
            fallback
        }
    }
}

/// Parse a stored counter, treating missing or malformed values as zero.
pub(crate) fn parse_count(value: Option<String>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .unwrap_or(0)
}
