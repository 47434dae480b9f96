use super::KeyValueStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{GuardError, GuardResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Writes between passes that drop expired entries.
const PURGE_EVERY: u64 = 128;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// In-process store with Redis-like expiry semantics.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// Remaining TTL in milliseconds, `None` if missing or persistent.
    pub async fn ttl_ms(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_ms();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at_ms)
            .map(|at| at - now)
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now_ms();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, now)
    }

    fn purge(entries: &mut HashMap<String, Entry>, now_ms: i64) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now_ms));
        before - entries.len()
    }

    /// Count a write and purge on every `PURGE_EVERY`th one.
    fn record_write(&self, entries: &mut HashMap<String, Entry>, now_ms: i64) {
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % PURGE_EVERY == 0 {
            Self::purge(entries, now_ms);
        }
    }

    fn expiry(&self, ttl_secs: u64) -> i64 {
        self.clock.now_ms() + (ttl_secs as i64) * 1000
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> GuardResult<Option<String>> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> GuardResult<()> {
        let now = self.clock.now_ms();
        let expires_at_ms = Some(self.expiry(ttl_secs));
        let mut entries = self.entries.lock().await;
        self.record_write(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> GuardResult<i64> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        self.record_write(&mut entries, now);

        let (current, expires_at_ms) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    GuardError::Store(format!("value at '{}' is not an integer", key))
                })?;
                (current, entry.expires_at_ms)
            }
            _ => (0, None),
        };

        let next = current + delta;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> GuardResult<bool> {
        let now = self.clock.now_ms();
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at_ms = Some(expires_at);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> GuardResult<bool> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> GuardResult<bool> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn ping(&self) -> GuardResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(now_ms: i64) -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(now_ms);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_ex_expires() {
        let (store, clock) = store_at(0);
        store.set_ex("token", "abc", 10).await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("abc"));

        clock.advance_ms(10_000);
        assert_eq!(store.get("token").await.unwrap(), None);
        assert!(!store.exists("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_preserves_ttl() {
        let (store, clock) = store_at(0);
        assert_eq!(store.incr("count").await.unwrap(), 1);
        assert!(store.expire("count", 60).await.unwrap());

        clock.advance_ms(30_000);
        assert_eq!(store.incr_by("count", 4).await.unwrap(), 5);
        assert_eq!(store.ttl_ms("count").await, Some(30_000));

        clock.advance_ms(30_000);
        assert_eq!(store.incr("count").await.unwrap(), 1);
        assert_eq!(store.ttl_ms("count").await, None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let (store, _) = store_at(0);
        store.set_ex("text", "hello", 60).await.unwrap();
        assert!(store.incr("text").await.is_err());
    }

    #[tokio::test]
    async fn test_expire_and_delete_missing_key() {
        let (store, _) = store_at(0);
        assert!(!store.expire("missing", 10).await.unwrap());
        assert!(!store.delete("missing").await.unwrap());
        store.set_ex("present", "1", 10).await.unwrap();
        assert!(store.delete("present").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_abandoned_window_keys_are_reclaimed() {
        let (store, clock) = store_at(0);
        for window in 0..1000 {
            let key = format!("rate_limit:search:global:{}", window);
            store.incr(&key).await.unwrap();
            store.expire(&key, 60).await.unwrap();
            clock.advance_ms(60_000);
        }

        assert_eq!(store.len().await, 0);
        let raw = store.entries.lock().await.len();
        assert!(raw <= PURGE_EVERY as usize, "{} entries retained", raw);

        assert_eq!(store.purge_expired().await, raw);
        assert!(store.entries.lock().await.is_empty());
    }
}
