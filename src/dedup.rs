//! In-flight request tracking.
//!
//! The process-local map answers first and is authoritative for this
//! process. The store marker lets other processes see the same call;
//! it carries a short TTL so a crashed process cannot block a key for long.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::keys;
use crate::store::{or_fallback, KeyValueStore};

pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_STALE_AGE: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OngoingCheck {
    pub is_ongoing: bool,
    pub request_key: String,
}

#[derive(Clone)]
pub struct RequestDeduplicator {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    local: Arc<RwLock<HashMap<String, i64>>>,
    marker_ttl: Duration,
    stale_age: Duration,
}

impl RequestDeduplicator {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            local: Arc::new(RwLock::new(HashMap::new())),
            marker_ttl: DEFAULT_MARKER_TTL,
            stale_age: DEFAULT_STALE_AGE,
        }
    }

    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.marker_ttl = ttl;
        self
    }

    pub fn with_stale_age(mut self, age: Duration) -> Self {
        self.stale_age = age;
        self
    }

    pub async fn check_ongoing(&self, category: &str, params: &Value) -> OngoingCheck {
        let request_key = keys::ongoing_request_key(category, params);

        if self.local.read().await.contains_key(&request_key) {
            return OngoingCheck {
                is_ongoing: true,
                request_key,
            };
        }

        let is_ongoing =
            or_fallback("check_ongoing", self.store.exists(&request_key), false).await;
        if is_ongoing {
            debug!(category, request_key = %request_key, "request in flight in another process");
        }

        OngoingCheck {
            is_ongoing,
            request_key,
        }
    }

    pub async fn mark_ongoing(&self, request_key: &str) {
        let now = self.clock.now_ms();
        self.local.write().await.insert(request_key.to_string(), now);
        self.write_marker(request_key, now).await;
    }

    /// Claim `request_key` for the caller. Returns false when the call is
    /// already in flight, here or in another process.
    ///
    /// The local check and insert happen under one write guard, so of two
    /// overlapping callers exactly one wins.
    pub async fn try_mark_ongoing(&self, request_key: &str) -> bool {
        let now = self.clock.now_ms();
        match self.local.write().await.entry(request_key.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }

        if or_fallback("check_ongoing", self.store.exists(request_key), false).await {
            self.local.write().await.remove(request_key);
            debug!(request_key = %request_key, "request in flight in another process");
            return false;
        }

        self.write_marker(request_key, now).await;
        true
    }

    async fn write_marker(&self, request_key: &str, started_at: i64) {
        or_fallback(
            "mark_ongoing",
            self.store.set_ex(
                request_key,
                &started_at.to_string(),
                self.marker_ttl.as_secs().max(1),
            ),
            (),
        )
        .await;
    }

    /// Idempotent; completing an unknown key is not an error.
    pub async fn mark_completed(&self, request_key: &str) {
        self.local.write().await.remove(request_key);

        or_fallback(
            "mark_completed",
            async { self.store.delete(request_key).await.map(|_| ()) },
            (),
        )
        .await;
    }

    /// Evict local entries older than the stale age. Returns how many were removed.
    pub async fn cleanup_stale(&self) -> usize {
        let now = self.clock.now_ms();
        let max_age_ms = self.stale_age.as_millis() as i64;

        let mut local = self.local.write().await;
        let before = local.len();
        local.retain(|_, started_at| now - *started_at <= max_age_ms);
        let removed = before - local.len();

        if removed > 0 {
            warn!(removed, "evicted stale in-flight request markers");
        }
        removed
    }

    pub async fn in_flight(&self) -> usize {
        self.local.read().await.len()
    }

    /// Run [`cleanup_stale`](Self::cleanup_stale) every `every` until the handle is shut down.
    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        if every < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = every.as_millis() as u64,
                "sweep interval too short, using 1s"
            );
        }
        let every = every.max(MIN_SWEEP_INTERVAL);
        let dedup = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        dedup.cleanup_stale().await;
                    }
                    _ = &mut shutdown_rx => {
                        debug!("in-flight sweeper stopping");
                        break;
                    }
                }
            }
        });

        info!(interval_secs = every.as_secs(), "in-flight sweeper started");
        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of the background sweep task. Dropping it aborts the task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                warn!(error = %e, "in-flight sweeper ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
