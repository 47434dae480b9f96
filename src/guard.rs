use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dedup::{RequestDeduplicator, SweeperHandle};
use crate::error::{GuardError, GuardResult};
use crate::keys;
use crate::page_tokens::PageTokenCache;
use crate::policy::Policy;
use crate::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::store::{KeyValueStore, MemoryStore, RedisStore};
use crate::usage::{UsageEvent, UsageTracker};

/// Outcome of asking whether an external call may go ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// The call is marked in flight; finish it with [`PlacesGuard::complete`].
    Admitted {
        request_key: String,
        rate: RateLimitDecision,
    },
    Duplicate {
        request_key: String,
    },
    RateLimited {
        category: String,
        rate: RateLimitDecision,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    /// Request key of an admitted call, or the rejection as an error.
    pub fn into_result(self) -> GuardResult<String> {
        match self {
            Admission::Admitted { request_key, .. } => Ok(request_key),
            Admission::Duplicate { request_key } => {
                Err(GuardError::DuplicateInFlight { request_key })
            }
            Admission::RateLimited { category, rate } => Err(GuardError::RateLimitExceeded {
                category,
                reset_time: rate.reset_time,
            }),
        }
    }
}

/// Protection layer for calls to external place APIs.
///
/// Every component shares one store and one clock.
pub struct PlacesGuard {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    dedup: RequestDeduplicator,
    usage: UsageTracker,
    pages: PageTokenCache,
}

impl std::fmt::Debug for PlacesGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesGuard").finish_non_exhaustive()
    }
}

impl PlacesGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, policy: Policy) -> Self {
        let policy = Arc::new(policy);
        Self {
            limiter: RateLimiter::new(store.clone(), clock.clone(), policy.rate_limits.clone()),
            dedup: RequestDeduplicator::new(store.clone(), clock.clone()),
            usage: UsageTracker::new(store.clone(), clock.clone(), policy),
            pages: PageTokenCache::new(store.clone()),
            store,
            clock,
        }
    }

    /// Build from process configuration, connecting to the configured store.
    pub async fn from_config(config: &Config) -> GuardResult<Self> {
        config.validate()?;
        let policy = config.load_policy()?;

        let store: Arc<dyn KeyValueStore> = if config.uses_memory_store() {
            info!("no store URL configured, keeping guard state in memory");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(RedisStore::connect(&config.store_url, config.store_token.as_deref()).await?)
        };

        let mut guard = Self::new(store, Arc::new(SystemClock), policy);
        guard.dedup = guard
            .dedup
            .with_marker_ttl(Duration::from_secs(config.ongoing_marker_ttl_secs))
            .with_stale_age(config.stale_request_max_age());
        guard.pages = guard.pages.with_ttls(
            Duration::from_secs(config.page_token_ttl_secs),
            Duration::from_secs(config.total_ttl_secs),
        );
        Ok(guard)
    }

    /// Claim the call as in flight, then apply the rate limit.
    ///
    /// A rate-limited call gives its claim back before returning.
    pub async fn admit(
        &self,
        category: &str,
        params: &Value,
        client_id: Option<&str>,
    ) -> Admission {
        let request_key = keys::ongoing_request_key(category, params);
        if !self.dedup.try_mark_ongoing(&request_key).await {
            debug!(category, request_key = %request_key, "duplicate request in flight");
            return Admission::Duplicate { request_key };
        }

        let rate = self.limiter.check_rate_limit(category, client_id).await;
        if !rate.allowed {
            self.dedup.mark_completed(&request_key).await;
            self.usage
                .track_rate_limit_violation(category, client_id)
                .await;
            return Admission::RateLimited {
                category: category.to_string(),
                rate,
            };
        }

        Admission::Admitted { request_key, rate }
    }

    /// Release an admitted call and record its usage.
    pub async fn complete(&self, request_key: &str, category: &str, event: UsageEvent) {
        self.dedup.mark_completed(request_key).await;
        self.usage.track_usage(category, event).await;
    }

    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        self.dedup.spawn_sweeper(every)
    }

    pub async fn store_available(&self) -> bool {
        self.store.ping().await.is_ok()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn dedup(&self) -> &RequestDeduplicator {
        &self.dedup
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn pages(&self) -> &PageTokenCache {
        &self.pages
    }

    pub fn policy(&self) -> &Policy {
        self.usage.policy()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
