//! Fixed-window rate limiting per API category and client.
//!
//! Windows are aligned to wall-clock boundaries (`now / window`), so a
//! client can land up to `max_requests` at the end of one window and
//! another `max_requests` at the start of the next. That double burst is
//! accepted; the limiter does not slide.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::GuardResult;
use crate::keys::{self, GLOBAL_CLIENT};
use crate::policy::{RateLimitRule, RateLimitTable};
use crate::store::{or_fallback, KeyValueStore};

/// Remaining count reported when a request is allowed without counting.
pub const PERMISSIVE_REMAINING: u32 = 999;

const PERMISSIVE_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_time: i64,
    pub limit: u32,
}

impl RateLimitDecision {
    fn permissive(reset_time: i64) -> Self {
        Self {
            allowed: true,
            remaining: PERMISSIVE_REMAINING,
            reset_time,
            limit: PERMISSIVE_REMAINING,
        }
    }

    fn rejected(reset_time: i64, limit: u32) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time,
            limit,
        }
    }

    /// Whole seconds until the window resets, at least 1.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let wait_ms = (self.reset_time - now_ms).max(0) as u64;
        wait_ms.div_ceil(1000).max(1)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    rules: Arc<RateLimitTable>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        rules: RateLimitTable,
    ) -> Self {
        Self {
            store,
            clock,
            rules: Arc::new(rules),
        }
    }

    /// Count one request for `category` and decide whether it may proceed.
    ///
    /// Unknown categories and store failures both allow the request.
    pub async fn check_rate_limit(
        &self,
        category: &str,
        client_id: Option<&str>,
    ) -> RateLimitDecision {
        let client_id = client_id.unwrap_or(GLOBAL_CLIENT);
        let now = self.clock.now_ms();

        let Some(rule) = self.rules.get(category) else {
            warn!(category, "no rate limit configured for category, allowing request");
            return RateLimitDecision::permissive(now + PERMISSIVE_WINDOW_MS);
        };

        let window_ms = rule.window_ms();
        let window = now.div_euclid(window_ms);
        let reset_time = (window + 1) * window_ms;
        let key = keys::rate_window_key(category, client_id, window);

        let decision = or_fallback(
            "check_rate_limit",
            self.count_request(&key, rule, reset_time),
            RateLimitDecision::permissive(reset_time),
        )
        .await;

        if decision.allowed {
            debug!(category, client_id, remaining = decision.remaining, "request allowed");
        } else {
            info!(category, client_id, reset_time, "rate limit exceeded");
        }
        decision
    }

    async fn count_request(
        &self,
        key: &str,
        rule: &RateLimitRule,
        reset_time: i64,
    ) -> GuardResult<RateLimitDecision> {
        let current = crate::store::parse_count(self.store.get(key).await?);
        if current >= u64::from(rule.max_requests) {
            return Ok(RateLimitDecision::rejected(reset_time, rule.max_requests));
        }

        let count = self.store.incr(key).await?;
        self.store.expire(key, rule.ttl_secs()).await?;

        let used = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        Ok(RateLimitDecision {
            allowed: true,
            remaining: rule.max_requests.saturating_sub(used),
            reset_time,
            limit: rule.max_requests,
        })
    }

    pub fn rule(&self, category: &str) -> Option<&RateLimitRule> {
        self.rules.get(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn limiter(max_requests: u32, now_ms: i64) -> (RateLimiter, ManualClock, MemoryStore) {
        let clock = ManualClock::new(now_ms);
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        let mut rules = RateLimitTable { rules: Default::default() };
        rules.set("search", RateLimitRule::new(Duration::from_secs(60), max_requests));
        let limiter = RateLimiter::new(Arc::new(store.clone()), Arc::new(clock.clone()), rules);
        (limiter, clock, store)
    }

    #[tokio::test]
    async fn test_remaining_decreases_until_rejected() {
        let (limiter, _, _) = limiter(3, 120_000);
        let mut previous = u32::MAX;
        for _ in 0..3 {
            let decision = limiter.check_rate_limit("search", None).await;
            assert!(decision.allowed);
            assert!(decision.remaining < previous);
            previous = decision.remaining;
        }
        assert_eq!(previous, 0);

        let rejected = limiter.check_rate_limit("search", None).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.limit, 3);
    }

    #[tokio::test]
    async fn test_two_per_minute_scenario() {
        // 10s into a minute
        let (limiter, _, _) = limiter(2, 1_710_081_010_000);

        let first = limiter.check_rate_limit("search", None).await;
        let second = limiter.check_rate_limit("search", None).await;
        let third = limiter.check_rate_limit("search", None).await;

        assert!(first.allowed && second.allowed);
        assert_eq!((first.remaining, second.remaining), (1, 0));
        assert!(!third.allowed);
        assert_eq!(third.reset_time, 1_710_081_060_000);
    }

    #[tokio::test]
    async fn test_next_window_resets_count() {
        let (limiter, clock, _) = limiter(2, 0);
        limiter.check_rate_limit("search", None).await;
        limiter.check_rate_limit("search", None).await;
        let blocked = limiter.check_rate_limit("search", None).await;
        assert!(!blocked.allowed);

        clock.set(blocked.reset_time);
        let decision = limiter.check_rate_limit("search", None).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let (limiter, _, _) = limiter(1, 0);
        assert!(limiter.check_rate_limit("search", Some("alice")).await.allowed);
        assert!(!limiter.check_rate_limit("search", Some("alice")).await.allowed);
        assert!(limiter.check_rate_limit("search", Some("bob")).await.allowed);
        assert!(limiter.check_rate_limit("search", None).await.allowed);
    }

    #[tokio::test]
    async fn test_unknown_category_is_permissive() {
        let (limiter, _, store) = limiter(1, 0);
        let decision = limiter.check_rate_limit("autocomplete", None).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, PERMISSIVE_REMAINING);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_counter_expires_with_window() {
        let (limiter, _, store) = limiter(5, 0);
        limiter.check_rate_limit("search", None).await;
        let key = keys::rate_window_key("search", GLOBAL_CLIENT, 0);
        assert_eq!(store.ttl_ms(&key).await, Some(60_000));
    }

    #[test]
    fn test_retry_after() {
        let decision = RateLimitDecision::rejected(60_000, 2);
        assert_eq!(decision.retry_after_secs(10_500), 50);
        assert_eq!(decision.retry_after_secs(60_000), 1);
    }
}
