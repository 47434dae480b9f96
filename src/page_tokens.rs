//! Pagination state for a search API that hands out opaque next-page tokens.
//!
//! A token is stored under the page that produced it. Fetching page N
//! therefore needs the token stored while producing page N-1.
//!
//! Estimated totals are approximations that only ever grow as more pages
//! are fetched; callers must not present them as exact counts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GuardError, GuardResult};
use crate::keys;
use crate::store::{or_fallback, KeyValueStore};

/// Largest page the upstream search API returns.
pub const MAX_PAGE_SIZE: u32 = 20;
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_TOTAL_TTL: Duration = Duration::from_secs(3600);

/// Multiplier applied to the first page when more pages exist.
const FIRST_PAGE_ESTIMATE_FACTOR: u64 = 2;

#[derive(Clone)]
pub struct PageTokenCache {
    store: Arc<dyn KeyValueStore>,
    token_ttl: Duration,
    total_ttl: Duration,
}

impl PageTokenCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            token_ttl: DEFAULT_TOKEN_TTL,
            total_ttl: DEFAULT_TOTAL_TTL,
        }
    }

    pub fn with_ttls(mut self, token_ttl: Duration, total_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self.total_ttl = total_ttl;
        self
    }

    /// Token stored when producing `page` of `query`.
    pub async fn get_token(&self, query: &str, page: u32) -> Option<String> {
        let key = keys::page_token_key(&keys::normalize_query(query), page);
        or_fallback("get_page_token", self.store.get(&key), None).await
    }

    pub async fn set_token(&self, query: &str, page: u32, token: &str) {
        let key = keys::page_token_key(&keys::normalize_query(query), page);
        or_fallback(
            "set_page_token",
            self.store.set_ex(&key, token, self.token_ttl.as_secs()),
            (),
        )
        .await;
    }

    pub async fn get_total(&self, query: &str) -> Option<u64> {
        let key = keys::page_total_key(&keys::normalize_query(query));
        or_fallback("get_total", self.store.get(&key), None)
            .await
            .and_then(|raw| raw.parse().ok())
    }

    pub async fn set_total(&self, query: &str, total: u64) {
        let key = keys::page_total_key(&keys::normalize_query(query));
        or_fallback(
            "set_total",
            self.store
                .set_ex(&key, &total.to_string(), self.total_ttl.as_secs()),
            (),
        )
        .await;
    }

    /// Continuation token needed to fetch `page`.
    ///
    /// Page 1 needs none. Any later page without a cached token for the
    /// previous page fails rather than silently restarting.
    pub async fn resolve(&self, query: &str, page: u32) -> GuardResult<Option<String>> {
        if page <= 1 {
            return Ok(None);
        }

        match self.get_token(query, page - 1).await {
            Some(token) => Ok(Some(token)),
            None => {
                warn!(query, page, "page token not found");
                Err(GuardError::PageTokenNotFound {
                    query: query.to_string(),
                    page,
                })
            }
        }
    }

    /// Remember the outcome of fetching `page` and return the estimated total.
    pub async fn record_page(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        results: u32,
        next_token: Option<&str>,
    ) -> u64 {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        if let Some(token) = next_token {
            self.set_token(query, page, token).await;
        }

        if page == 1 {
            let total = if next_token.is_some() {
                u64::from(results) * FIRST_PAGE_ESTIMATE_FACTOR
            } else {
                u64::from(results)
            };
            self.set_total(query, total).await;
            debug!(query, total, exact = next_token.is_none(), "first page total recorded");
            return total;
        }

        let observed_min = u64::from(page - 1) * u64::from(page_size) + u64::from(results);
        match self.get_total(query).await {
            Some(cached) if cached >= observed_min => cached,
            _ => {
                self.set_total(query, observed_min).await;
                debug!(query, page, total = observed_min, "estimated total raised");
                observed_min
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> (PageTokenCache, MemoryStore) {
        let store = MemoryStore::new();
        (PageTokenCache::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_token_round_trip_and_missing_page() {
        let (cache, _) = cache();
        cache.set_token("pizza", 1, "tok-1").await;
        assert_eq!(cache.get_token("pizza", 1).await.as_deref(), Some("tok-1"));
        assert_eq!(cache.get_token("pizza", 2).await, None);
    }

    #[tokio::test]
    async fn test_queries_are_normalized() {
        let (cache, _) = cache();
        cache.set_token("  Commercial Kitchen ", 1, "tok").await;
        assert_eq!(
            cache.get_token("commercial   kitchen", 1).await.as_deref(),
            Some("tok")
        );
    }

    #[tokio::test]
    async fn test_resolve_requires_previous_page_token() {
        let (cache, _) = cache();
        assert_eq!(cache.resolve("bakery", 1).await.unwrap(), None);

        let err = cache.resolve("bakery", 2).await.unwrap_err();
        assert!(matches!(err, GuardError::PageTokenNotFound { page: 2, .. }));

        cache.set_token("bakery", 1, "next").await;
        assert_eq!(cache.resolve("bakery", 2).await.unwrap().as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_first_page_estimates() {
        let (cache, _) = cache();
        assert_eq!(cache.record_page("full", 1, 20, 20, Some("t")).await, 40);
        assert_eq!(cache.get_total("full").await, Some(40));
        assert_eq!(cache.get_token("full", 1).await.as_deref(), Some("t"));

        assert_eq!(cache.record_page("small", 1, 20, 5, None).await, 5);
        assert_eq!(cache.get_total("small").await, Some(5));
    }

    #[tokio::test]
    async fn test_total_only_grows() {
        let (cache, _) = cache();
        cache.set_total("tacos", 10).await;
        assert_eq!(cache.get_total("tacos").await, Some(10));

        // (2 - 1) * 20 + 15 = 35 exceeds the cached 10
        assert_eq!(cache.record_page("tacos", 2, 20, 15, None).await, 35);
        assert_eq!(cache.get_total("tacos").await, Some(35));

        cache.set_total("tacos", 100).await;
        assert_eq!(cache.record_page("tacos", 2, 20, 3, None).await, 100);
        assert_eq!(cache.get_total("tacos").await, Some(100));
    }

    #[tokio::test]
    async fn test_ttls_applied() {
        let (cache, store) = cache();
        cache.set_token("q", 1, "t").await;
        cache.set_total("q", 3).await;
        let token_ttl = store.ttl_ms(&keys::page_token_key("q", 1)).await.unwrap();
        let total_ttl = store.ttl_ms(&keys::page_total_key("q")).await.unwrap();
        assert!(token_ttl > 590_000 && token_ttl <= 600_000);
        assert!(total_ttl > 3_590_000 && total_ttl <= 3_600_000);
    }
}
