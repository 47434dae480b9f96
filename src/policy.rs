//! Policy tables: rate limits, pricing and recommendation thresholds.
//!
//! These are data rather than logic. Defaults describe the Places API
//! categories the site calls; a JSON file can replace any of them.

use crate::error::GuardResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

pub const SEARCH: &str = "search";
pub const DETAILS: &str = "details";
pub const PHOTOS: &str = "photos";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Policy {
    pub rate_limits: RateLimitTable,
    pub pricing: PricingTable,
    pub recommendations: RecommendationPolicy,
}

/// Fixed-window limit for one API category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RateLimitRule {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    #[validate(range(min = 1))]
    pub max_requests: u32,
}

impl RateLimitRule {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    pub fn window_ms(&self) -> i64 {
        (self.window.as_millis() as i64).max(1)
    }

    /// Counter lifetime: the window rounded up to whole seconds.
    pub fn ttl_secs(&self) -> u64 {
        (self.window_ms() as u64).div_ceil(1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitTable {
    pub rules: BTreeMap<String, RateLimitRule>,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        let rules = BTreeMap::from([
            (SEARCH.to_string(), RateLimitRule::new(minute, 30)),
            (DETAILS.to_string(), RateLimitRule::new(minute, 60)),
            (PHOTOS.to_string(), RateLimitRule::new(minute, 100)),
        ]);
        Self { rules }
    }
}

impl RateLimitTable {
    pub fn get(&self, category: &str) -> Option<&RateLimitRule> {
        self.rules.get(category)
    }

    pub fn set(&mut self, category: impl Into<String>, rule: RateLimitRule) {
        self.rules.insert(category.into(), rule);
    }
}

/// Approximate price of one upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PriceEntry {
    #[validate(range(min = 0.0))]
    pub base_price: f64,
    #[validate(range(min = 0.0))]
    pub per_field_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    pub prices: BTreeMap<String, PriceEntry>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let prices = BTreeMap::from([
            (
                SEARCH.to_string(),
                PriceEntry {
                    base_price: 0.032,
                    per_field_price: 0.002,
                },
            ),
            (
                DETAILS.to_string(),
                PriceEntry {
                    base_price: 0.017,
                    per_field_price: 0.003,
                },
            ),
            (
                PHOTOS.to_string(),
                PriceEntry {
                    base_price: 0.007,
                    per_field_price: 0.0,
                },
            ),
        ]);
        Self { prices }
    }
}

impl PricingTable {
    pub fn get(&self, category: &str) -> Option<&PriceEntry> {
        self.prices.get(category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CategoryThresholds {
    /// Percent; a lower hit rate triggers a caching recommendation.
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_cache_hit_rate: f64,
    pub cache_priority: Priority,
    #[validate(range(min = 0.0))]
    pub max_fields_per_request: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationPolicy {
    pub categories: BTreeMap<String, CategoryThresholds>,
    pub usage_warning_threshold: u64,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        let categories = BTreeMap::from([
            (
                SEARCH.to_string(),
                CategoryThresholds {
                    min_cache_hit_rate: 30.0,
                    cache_priority: Priority::High,
                    max_fields_per_request: 10.0,
                },
            ),
            (
                DETAILS.to_string(),
                CategoryThresholds {
                    min_cache_hit_rate: 50.0,
                    cache_priority: Priority::Medium,
                    max_fields_per_request: 15.0,
                },
            ),
        ]);
        Self {
            categories,
            usage_warning_threshold: 1000,
        }
    }
}

impl Policy {
    /// Load from a JSON file, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> GuardResult<Self> {
        let policy = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let policy: Policy = serde_json::from_str(&raw)?;
                tracing::info!(path = %path.display(), "loaded policy file");
                policy
            }
            None => Policy::default(),
        };
        crate::config_validator::ConfigValidator::validate_policy(&policy)?;
        Ok(policy)
    }

    pub fn rate_limit(&self, category: &str) -> Option<&RateLimitRule> {
        self.rate_limits.get(category)
    }

    /// Every category the policy mentions, in sorted order.
    pub fn known_categories(&self) -> BTreeSet<String> {
        self.rate_limits
            .rules
            .keys()
            .chain(self.pricing.prices.keys())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_categories() {
        let policy = Policy::default();
        let categories: Vec<_> = policy.known_categories().into_iter().collect();
        assert_eq!(categories, vec!["details", "photos", "search"]);
        assert_eq!(policy.rate_limit(SEARCH).map(|r| r.max_requests), Some(30));
        assert!(policy.rate_limit("autocomplete").is_none());
    }

    #[test]
    fn test_rule_ttl_rounds_up() {
        assert_eq!(RateLimitRule::new(Duration::from_millis(1500), 5).ttl_secs(), 2);
        assert_eq!(RateLimitRule::new(Duration::from_secs(60), 5).ttl_secs(), 60);
    }

    #[test]
    fn test_policy_from_json_overrides() {
        let raw = r#"{
            "rate_limits": { "search": { "window": "30s", "max_requests": 5 } },
            "recommendations": { "categories": {}, "usage_warning_threshold": 50 }
        }"#;
        let policy: Policy = serde_json::from_str(raw).unwrap();
        let rule = policy.rate_limit("search").unwrap();
        assert_eq!(rule.window, Duration::from_secs(30));
        assert_eq!(rule.max_requests, 5);
        assert!(policy.rate_limit("details").is_none());
        assert_eq!(policy.pricing.get("details").map(|p| p.base_price), Some(0.017));
        assert_eq!(policy.recommendations.usage_warning_threshold, 50);
    }
}
