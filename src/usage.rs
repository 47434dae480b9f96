//! Usage counters and reports for external API categories.
//!
//! The tracker only records and aggregates; it never gates a request.
//! Daily counters live for 7 days and hourly counters for 2 days, with
//! the TTL refreshed on every write.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::error::GuardResult;
use crate::keys::{self, GLOBAL_CLIENT};
use crate::policy::{Policy, PricingTable};
use crate::store::{or_fallback, parse_count, KeyValueStore};

pub const DAILY_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
pub const HOURLY_RETENTION_SECS: u64 = 2 * 24 * 60 * 60;
pub const REPORT_PERIOD_DAYS: u32 = 7;

/// What a single upstream call looked like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageEvent {
    pub fields_count: Option<u64>,
    /// `None` when the call did not go through a cache.
    pub cache_hit: Option<bool>,
}

impl UsageEvent {
    pub fn cache_hit() -> Self {
        Self {
            cache_hit: Some(true),
            ..Self::default()
        }
    }

    pub fn cache_miss() -> Self {
        Self {
            cache_hit: Some(false),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields_count: u64) -> Self {
        self.fields_count = Some(fields_count);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub requests: u64,
    pub fields_used: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyUsage {
    pub hour: u32,
    pub requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub category: String,
    pub period_days: u32,
    pub total_requests: u64,
    pub fields_used: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percent, one decimal place; 0 when no cache outcomes were recorded.
    pub cache_hit_rate: f64,
    pub average_fields_per_request: f64,
    pub rate_limit_violations: u64,
    /// Most recent day first.
    pub daily: Vec<DailyUsage>,
    /// Today only, hours 0-23 UTC.
    pub hourly: Vec<HourlyUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCost {
    pub requests: u64,
    pub fields_used: u64,
    pub base_cost: f64,
    pub field_cost: f64,
    pub total_cost: f64,
    pub cache_hit_rate: f64,
    pub estimated_savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub categories: BTreeMap<String, CategoryCost>,
    pub total_cost: f64,
    pub total_savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_requests: u64,
    pub total_estimated_cost: f64,
    pub average_cache_hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringReport {
    pub generated_at: DateTime<Utc>,
    pub period_days: u32,
    pub categories: BTreeMap<String, UsageStats>,
    pub costs: CostEstimate,
    pub summary: ReportSummary,
}

#[derive(Clone)]
pub struct UsageTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<Policy>,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, policy: Arc<Policy>) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub async fn track_usage(&self, category: &str, event: UsageEvent) {
        or_fallback("track_usage", self.record_usage(category, event), ()).await;
    }

    async fn record_usage(&self, category: &str, event: UsageEvent) -> GuardResult<()> {
        let now = self.clock.now_utc();
        let today = now.date_naive();

        self.bump(&keys::daily_usage_key(category, today), 1, DAILY_RETENTION_SECS)
            .await?;
        self.bump(
            &keys::hourly_usage_key(category, today, now.hour()),
            1,
            HOURLY_RETENTION_SECS,
        )
        .await?;

        if let Some(fields) = event.fields_count {
            self.bump(
                &keys::field_usage_key(category, today),
                fields as i64,
                DAILY_RETENTION_SECS,
            )
            .await?;
        }

        if let Some(hit) = event.cache_hit {
            self.bump(
                &keys::cache_outcome_key(category, hit, today),
                1,
                DAILY_RETENTION_SECS,
            )
            .await?;
        }

        debug!(category, ?event, "usage tracked");
        Ok(())
    }

    pub async fn track_rate_limit_violation(&self, category: &str, client_id: Option<&str>) {
        let client_id = client_id.unwrap_or(GLOBAL_CLIENT);
        let today = self.clock.now_utc().date_naive();
        let record = async {
            self.bump(&keys::violation_key(category, today), 1, DAILY_RETENTION_SECS)
                .await?;
            self.bump(
                &keys::client_violation_key(category, client_id, today),
                1,
                DAILY_RETENTION_SECS,
            )
            .await
        };
        or_fallback("track_rate_limit_violation", record, ()).await;
    }

    /// Violations over the last `days` days, for one client or the whole category.
    pub async fn get_violations(&self, category: &str, client_id: Option<&str>, days: u32) -> u64 {
        let mut total = 0;
        for date in self.recent_dates(days) {
            let key = match client_id {
                Some(client) => keys::client_violation_key(category, client, date),
                None => keys::violation_key(category, date),
            };
            total += self.read_count(&key).await;
        }
        total
    }

    /// Aggregate the last `days` calendar days, including today.
    pub async fn get_usage_stats(&self, category: &str, days: u32) -> UsageStats {
        let days = days.max(1);
        let today = self.clock.now_utc().date_naive();

        let mut daily = Vec::with_capacity(days as usize);
        let mut violations = 0;
        for date in self.recent_dates(days) {
            daily.push(DailyUsage {
                date,
                requests: self.read_count(&keys::daily_usage_key(category, date)).await,
                fields_used: self.read_count(&keys::field_usage_key(category, date)).await,
                cache_hits: self
                    .read_count(&keys::cache_outcome_key(category, true, date))
                    .await,
                cache_misses: self
                    .read_count(&keys::cache_outcome_key(category, false, date))
                    .await,
            });
            violations += self.read_count(&keys::violation_key(category, date)).await;
        }

        let mut hourly = Vec::with_capacity(24);
        for hour in 0..24 {
            hourly.push(HourlyUsage {
                hour,
                requests: self
                    .read_count(&keys::hourly_usage_key(category, today, hour))
                    .await,
            });
        }

        let total_requests = daily.iter().map(|d| d.requests).sum();
        let fields_used = daily.iter().map(|d| d.fields_used).sum();
        let cache_hits = daily.iter().map(|d| d.cache_hits).sum();
        let cache_misses = daily.iter().map(|d| d.cache_misses).sum();

        UsageStats {
            category: category.to_string(),
            period_days: days,
            total_requests,
            fields_used,
            cache_hits,
            cache_misses,
            cache_hit_rate: hit_rate(cache_hits, cache_misses),
            average_fields_per_request: ratio(fields_used, total_requests),
            rate_limit_violations: violations,
            daily,
            hourly,
        }
    }

    /// Stats for every category the policy knows, over the fixed report period.
    pub async fn generate_report(&self) -> MonitoringReport {
        let mut categories = BTreeMap::new();
        for category in self.policy.known_categories() {
            let stats = self.get_usage_stats(&category, REPORT_PERIOD_DAYS).await;
            categories.insert(category, stats);
        }

        let costs = estimate_costs(&categories, &self.policy.pricing);
        let total_requests = categories.values().map(|s| s.total_requests).sum();
        let average_cache_hit_rate = if categories.is_empty() {
            0.0
        } else {
            round_to(
                categories.values().map(|s| s.cache_hit_rate).sum::<f64>()
                    / categories.len() as f64,
                1,
            )
        };

        MonitoringReport {
            generated_at: self.clock.now_utc(),
            period_days: REPORT_PERIOD_DAYS,
            summary: ReportSummary {
                total_requests,
                total_estimated_cost: costs.total_cost,
                average_cache_hit_rate,
            },
            categories,
            costs,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    async fn bump(&self, key: &str, delta: i64, ttl_secs: u64) -> GuardResult<()> {
        self.store.incr_by(key, delta).await?;
        self.store.expire(key, ttl_secs).await?;
        Ok(())
    }

    async fn read_count(&self, key: &str) -> u64 {
        parse_count(or_fallback("read_usage", self.store.get(key), None).await)
    }

    fn recent_dates(&self, days: u32) -> Vec<NaiveDate> {
        let today = self.clock.now_utc().date_naive();
        (0..days.max(1))
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .collect()
    }
}

/// Price each category in `stats`; categories without a price are skipped.
pub fn estimate_costs(stats: &BTreeMap<String, UsageStats>, pricing: &PricingTable) -> CostEstimate {
    let mut estimate = CostEstimate::default();

    for (category, stats) in stats {
        let Some(price) = pricing.get(category) else {
            continue;
        };

        let base_cost = stats.total_requests as f64 * price.base_price;
        let field_cost = stats.fields_used as f64 * price.per_field_price;
        let total_cost = base_cost + field_cost;
        let estimated_savings = total_cost * stats.cache_hit_rate / 100.0;

        estimate.total_cost += total_cost;
        estimate.total_savings += estimated_savings;
        estimate.categories.insert(
            category.clone(),
            CategoryCost {
                requests: stats.total_requests,
                fields_used: stats.fields_used,
                base_cost: round_to(base_cost, 4),
                field_cost: round_to(field_cost, 4),
                total_cost: round_to(total_cost, 4),
                cache_hit_rate: stats.cache_hit_rate,
                estimated_savings: round_to(estimated_savings, 4),
            },
        );
    }

    estimate.total_cost = round_to(estimate.total_cost, 4);
    estimate.total_savings = round_to(estimate.total_savings, 4);
    estimate
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let tracked = hits + misses;
    if tracked == 0 {
        return 0.0;
    }
    round_to(hits as f64 / tracked as f64 * 100.0, 1)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_to(numerator as f64 / denominator as f64, 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
