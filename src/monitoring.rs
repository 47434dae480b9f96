use serde::Serialize;

use crate::policy::{Priority, RecommendationPolicy};
use crate::usage::MonitoringReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CacheHitRate,
    HighUsage,
    FieldReduction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Priority,
    /// `None` for report-wide findings.
    pub category: Option<String>,
    pub message: String,
}

/// Derive recommendations from a report, highest priority first.
pub fn recommend(report: &MonitoringReport, policy: &RecommendationPolicy) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for (category, stats) in &report.categories {
        let Some(thresholds) = policy.categories.get(category) else {
            continue;
        };

        let cache_tracked = stats.cache_hits + stats.cache_misses;
        if cache_tracked > 0 && stats.cache_hit_rate < thresholds.min_cache_hit_rate {
            recommendations.push(Recommendation {
                kind: RecommendationKind::CacheHitRate,
                priority: thresholds.cache_priority,
                category: Some(category.clone()),
                message: format!(
                    "{} cache hit rate is {:.1}% (target {:.0}%); cache results longer or broaden cache keys",
                    category, stats.cache_hit_rate, thresholds.min_cache_hit_rate
                ),
            });
        }

        if stats.average_fields_per_request > thresholds.max_fields_per_request {
            recommendations.push(Recommendation {
                kind: RecommendationKind::FieldReduction,
                priority: Priority::Medium,
                category: Some(category.clone()),
                message: format!(
                    "{} requests ask for {:.1} fields on average (limit {:.0}); request only the fields pages display",
                    category, stats.average_fields_per_request, thresholds.max_fields_per_request
                ),
            });
        }
    }

    if report.summary.total_requests > policy.usage_warning_threshold {
        recommendations.push(Recommendation {
            kind: RecommendationKind::HighUsage,
            priority: Priority::Medium,
            category: None,
            message: format!(
                "{} requests in the last {} days exceeds {}; review call volume and estimated cost ${:.2}",
                report.summary.total_requests,
                report.period_days,
                policy.usage_warning_threshold,
                report.summary.total_estimated_cost
            ),
        });
    }

    recommendations.sort_by_key(|r| r.priority);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{CostEstimate, ReportSummary, UsageStats};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn stats(category: &str, requests: u64, hits: u64, misses: u64, fields: u64) -> UsageStats {
        let tracked = hits + misses;
        UsageStats {
            category: category.to_string(),
            period_days: 7,
            total_requests: requests,
            fields_used: fields,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if tracked == 0 {
                0.0
            } else {
                hits as f64 / tracked as f64 * 100.0
            },
            average_fields_per_request: if requests == 0 {
                0.0
            } else {
                fields as f64 / requests as f64
            },
            rate_limit_violations: 0,
            daily: Vec::new(),
            hourly: Vec::new(),
        }
    }

    fn report(entries: Vec<UsageStats>) -> MonitoringReport {
        let total_requests = entries.iter().map(|s| s.total_requests).sum();
        let categories: BTreeMap<_, _> = entries
            .into_iter()
            .map(|s| (s.category.clone(), s))
            .collect();
        MonitoringReport {
            generated_at: Utc::now(),
            period_days: 7,
            categories,
            costs: CostEstimate::default(),
            summary: ReportSummary {
                total_requests,
                total_estimated_cost: 0.0,
                average_cache_hit_rate: 0.0,
            },
        }
    }

    #[test]
    fn test_low_search_hit_rate_is_high_priority() {
        let report = report(vec![stats("search", 100, 20, 80, 0)]);
        let recs = recommend(&report, &RecommendationPolicy::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::CacheHitRate);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].category.as_deref(), Some("search"));
    }

    #[test]
    fn test_details_threshold_is_higher() {
        // 40% passes for search but not for details
        let report = report(vec![
            stats("search", 10, 4, 6, 0),
            stats("details", 10, 4, 6, 0),
        ]);
        let recs = recommend(&report, &RecommendationPolicy::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].category.as_deref(), Some("details"));
        assert_eq!(recs[0].priority, Priority::Medium);
    }

    #[test]
    fn test_no_cache_recommendation_without_cache_traffic() {
        let report = report(vec![stats("search", 50, 0, 0, 0)]);
        assert!(recommend(&report, &RecommendationPolicy::default()).is_empty());
    }

    #[test]
    fn test_usage_warning_and_field_reduction() {
        let report = report(vec![
            stats("search", 900, 600, 300, 900 * 12),
            stats("details", 200, 150, 50, 200 * 10),
        ]);
        let recs = recommend(&report, &RecommendationPolicy::default());
        let kinds: Vec<_> = recs.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&RecommendationKind::HighUsage));
        assert!(kinds.contains(&RecommendationKind::FieldReduction));
        assert!(!kinds.contains(&RecommendationKind::CacheHitRate));

        let field = recs
            .iter()
            .find(|r| r.kind == RecommendationKind::FieldReduction)
            .unwrap();
        assert_eq!(field.category.as_deref(), Some("search"));
    }

    #[test]
    fn test_sorted_by_priority() {
        let report = report(vec![
            stats("details", 600, 10, 90, 0),
            stats("search", 600, 10, 90, 0),
        ]);
        let recs = recommend(&report, &RecommendationPolicy::default());
        assert_eq!(recs.first().map(|r| r.priority), Some(Priority::High));
        assert_eq!(recs.len(), 3);
    }
}
