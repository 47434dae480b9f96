//! Key construction for every store-resident record.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Client identity used when a caller supplies none.
pub const GLOBAL_CLIENT: &str = "global";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub fn rate_window_key(category: &str, client_id: &str, window: i64) -> String {
    format!(
        "rate_limit:{}:{}:{}",
        category,
        sanitize_component(client_id),
        window
    )
}

/// Key identifying an external call by category and parameter set.
///
/// Object keys are sorted before hashing, so parameter order never
/// distinguishes two otherwise identical requests.
pub fn ongoing_request_key(category: &str, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_params(params).as_bytes());
    format!("ongoing_request:{}:{:x}", category, hasher.finalize())
}

pub fn daily_usage_key(category: &str, date: NaiveDate) -> String {
    format!("api_usage:{}:{}", category, date.format("%Y-%m-%d"))
}

pub fn hourly_usage_key(category: &str, date: NaiveDate, hour: u32) -> String {
    format!("api_usage:{}:{}:{}", category, date.format("%Y-%m-%d"), hour)
}

pub fn field_usage_key(category: &str, date: NaiveDate) -> String {
    format!("api_fields:{}:{}", category, date.format("%Y-%m-%d"))
}

pub fn cache_outcome_key(category: &str, hit: bool, date: NaiveDate) -> String {
    let outcome = if hit { "hit" } else { "miss" };
    format!("api_cache:{}:{}:{}", category, outcome, date.format("%Y-%m-%d"))
}

pub fn violation_key(category: &str, date: NaiveDate) -> String {
    format!("rate_limit_violations:{}:{}", category, date.format("%Y-%m-%d"))
}

pub fn client_violation_key(category: &str, client_id: &str, date: NaiveDate) -> String {
    format!(
        "rate_limit_violations:{}:{}:{}",
        category,
        sanitize_component(client_id),
        date.format("%Y-%m-%d")
    )
}

/// Queries are free text, so they enter page keys only as a digest.
pub fn page_token_key(normalized_query: &str, page: u32) -> String {
    format!("page_token:{}:{}", query_digest(normalized_query), page)
}

pub fn page_total_key(normalized_query: &str) -> String {
    format!("page_total:{}", query_digest(normalized_query))
}

fn query_digest(normalized_query: &str) -> String {
    format!("{:x}", Sha256::digest(normalized_query.as_bytes()))
}

/// Serialize `value` as JSON with object keys sorted at every level.
pub fn canonical_params(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Trim, lowercase and collapse whitespace in a search query.
pub fn normalize_query(query: &str) -> String {
    WHITESPACE
        .replace_all(query.trim(), " ")
        .to_lowercase()
}

/// Replace characters that have no business in a key component.
pub fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
