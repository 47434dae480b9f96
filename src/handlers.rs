use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config_validator::ConfigValidator;
use crate::error::GuardError;
use crate::guard::PlacesGuard;
use crate::health::HealthChecker;
use crate::monitoring::recommend;
use crate::response::{ReadinessResponse, ReportResponse};
use crate::usage::REPORT_PERIOD_DAYS;

/// Shared application state
pub type SharedState = Arc<PlacesGuard>;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

/// Usage statistics for one category
pub async fn get_usage_stats(
    State(guard): State<SharedState>,
    Path(category): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, GuardError> {
    ConfigValidator::validate_category(&category)?;

    let days = query.days.unwrap_or(1);
    if days == 0 || days > REPORT_PERIOD_DAYS {
        return Err(GuardError::Validation(format!(
            "days must be between 1 and {}",
            REPORT_PERIOD_DAYS
        )));
    }

    let stats = guard.usage().get_usage_stats(&category, days).await;
    Ok(Json(stats))
}

/// Full monitoring report with recommendations
pub async fn get_report(State(guard): State<SharedState>) -> impl IntoResponse {
    let report = guard.usage().generate_report().await;
    let recommendations = recommend(&report, &guard.policy().recommendations);
    Json(ReportResponse::new(report, recommendations))
}

/// Health check endpoint
pub async fn health_check(State(guard): State<SharedState>) -> impl IntoResponse {
    Json(HealthChecker::new(guard).check_health().await)
}

/// Readiness check endpoint; the guard fails open, so it is always ready
pub async fn readiness_check(State(guard): State<SharedState>) -> impl IntoResponse {
    Json(ReadinessResponse::ready(guard.store_available().await))
}
