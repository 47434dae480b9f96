use serde::Serialize;

use crate::monitoring::Recommendation;
use crate::usage::MonitoringReport;

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: MonitoringReport,
    pub recommendations: Vec<Recommendation>,
}

impl ReportResponse {
    pub fn new(report: MonitoringReport, recommendations: Vec<Recommendation>) -> Self {
        Self {
            report,
            recommendations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ReadinessResponse {
    pub fn ready(store_connected: bool) -> Self {
        if store_connected {
            Self {
                status: "ready".to_string(),
                store: "connected".to_string(),
                note: None,
            }
        } else {
            Self {
                status: "ready".to_string(),
                store: "disconnected".to_string(),
                note: Some("Failing open: limits, dedup and usage tracking are best-effort".to_string()),
            }
        }
    }
}
