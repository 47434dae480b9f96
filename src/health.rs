use std::sync::Arc;
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::guard::PlacesGuard;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub in_flight_requests: usize,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    guard: Arc<PlacesGuard>,
}

impl HealthChecker {
    pub fn new(guard: Arc<PlacesGuard>) -> Self {
        Self { guard }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let store_status = self.check_store().await;

        // The guard fails open, so a missing store degrades rather than breaks it.
        let overall_status = if store_status.status == "healthy" {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            in_flight_requests: self.guard.dedup().in_flight().await,
            dependencies: DependencyStatus {
                store: store_status,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        let start = Instant::now();
        let available = self.guard.store_available().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        if available {
            ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            }
        } else {
            ServiceStatus {
                status: "unhealthy".to_string(),
                response_time_ms,
                error: Some("Store unreachable, guard failing open".to_string()),
            }
        }
    }
}
