use envconfig::Envconfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::dedup::{DEFAULT_MARKER_TTL, DEFAULT_STALE_AGE, DEFAULT_SWEEP_INTERVAL};
use crate::error::GuardResult;
use crate::page_tokens::{DEFAULT_TOKEN_TTL, DEFAULT_TOTAL_TTL};
use crate::policy::Policy;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Monitoring server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Key-value store URL; empty keeps all state in process memory
    #[envconfig(from = "STORE_URL", default = "redis://127.0.0.1:6379")]
    pub store_url: String,

    /// Store access token, sent as the connection password
    #[envconfig(from = "STORE_TOKEN")]
    pub store_token: Option<String>,

    /// JSON file overriding the rate limit, pricing and recommendation tables
    #[envconfig(from = "POLICY_PATH")]
    pub policy_path: Option<PathBuf>,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Interval between sweeps of the in-flight request map
    #[envconfig(from = "SWEEP_INTERVAL_SECS", default = "300")]
    pub sweep_interval_secs: u64,

    /// Age after which an in-flight marker is considered orphaned
    #[envconfig(from = "STALE_REQUEST_MAX_AGE_SECS", default = "60")]
    pub stale_request_max_age_secs: u64,

    #[envconfig(from = "ONGOING_MARKER_TTL_SECS", default = "30")]
    pub ongoing_marker_ttl_secs: u64,

    #[envconfig(from = "PAGE_TOKEN_TTL_SECS", default = "600")]
    pub page_token_ttl_secs: u64,

    #[envconfig(from = "TOTAL_TTL_SECS", default = "3600")]
    pub total_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store_url: String::new(),
            store_token: None,
            policy_path: None,
            log_level: "info".to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            stale_request_max_age_secs: DEFAULT_STALE_AGE.as_secs(),
            ongoing_marker_ttl_secs: DEFAULT_MARKER_TTL.as_secs(),
            page_token_ttl_secs: DEFAULT_TOKEN_TTL.as_secs(),
            total_ttl_secs: DEFAULT_TOTAL_TTL.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn validate(&self) -> GuardResult<()> {
        ConfigValidator::validate_store_url(&self.store_url)?;
        ConfigValidator::validate_bind_address(&self.bind_addr.to_string())?;

        for (name, secs) in [
            ("SWEEP_INTERVAL_SECS", self.sweep_interval_secs),
            ("STALE_REQUEST_MAX_AGE_SECS", self.stale_request_max_age_secs),
            ("ONGOING_MARKER_TTL_SECS", self.ongoing_marker_ttl_secs),
            ("PAGE_TOKEN_TTL_SECS", self.page_token_ttl_secs),
            ("TOTAL_TTL_SECS", self.total_ttl_secs),
        ] {
            ConfigValidator::validate_duration_secs(name, secs)?;
        }
        Ok(())
    }

    pub fn load_policy(&self) -> GuardResult<Policy> {
        Policy::load(self.policy_path.as_deref())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_request_max_age(&self) -> Duration {
        Duration::from_secs(self.stale_request_max_age_secs)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.store_url.is_empty()
    }
}
