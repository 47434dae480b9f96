pub mod clock;
pub mod config;
pub mod config_validator;
pub mod dedup;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod health;
pub mod keys;
pub mod middleware;
pub mod monitoring;
pub mod page_tokens;
pub mod policy;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;
pub mod usage;

pub use config::Config;
pub use error::{GuardError, GuardResult};
pub use guard::{Admission, PlacesGuard};
pub use server::create_app;
