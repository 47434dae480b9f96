use crate::error::GuardError;
use crate::policy::Policy;
use validator::Validate;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a store URL; an empty URL selects the in-memory store
    pub fn validate_store_url(url: &str) -> Result<(), GuardError> {
        if url.is_empty() {
            return Ok(());
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(GuardError::Validation(
                "Store URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates a bind address
    pub fn validate_bind_address(address: &str) -> Result<(), GuardError> {
        if address.is_empty() {
            return Err(GuardError::Validation(
                "Bind address cannot be empty".to_string(),
            ));
        }

        if !address.contains(':') {
            return Err(GuardError::Validation(
                "Bind address must be in host:port format".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates an interval or TTL setting, which must be at least one second
    pub fn validate_duration_secs(name: &str, secs: u64) -> Result<(), GuardError> {
        if secs == 0 {
            return Err(GuardError::Validation(format!(
                "{} must be greater than 0",
                name
            )));
        }

        Ok(())
    }

    /// Validates every table in a policy
    pub fn validate_policy(policy: &Policy) -> Result<(), GuardError> {
        for (category, rule) in &policy.rate_limits.rules {
            Self::validate_category(category)?;
            if rule.window.is_zero() {
                return Err(GuardError::Validation(format!(
                    "Rate limit window for '{}' must be greater than 0",
                    category
                )));
            }
            rule.validate().map_err(|e| {
                GuardError::Validation(format!("Rate limit for '{}': {}", category, e))
            })?;
        }

        for (category, price) in &policy.pricing.prices {
            Self::validate_category(category)?;
            price.validate().map_err(|e| {
                GuardError::Validation(format!("Pricing for '{}': {}", category, e))
            })?;
        }

        for (category, thresholds) in &policy.recommendations.categories {
            thresholds.validate().map_err(|e| {
                GuardError::Validation(format!("Thresholds for '{}': {}", category, e))
            })?;
        }

        Ok(())
    }

    /// Validates a category name used as a key component
    pub fn validate_category(category: &str) -> Result<(), GuardError> {
        if category.is_empty() {
            return Err(GuardError::Validation(
                "Category cannot be empty".to_string(),
            ));
        }

        if !category
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(GuardError::Validation(format!(
                "Category '{}' can only contain alphanumeric characters, hyphens, and underscores",
                category
            )));
        }

        Ok(())
    }
}
