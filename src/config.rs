//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bypass inbound signature validation (non-production only).
    /// Defaults to `false`: validation is always enforced unless
    /// explicitly disabled.
    pub skip_signature_validation: bool,
    /// Signup URL included in the subscription-gate reply.
    pub signup_url: String,
    /// Interval between trigger-batch ticks.
    pub trigger_batch_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            skip_signature_validation: false,
            signup_url: "https://www.givecareapp.com/signup".to_string(),
            trigger_batch_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GIVECARE_SKIP_SIGNATURE_VALIDATION") {
            config.skip_signature_validation = match v.as_str() {
                "true" | "1" => true,
                "false" | "0" | "" => false,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "GIVECARE_SKIP_SIGNATURE_VALIDATION".to_string(),
                        message: format!("expected true/false, got '{other}'"),
                    });
                }
            };
        }

        if let Ok(v) = std::env::var("GIVECARE_SIGNUP_URL") {
            config.signup_url = v;
        }

        if let Ok(v) = std::env::var("GIVECARE_TRIGGER_INTERVAL_SECS") {
            let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GIVECARE_TRIGGER_INTERVAL_SECS".to_string(),
                message: format!("expected integer seconds, got '{v}'"),
            })?;
            config.trigger_batch_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
