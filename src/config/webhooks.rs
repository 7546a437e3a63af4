//! Webhook verification and ledger retention configuration

use chrono::Duration as ChronoDuration;
use serde::Deserialize;

use super::error::ValidationError;

/// Webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    /// Accepted age of a signature timestamp, in seconds
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: i64,

    /// How long processed event IDs are kept for deduplication
    #[serde(default = "default_retention_days")]
    pub ledger_retention_days: i64,
}

impl WebhooksConfig {
    pub fn ledger_retention(&self) -> ChronoDuration {
        ChronoDuration::days(self.ledger_retention_days)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=3600).contains(&self.tolerance_secs) {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        if self.ledger_retention_days < 1 {
            return Err(ValidationError::InvalidLedgerRetention);
        }
        Ok(())
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: default_tolerance(),
            ledger_retention_days: default_retention_days(),
        }
    }
}

fn default_tolerance() -> i64 {
    300
}

fn default_retention_days() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebhooksConfig::default();
        assert_eq!(config.tolerance_secs, 300);
        assert_eq!(config.ledger_retention(), ChronoDuration::days(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_tolerance() {
        let config = WebhooksConfig {
            tolerance_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidWebhookTolerance));
    }

    #[test]
    fn test_rejects_zero_retention() {
        let config = WebhooksConfig {
            ledger_retention_days: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidLedgerRetention));
    }
}
