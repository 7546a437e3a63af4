//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::adapters::StripeConfig;
use crate::domain::account::PlanCatalog;

use super::error::ValidationError;

/// Payment configuration (Stripe)
///
/// Every field is optional: the process runs without Stripe and plan changes
/// fail with `GatewayUnconfigured` until credentials are supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: Option<SecretString>,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: Option<SecretString>,

    /// Stripe price ID for the basic plan
    pub basic_price_id: Option<String>,

    /// Stripe price ID for the pro plan
    pub pro_price_id: Option<String>,

    /// Stripe API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Reject test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.key_starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.key_starts_with("sk_live_")
    }

    /// True when an API key is present.
    pub fn is_configured(&self) -> bool {
        self.stripe_api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().is_empty())
    }

    /// Plan to price mapping.
    pub fn catalog(&self) -> PlanCatalog {
        PlanCatalog::new(self.basic_price_id.clone(), self.pro_price_id.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Settings for the Stripe adapter.
    pub fn stripe_config(&self, webhook_tolerance_secs: i64) -> StripeConfig {
        StripeConfig::new(self.stripe_api_key.clone(), self.stripe_webhook_secret.clone())
            .with_base_url(self.api_base_url.clone())
            .with_request_timeout(self.request_timeout())
            .with_require_livemode(self.require_livemode)
            .with_webhook_tolerance(webhook_tolerance_secs)
    }

    /// Lists what is missing for plan changes and webhooks to work.
    ///
    /// These are warnings, not load failures.
    pub fn configuration_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.is_configured() {
            errors.push("Stripe API key is not configured".to_string());
        }
        if self.stripe_webhook_secret.is_none() {
            errors.push("Stripe webhook secret is not configured".to_string());
        }
        for plan in self.catalog().missing_prices() {
            errors.push(format!("Price ID for the {} plan is not configured", plan));
        }
        errors
    }

    /// Validate the format of whatever is present
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = &self.stripe_api_key {
            if !key.expose_secret().starts_with("sk_") {
                return Err(ValidationError::InvalidStripeKey);
            }
        }
        if let Some(secret) = &self.stripe_webhook_secret {
            if !secret.expose_secret().starts_with("whsec_") {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
        }
        if matches!(&self.basic_price_id, Some(id) if !id.starts_with("price_")) {
            return Err(ValidationError::InvalidPriceId("basic"));
        }
        if matches!(&self.pro_price_id, Some(id) if !id.starts_with("price_")) {
            return Err(ValidationError::InvalidPriceId("pro"));
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidApiBaseUrl);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }

    fn key_starts_with(&self, prefix: &str) -> bool {
        self.stripe_api_key
            .as_ref()
            .is_some_and(|key| key.expose_secret().starts_with(prefix))
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            stripe_webhook_secret: None,
            basic_price_id: None,
            pro_price_id: None,
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            require_livemode: false,
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_request_timeout() -> u64 {
    20
}
