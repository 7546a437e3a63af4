//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` trait against the Stripe REST API using
//! form-encoded requests, and verifies webhooks with the configured signing
//! secret.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation for replay protection
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(Some(api_key), Some(webhook_secret));
//! let gateway = StripePaymentGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{CustomerRef, SubscriptionRef};
use crate::domain::webhook::{ProviderEvent, WebhookError};
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, DeleteOutcome, ModifySubscriptionRequest,
    PaymentError, PaymentErrorCode, PaymentGateway, RemoteLookup, RemoteSubscription,
};

use super::webhook_types::{StripeCustomer, StripeErrorEnvelope, StripeSubscription};
use super::webhook_verifier::{StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: Option<SecretString>,

    /// Webhook signing secret (whsec_...).
    webhook_secret: Option<SecretString>,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test mode events.
    require_livemode: bool,

    /// Timeout applied to every API request.
    request_timeout: Duration,

    /// Maximum accepted webhook age.
    webhook_tolerance_secs: i64,
}

impl StripeConfig {
    /// Create a new Stripe configuration. Either secret may be absent; the
    /// gateway then reports itself unconfigured for the affected operations.
    pub fn new(api_key: Option<SecretString>, webhook_secret: Option<SecretString>) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            require_livemode: false,
            request_timeout: Duration::from_secs(20),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Reject test mode events.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_webhook_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.webhook_tolerance_secs = tolerance_secs;
        self
    }
}

/// Stripe payment gateway adapter.
pub struct StripePaymentGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
    verifier: Option<StripeWebhookVerifier>,
}

impl StripePaymentGateway {
    /// Create a new Stripe gateway with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a provider error if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::provider(format!("failed to build HTTP client: {}", e)))?;

        let verifier = config.webhook_secret.clone().map(|secret| {
            StripeWebhookVerifier::new(secret).with_tolerance(config.webhook_tolerance_secs)
        });

        Ok(Self {
            config,
            http_client,
            verifier,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn api_key(&self) -> Result<&SecretString, PaymentError> {
        self.config.api_key.as_ref().ok_or_else(PaymentError::not_configured)
    }

    /// Sends an authenticated request and maps non-2xx responses to errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<reqwest::Response, PaymentError> {
        let api_key = self.api_key()?;

        let response = request
            .basic_auth(api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(operation, error = %e, "Stripe request failed to complete");
                PaymentError::network(e.to_string())
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let error = classify_error(status, &body);

        if error.code == PaymentErrorCode::NotFound {
            tracing::debug!(operation, status, "Stripe resource not found");
        } else {
            tracing::error!(
                operation,
                status,
                code = %error.code,
                provider_code = error.provider_code.as_deref().unwrap_or(""),
                "Stripe API error"
            );
        }
        Err(error)
    }

    async fn read_subscription(
        response: reqwest::Response,
    ) -> Result<RemoteSubscription, PaymentError> {
        let subscription: StripeSubscription = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;
        subscription.into_remote()
    }
}

/// Maps a Stripe error response to a `PaymentError`.
fn classify_error(status: u16, body: &str) -> PaymentError {
    let details = serde_json::from_str::<StripeErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let provider_code = details.as_ref().and_then(|d| d.code.clone());
    let error_type = details.as_ref().and_then(|d| d.error_type.clone());
    let message = details
        .and_then(|d| d.message)
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    let code = match (status, provider_code.as_deref(), error_type.as_deref()) {
        (404, _, _) | (_, Some("resource_missing"), _) => PaymentErrorCode::NotFound,
        (401, _, _) | (403, _, _) => PaymentErrorCode::AuthenticationError,
        (429, _, _) => PaymentErrorCode::RateLimitExceeded,
        (402, _, _) | (_, _, Some("card_error")) => PaymentErrorCode::CardDeclined,
        (500..=599, _, _) => PaymentErrorCode::ProviderUnavailable,
        (400, _, _) => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    };

    let error = PaymentError::new(code, message);
    match provider_code {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerRef, PaymentError> {
        let params = vec![
            ("email", request.email.clone()),
            ("metadata[user_id]", request.account_id.to_string()),
        ];

        let mut builder = self.http_client.post(self.url("/v1/customers")).form(&params);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = self.send(builder, "create_customer").await?;
        let customer: StripeCustomer = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        CustomerRef::new(customer.id)
            .map_err(|e| PaymentError::provider(format!("unexpected customer id: {}", e)))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_ref.to_string()),
            ("items[0][price]".to_string(), request.price_id.clone()),
            (
                "payment_behavior".to_string(),
                request.payment_behavior.as_str().to_string(),
            ),
            (
                "payment_settings[save_default_payment_method]".to_string(),
                request.save_default_payment_method.as_str().to_string(),
            ),
        ];
        for (i, path) in request.expand.iter().enumerate() {
            params.push((format!("expand[{}]", i), path.clone()));
        }

        let builder = self
            .http_client
            .post(self.url("/v1/subscriptions"))
            .form(&params);
        let response = self.send(builder, "create_subscription").await?;
        Self::read_subscription(response).await
    }

    async fn modify_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
        request: ModifySubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError> {
        let params = vec![
            ("items[0][id]", request.item_id.clone()),
            ("items[0][price]", request.price_id.clone()),
            ("proration_behavior", request.proration.as_str().to_string()),
        ];

        let builder = self
            .http_client
            .post(self.url(&format!("/v1/subscriptions/{}", subscription_ref)))
            .form(&params);
        let response = self.send(builder, "modify_subscription").await?;
        Self::read_subscription(response).await
    }

    async fn delete_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<DeleteOutcome, PaymentError> {
        let builder = self
            .http_client
            .delete(self.url(&format!("/v1/subscriptions/{}", subscription_ref)));

        match self.send(builder, "delete_subscription").await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.code == PaymentErrorCode::NotFound => Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => Err(e),
        }
    }

    async fn retrieve_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<RemoteLookup<RemoteSubscription>, PaymentError> {
        let builder = self
            .http_client
            .get(self.url(&format!("/v1/subscriptions/{}", subscription_ref)));

        match self.send(builder, "retrieve_subscription").await {
            Ok(response) => Ok(RemoteLookup::Found(Self::read_subscription(response).await?)),
            Err(e) if e.code == PaymentErrorCode::NotFound => Ok(RemoteLookup::NotFound),
            Err(e) => Err(e),
        }
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, WebhookError> {
        let verifier = self.verifier.as_ref().ok_or(WebhookError::NotConfigured)?;

        let event = verifier.verify_and_parse(payload, signature).map_err(|e| {
            tracing::warn!(error = %e, "Webhook verification failed");
            e
        })?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(WebhookError::LivemodeMismatch {
                expected: true,
                actual: false,
            });
        }

        ProviderEvent::parse(
            &event.id,
            &event.event_type,
            &event.data.object,
            event.created,
            event.livemode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stripe::sign_payload;
    use crate::domain::webhook::ProviderEventKind;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    fn test_config() -> StripeConfig {
        StripeConfig::new(Some(secret("sk_test_key")), Some(secret("whsec_test_secret")))
    }

    fn signed(payload: &str, secret_value: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        sign_payload(&secret(secret_value), now, payload.as_bytes()).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_new_sets_defaults() {
        let config = test_config();
        assert_eq!(config.api_base_url, "https://api.stripe.com");
        assert!(!config.require_livemode);
        assert_eq!(config.webhook_tolerance_secs, 300);
    }

    #[test]
    fn config_with_base_url_strips_trailing_slash() {
        let config = test_config().with_base_url("http://localhost:12111/");
        assert_eq!(config.api_base_url, "http://localhost:12111");
    }

    #[test]
    fn gateway_without_api_key_is_unconfigured() {
        let gateway = StripePaymentGateway::new(StripeConfig::new(None, None)).unwrap();
        assert!(!gateway.is_configured());
    }

    #[test]
    fn gateway_with_api_key_is_configured() {
        let gateway = StripePaymentGateway::new(test_config()).unwrap();
        assert!(gateway.is_configured());
    }

    #[tokio::test]
    async fn calls_without_api_key_fail_as_not_configured() {
        let gateway = StripePaymentGateway::new(StripeConfig::new(None, None)).unwrap();
        let sub = SubscriptionRef::new("sub_1").unwrap();

        let err = gateway.retrieve_subscription(&sub).await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::NotConfigured);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Classification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn resource_missing_is_not_found() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"resource_missing","message":"No such subscription: 'sub_1'"}}"#;
        let err = classify_error(400, body);
        assert_eq!(err.code, PaymentErrorCode::NotFound);
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
        assert_eq!(err.message, "No such subscription: 'sub_1'");
    }

    #[test]
    fn auth_and_rate_limit_are_retryable() {
        assert!(classify_error(401, "").retryable);
        assert!(classify_error(429, "").retryable);
        assert!(classify_error(503, "").retryable);
    }

    #[test]
    fn card_error_is_declined_and_final() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","message":"Your card was declined."}}"#;
        let err = classify_error(402, body);
        assert_eq!(err.code, PaymentErrorCode::CardDeclined);
        assert!(!err.retryable);
    }

    #[test]
    fn unparseable_body_still_classifies_by_status() {
        let err = classify_error(400, "<html>");
        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
        assert!(err.message.contains("400"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Tests
    // ════════════════════════════════════════════════════════════════════════════

    const INVOICE_EVENT: &str = r#"{"id":"evt_1","type":"invoice.paid","created":1704067200,"livemode":false,"data":{"object":{"customer":"cus_1","amount_paid":1000}}}"#;

    #[test]
    fn verify_webhook_parses_valid_event() {
        let gateway = StripePaymentGateway::new(test_config()).unwrap();
        let header = signed(INVOICE_EVENT, "whsec_test_secret");

        let event = gateway
            .verify_webhook(INVOICE_EVENT.as_bytes(), &header)
            .unwrap();

        assert_eq!(event.kind, ProviderEventKind::InvoicePaid);
        assert_eq!(event.id.as_str(), "evt_1");
    }

    #[test]
    fn verify_webhook_rejects_wrong_secret() {
        let gateway = StripePaymentGateway::new(test_config()).unwrap();
        let header = signed(INVOICE_EVENT, "whsec_wrong");

        let err = gateway
            .verify_webhook(INVOICE_EVENT.as_bytes(), &header)
            .unwrap_err();
        assert_eq!(err, WebhookError::InvalidSignature);
    }

    #[test]
    fn verify_webhook_without_secret_is_not_configured() {
        let gateway =
            StripePaymentGateway::new(StripeConfig::new(Some(secret("sk_test_key")), None))
                .unwrap();
        let err = gateway.verify_webhook(b"{}", "t=1,v1=aa").unwrap_err();
        assert_eq!(err, WebhookError::NotConfigured);
    }

    #[test]
    fn verify_webhook_rejects_test_event_when_livemode_required() {
        let gateway =
            StripePaymentGateway::new(test_config().with_require_livemode(true)).unwrap();
        let header = signed(INVOICE_EVENT, "whsec_test_secret");

        let err = gateway
            .verify_webhook(INVOICE_EVENT.as_bytes(), &header)
            .unwrap_err();
        assert!(matches!(err, WebhookError::LivemodeMismatch { .. }));
    }
}
