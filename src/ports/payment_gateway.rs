//! Payment gateway port for the external subscription provider.
//!
//! Defines the narrow set of provider operations the plan change workflow
//! needs: customer creation, subscription create/modify/delete/retrieve and
//! webhook verification.
//!
//! # Design
//!
//! - **Absent is not an error**: retrieve and delete report a missing
//!   subscription through their return type, never through `PaymentError`
//! - **Transient vs permanent**: every failure says whether a retry can help

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::account::{RemoteStatus, SubscriptionError};
use crate::domain::foundation::{AccountId, CustomerRef, DomainError, ErrorCode, SubscriptionRef};
use crate::domain::webhook::{ProviderEvent, WebhookError};

/// Port for the subscription provider.
///
/// Implementations hold their own credentials; `is_configured` reports
/// whether those credentials are present before any call is attempted.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns true if provider credentials are available.
    fn is_configured(&self) -> bool;

    /// Create a customer in the payment system.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerRef, PaymentError>;

    /// Create a subscription for an existing customer.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError>;

    /// Swap the price of a subscription's line item.
    async fn modify_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
        request: ModifySubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError>;

    /// Delete a subscription immediately.
    async fn delete_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<DeleteOutcome, PaymentError>;

    /// Fetch a subscription by provider ID.
    async fn retrieve_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<RemoteLookup<RemoteSubscription>, PaymentError>;

    /// Verify a webhook signature and parse the event.
    fn verify_webhook(&self, payload: &[u8], signature: &str)
        -> Result<ProviderEvent, WebhookError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Internal account ID (stored as metadata).
    pub account_id: AccountId,

    /// Customer email address.
    pub email: String,

    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// How the provider should treat the first payment of a new subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentBehavior {
    /// Create the subscription in `incomplete` state pending payment.
    DefaultIncomplete,
}

impl PaymentBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentBehavior::DefaultIncomplete => "default_incomplete",
        }
    }
}

/// Where a confirmed payment method is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePaymentMethod {
    OnSubscription,
}

impl SavePaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavePaymentMethod::OnSubscription => "on_subscription",
        }
    }
}

/// Request to create a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Provider's customer ID.
    pub customer_ref: CustomerRef,

    /// Price of the single line item.
    pub price_id: String,

    pub payment_behavior: PaymentBehavior,

    pub save_default_payment_method: SavePaymentMethod,

    /// Related objects to expand in the response.
    pub expand: Vec<String>,
}

impl CreateSubscriptionRequest {
    /// A subscription that waits for payment confirmation, saving the
    /// payment method on the subscription and expanding the first invoice's
    /// payment intent so the client can confirm it.
    pub fn pending_payment(customer_ref: CustomerRef, price_id: impl Into<String>) -> Self {
        Self {
            customer_ref,
            price_id: price_id.into(),
            payment_behavior: PaymentBehavior::DefaultIncomplete,
            save_default_payment_method: SavePaymentMethod::OnSubscription,
            expand: vec!["latest_invoice.payment_intent".to_string()],
        }
    }
}

/// Proration policy applied when a subscription changes price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationBehavior {
    /// Prorate and invoice the difference immediately.
    AlwaysInvoice,
}

impl ProrationBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProrationBehavior::AlwaysInvoice => "always_invoice",
        }
    }
}

/// Request to move a subscription's line item to another price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifySubscriptionRequest {
    /// Line item being replaced. Without it the provider would add a
    /// second item instead of replacing the first.
    pub item_id: String,

    /// New price for the line item.
    pub price_id: String,

    pub proration: ProrationBehavior,
}

/// Subscription as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    /// Provider's subscription ID.
    pub id: SubscriptionRef,

    /// Provider's customer ID.
    pub customer_ref: Option<CustomerRef>,

    /// Current subscription status.
    pub status: RemoteStatus,

    /// First line item, if any.
    pub item_id: Option<String>,

    /// Price of the first line item, if any.
    pub price_id: Option<String>,
}

/// Result of a lookup where absence is an expected answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLookup<T> {
    Found(T),
    NotFound,
}

impl<T> RemoteLookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            RemoteLookup::Found(value) => Some(value),
            RemoteLookup::NotFound => None,
        }
    }
}

/// Result of deleting a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The provider had no such subscription.
    AlreadyAbsent,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::RateLimitExceeded, message)
    }

    /// Create a card declined error.
    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::CardDeclined, message)
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Create a not configured error.
    pub fn not_configured() -> Self {
        Self::new(
            PaymentErrorCode::NotConfigured,
            "payment provider credentials are not configured",
        )
    }

    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(ErrorCode::PaymentProviderError, err.to_string())
    }
}

impl From<PaymentError> for SubscriptionError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::NotConfigured => SubscriptionError::GatewayUnconfigured,
            PaymentErrorCode::NotFound => SubscriptionError::remote_not_found("subscription"),
            _ if err.retryable => SubscriptionError::transient(err.to_string()),
            _ => SubscriptionError::rejected(err.message),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue or timeout.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Card was declined.
    CardDeclined,

    /// Request was rejected as malformed.
    InvalidRequest,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Credentials are missing.
    NotConfigured,

    /// Provider API error.
    ProviderError,

    /// Provider is temporarily unavailable (5xx).
    ProviderUnavailable,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    ///
    /// Authentication failures count as transient: a rotated key is usually
    /// picked up again on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::AuthenticationError
                | PaymentErrorCode::ProviderUnavailable
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::CardDeclined => "card_declined",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::NotConfigured => "not_configured",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::ProviderUnavailable => "provider_unavailable",
        };
        write!(f, "{}", s)
    }
}
