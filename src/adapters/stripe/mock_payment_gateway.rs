//! Mock payment gateway for testing.
//!
//! Provides a configurable in-process implementation of `PaymentGateway`
//! for unit and integration tests. Supports:
//! - A remote subscription "database" that create/modify/delete act on
//! - Error injection per method
//! - Call tracking
//! - Webhook verification that either trusts the payload or checks real
//!   signatures

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::account::RemoteStatus;
use crate::domain::foundation::{CustomerRef, SubscriptionRef};
use crate::domain::webhook::{ProviderEvent, WebhookError};
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, DeleteOutcome, ModifySubscriptionRequest,
    PaymentError, PaymentGateway, RemoteLookup, RemoteSubscription,
};

use super::webhook_types::StripeWebhookEvent;
use super::webhook_verifier::StripeWebhookVerifier;

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
///
/// // Seed the provider side
/// gateway.add_subscription(remote_subscription);
///
/// // Inject errors
/// gateway.set_method_error("delete_subscription", PaymentError::network("reset"));
///
/// // Assert afterwards
/// assert_eq!(gateway.call_count("create_subscription"), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
struct MockState {
    /// Whether `is_configured` reports credentials.
    configured: bool,

    /// Subscriptions known to the "provider", by ID.
    subscriptions: HashMap<String, RemoteSubscription>,

    /// Status given to newly created subscriptions.
    created_status: RemoteStatus,

    next_customer: u32,
    next_subscription: u32,

    /// Specific errors by method name, returned on every call until cleared.
    method_errors: HashMap<String, PaymentError>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,

    /// Webhook verification behavior.
    webhook_verify_mode: WebhookVerifyMode,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            configured: true,
            subscriptions: HashMap::new(),
            created_status: RemoteStatus::Incomplete,
            next_customer: 0,
            next_subscription: 0,
            method_errors: HashMap::new(),
            call_log: Vec::new(),
            webhook_verify_mode: WebhookVerifyMode::default(),
        }
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How to handle webhook verification.
#[derive(Default, Clone)]
enum WebhookVerifyMode {
    /// Accept any payload and parse it as an event envelope.
    #[default]
    AcceptAll,

    /// Check the signature with a real verifier.
    Verify(StripeWebhookVerifier),

    /// Always fail verification.
    AlwaysFail,
}

impl MockPaymentGateway {
    /// Create a new mock gateway with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that reports missing credentials.
    pub fn unconfigured() -> Self {
        let mock = Self::new();
        mock.state().configured = false;
        mock
    }

    /// Create a mock that verifies webhook signatures with `secret`.
    pub fn verifying_webhooks(secret: SecretString) -> Self {
        let mock = Self::new();
        mock.state().webhook_verify_mode =
            WebhookVerifyMode::Verify(StripeWebhookVerifier::new(secret));
        mock
    }

    /// Create a mock that fails all webhook verifications.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.state().webhook_verify_mode = WebhookVerifyMode::AlwaysFail;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the "provider".
    pub fn add_subscription(&self, subscription: RemoteSubscription) {
        let id = subscription.id.to_string();
        self.state().subscriptions.insert(id, subscription);
    }

    /// Remove a subscription from the "provider", as if deleted out of band.
    pub fn remove_subscription(&self, id: &SubscriptionRef) {
        self.state().subscriptions.remove(id.as_str());
    }

    /// Current provider-side view of a subscription.
    pub fn subscription(&self, id: &SubscriptionRef) -> Option<RemoteSubscription> {
        self.state().subscriptions.get(id.as_str()).cloned()
    }

    /// Number of subscriptions the "provider" holds.
    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    /// Status to give subscriptions created from now on.
    pub fn set_created_status(&self, status: RemoteStatus) {
        self.state().created_status = status;
    }

    /// Set error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertion Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    /// Get call count for a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear call log.
    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    /// Records the call and returns the injected error, if any.
    fn begin_call(&self, method: &str, args: Vec<String>) -> Result<MutexGuard<'_, MockState>, PaymentError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        match state.method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn is_configured(&self) -> bool {
        self.state().configured
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerRef, PaymentError> {
        let mut state = self.begin_call(
            "create_customer",
            vec![request.account_id.to_string(), request.email.clone()],
        )?;

        state.next_customer += 1;
        CustomerRef::new(format!("cus_mock_{}", state.next_customer))
            .map_err(|e| PaymentError::provider(e.to_string()))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError> {
        let mut state = self.begin_call(
            "create_subscription",
            vec![request.customer_ref.to_string(), request.price_id.clone()],
        )?;

        state.next_subscription += 1;
        let n = state.next_subscription;
        let id = SubscriptionRef::new(format!("sub_mock_{}", n))
            .map_err(|e| PaymentError::provider(e.to_string()))?;

        let subscription = RemoteSubscription {
            id,
            customer_ref: Some(request.customer_ref),
            status: state.created_status.clone(),
            item_id: Some(format!("si_mock_{}", n)),
            price_id: Some(request.price_id),
        };
        state
            .subscriptions
            .insert(subscription.id.to_string(), subscription.clone());
        Ok(subscription)
    }

    async fn modify_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
        request: ModifySubscriptionRequest,
    ) -> Result<RemoteSubscription, PaymentError> {
        let mut state = self.begin_call(
            "modify_subscription",
            vec![
                subscription_ref.to_string(),
                request.item_id.clone(),
                request.price_id.clone(),
            ],
        )?;

        let subscription = state
            .subscriptions
            .get_mut(subscription_ref.as_str())
            .ok_or_else(|| PaymentError::not_found("subscription"))?;

        if subscription.item_id.as_deref() != Some(request.item_id.as_str()) {
            return Err(PaymentError::invalid_request(format!(
                "No such subscription item: {}",
                request.item_id
            )));
        }
        subscription.price_id = Some(request.price_id);
        Ok(subscription.clone())
    }

    async fn delete_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<DeleteOutcome, PaymentError> {
        let mut state =
            self.begin_call("delete_subscription", vec![subscription_ref.to_string()])?;

        match state.subscriptions.remove(subscription_ref.as_str()) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyAbsent),
        }
    }

    async fn retrieve_subscription(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<RemoteLookup<RemoteSubscription>, PaymentError> {
        let state =
            self.begin_call("retrieve_subscription", vec![subscription_ref.to_string()])?;

        Ok(match state.subscriptions.get(subscription_ref.as_str()) {
            Some(subscription) => RemoteLookup::Found(subscription.clone()),
            None => RemoteLookup::NotFound,
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, WebhookError> {
        let mode = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: "verify_webhook".to_string(),
                args: vec![signature.to_string()],
            });
            state.webhook_verify_mode.clone()
        };

        let envelope: StripeWebhookEvent = match mode {
            WebhookVerifyMode::AlwaysFail => return Err(WebhookError::InvalidSignature),
            WebhookVerifyMode::Verify(verifier) => verifier.verify_and_parse(payload, signature)?,
            WebhookVerifyMode::AcceptAll => serde_json::from_slice(payload)
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?,
        };

        ProviderEvent::parse(
            &envelope.id,
            &envelope.event_type,
            &envelope.data.object,
            envelope.created,
            envelope.livemode,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Test Fixtures
// ════════════════════════════════════════════════════════════════════════════════

impl MockPaymentGateway {
    /// Create a mock that already holds one subscription for `customer`.
    pub fn with_subscription(
        customer: &CustomerRef,
        subscription: &SubscriptionRef,
        price_id: &str,
        status: RemoteStatus,
    ) -> Self {
        let mock = Self::new();
        mock.add_subscription(RemoteSubscription {
            id: subscription.clone(),
            customer_ref: Some(customer.clone()),
            status,
            item_id: Some(format!("si_{}", subscription.as_str().trim_start_matches("sub_"))),
            price_id: Some(price_id.to_string()),
        });
        mock
    }
}
