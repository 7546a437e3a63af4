//! HandleWebhookHandler - Command handler for raw provider webhook deliveries.

use std::sync::Arc;

use http::StatusCode;

use crate::domain::webhook::WebhookError;
use crate::ports::PaymentGateway;

use super::{WebhookOutcome, WebhookReconciler};

/// Command to handle a payment webhook.
#[derive(Debug, Clone)]
pub struct HandleWebhookCommand {
    /// Raw webhook payload, exactly as received.
    pub payload: Vec<u8>,
    /// Webhook signature header.
    pub signature: String,
}

/// Handler for provider webhooks.
///
/// Verifies the signature through the gateway, then hands the event to the
/// reconciler. The transport acknowledges only after this returns.
pub struct HandleWebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<WebhookReconciler>,
}

impl HandleWebhookHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, reconciler: Arc<WebhookReconciler>) -> Self {
        Self {
            gateway,
            reconciler,
        }
    }

    pub async fn handle(&self, cmd: HandleWebhookCommand) -> Result<WebhookOutcome, WebhookError> {
        // 1. Verify webhook signature and parse event
        let event = self
            .gateway
            .verify_webhook(&cmd.payload, &cmd.signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected webhook");
                e
            })?;

        tracing::debug!(event_id = %event.id, event_type = %event.kind, "Webhook verified");

        // 2. Reconcile
        self.reconciler.dispatch(&event).await
    }
}

/// Status the transport should answer the provider with.
pub fn response_status(result: &Result<WebhookOutcome, WebhookError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    }
}
