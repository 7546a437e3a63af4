//! Webhook handlers.

mod handle_webhook;
mod reconciler;

pub use handle_webhook::{response_status, HandleWebhookCommand, HandleWebhookHandler};
pub use reconciler::{WebhookOutcome, WebhookReconciler};
