//! Webhook domain module.
//!
//! Typed provider events and the errors raised while verifying and
//! reconciling them.

mod errors;
mod event;

pub use errors::WebhookError;
pub use event::{
    InvoicePayload, ProviderEvent, ProviderEventData, ProviderEventKind, SubscriptionPayload,
};
