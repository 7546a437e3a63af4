//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for Stripe, including:
//! - Customer creation
//! - Subscription create, modify, delete and retrieve
//! - Webhook signature verification
//! - Synthetic events for operator simulation
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! Read from `SUBSCRIPTIONS__PAYMENT__*`:
//! - `STRIPE_API_KEY`: Stripe secret API key
//! - `STRIPE_WEBHOOK_SECRET`: Webhook signing secret (whsec_...)

mod mock_payment_gateway;
mod simulated_events;
mod stripe_adapter;
mod webhook_types;
mod webhook_verifier;

pub use mock_payment_gateway::{MethodCall, MockPaymentGateway};
pub use simulated_events::{SimulatedEvent, SimulatedEventKind, DEFAULT_INVOICE_AMOUNT};
pub use stripe_adapter::{StripeConfig, StripePaymentGateway};
pub use webhook_types::{
    SignatureHeader, SignatureParseError, StripeCustomer, StripeSubscription, StripeWebhookEvent,
};
pub use webhook_verifier::{sign_payload, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};
