//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Plan changes and webhook reconciliation are commands; account status is a
//! query.

pub mod handlers;

pub use handlers::{
    // Plan change
    HandlePlanChangeCommand, HandlePlanChangeHandler, PlanChangePath, PlanChangeResult,
    // Status
    GetAccountStatusHandler, GetAccountStatusQuery,
    // Webhooks
    HandleWebhookCommand, HandleWebhookHandler, WebhookOutcome, WebhookReconciler,
};
