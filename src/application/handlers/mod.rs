//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod subscription;
pub mod webhook;

pub use subscription::{
    GetAccountStatusHandler, GetAccountStatusQuery, HandlePlanChangeCommand,
    HandlePlanChangeHandler, PlanChangePath, PlanChangeResult, SubscriptionCanceller,
    SubscriptionCreator, SubscriptionResolution, SubscriptionUpdater, SubscriptionValidator,
};
pub use webhook::{
    response_status, HandleWebhookCommand, HandleWebhookHandler, WebhookOutcome,
    WebhookReconciler,
};
