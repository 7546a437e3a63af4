//! Subscription handlers.
//!
//! The plan change entry point and the three mutators it dispatches to.

mod canceller;
mod creator;
mod get_account_status;
mod handle_plan_change;
mod updater;
mod validator;

pub use canceller::SubscriptionCanceller;
pub use creator::SubscriptionCreator;
pub use get_account_status::{GetAccountStatusHandler, GetAccountStatusQuery};
pub use handle_plan_change::{
    HandlePlanChangeCommand, HandlePlanChangeHandler, PlanChangePath, PlanChangeResult,
};
pub use updater::SubscriptionUpdater;
pub use validator::{SubscriptionResolution, SubscriptionValidator};
