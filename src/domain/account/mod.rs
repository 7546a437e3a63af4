//! Account domain module.
//!
//! Local subscription state for a customer and the rules for changing it.
//!
//! # Module Structure
//!
//! - `aggregate` - Account aggregate entity
//! - `plan` - Plan and PaidPlan
//! - `status` - local SubscriptionStatus and provider RemoteStatus
//! - `catalog` - PlanCatalog mapping plans to provider prices
//! - `snapshot` - AccountSnapshot read model
//! - `errors` - SubscriptionError

mod aggregate;
mod catalog;
mod errors;
mod plan;
mod snapshot;
mod status;

pub use aggregate::{Account, AccountParts};
pub use catalog::PlanCatalog;
pub use errors::SubscriptionError;
pub use plan::{PaidPlan, Plan};
pub use snapshot::AccountSnapshot;
pub use status::{RemoteStatus, SubscriptionStatus};
