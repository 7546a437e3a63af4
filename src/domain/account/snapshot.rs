//! Read model returned to callers after a plan change or status query.

use serde::Serialize;

use crate::domain::foundation::AccountId;

use super::{Account, Plan, SubscriptionStatus};

/// Serializable view of an account's subscription state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub subscription_status: SubscriptionStatus,
    pub current_plan: Plan,
    pub total_amount_paid: u64,
    /// Lifetime value in currency units, e.g. `"20.00"`.
    pub lifetime_value: String,
    pub has_customer: bool,
    pub has_subscription: bool,
}

impl From<&Account> for AccountSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            subscription_status: account.subscription_status(),
            current_plan: account.current_plan(),
            total_amount_paid: account.total_amount_paid(),
            lifetime_value: account.lifetime_value_display(),
            has_customer: account.customer_ref().is_some(),
            has_subscription: account.subscription_ref().is_some(),
        }
    }
}
