//! Account aggregate entity.
//!
//! The Account is the local mirror of a customer's subscription at the payment
//! provider. Subscription-related fields are private so that every change goes
//! through a transition that keeps the invariants below intact.
//!
//! # Design Decisions
//!
//! - **Money in cents**: lifetime value is an unsigned integer count of cents
//! - **Monotonic lifetime value**: raised only by [`Account::credit_payment`];
//!   a store that increments the persisted total in SQL reports the result
//!   back through `sync_amount_paid`
//! - **Write-once customer**: a customer reference, once set, never changes

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::foundation::{
    AccountId, CustomerRef, DomainError, ErrorCode, SubscriptionRef, ValidationError,
};

use super::{PaidPlan, Plan, RemoteStatus, SubscriptionStatus};

/// Account aggregate - a customer's local subscription state.
///
/// # Invariants
///
/// - `total_amount_paid` never decreases
/// - `subscription_status == Active` implies `current_plan != Plan::None`
/// - `customer_ref`, once present, never changes to a different value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Unique identifier for this account.
    pub id: AccountId,

    /// Contact email, sent to the provider when the customer is created.
    pub email: String,

    subscription_status: SubscriptionStatus,
    current_plan: Plan,
    total_amount_paid: u64,
    customer_ref: Option<CustomerRef>,
    subscription_ref: Option<SubscriptionRef>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Stored representation of an account, as read back from persistence.
#[derive(Debug, Clone)]
pub struct AccountParts {
    pub id: AccountId,
    pub email: String,
    pub subscription_status: SubscriptionStatus,
    pub current_plan: Plan,
    pub total_amount_paid: i64,
    pub customer_ref: Option<CustomerRef>,
    pub subscription_ref: Option<SubscriptionRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Registers a new account with no subscription.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `email` is blank.
    pub fn register(id: AccountId, email: impl Into<String>) -> Result<Self, DomainError> {
        let email = email.into().trim().to_string();
        if email.is_empty() {
            return Err(ValidationError::empty_field("email").into());
        }

        let now = Utc::now();
        Ok(Self {
            id,
            email,
            subscription_status: SubscriptionStatus::Inactive,
            current_plan: Plan::None,
            total_amount_paid: 0,
            customer_ref: None,
            subscription_ref: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an account from storage, rejecting rows that break an invariant.
    pub fn restore(parts: AccountParts) -> Result<Self, DomainError> {
        let total_amount_paid = u64::try_from(parts.total_amount_paid).map_err(|_| {
            DomainError::from(ValidationError::negative(
                "total_amount_paid",
                parts.total_amount_paid,
            ))
        })?;

        let account = Self {
            id: parts.id,
            email: parts.email,
            subscription_status: parts.subscription_status,
            current_plan: parts.current_plan,
            total_amount_paid,
            customer_ref: parts.customer_ref,
            subscription_ref: parts.subscription_ref,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        };
        account.check_invariants()?;
        Ok(account)
    }

    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.subscription_status
    }

    pub fn current_plan(&self) -> Plan {
        self.current_plan
    }

    /// Lifetime value in cents.
    pub fn total_amount_paid(&self) -> u64 {
        self.total_amount_paid
    }

    pub fn customer_ref(&self) -> Option<&CustomerRef> {
        self.customer_ref.as_ref()
    }

    pub fn subscription_ref(&self) -> Option<&SubscriptionRef> {
        self.subscription_ref.as_ref()
    }

    pub fn is_subscription_active(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Active
    }

    /// With `None`, reports whether the account is on any plan at all.
    pub fn has_plan(&self, plan: Option<Plan>) -> bool {
        match plan {
            Some(plan) => self.current_plan == plan,
            None => self.current_plan != Plan::None,
        }
    }

    /// Lifetime value formatted as currency units, e.g. `"20.00"` for 2000 cents.
    pub fn lifetime_value_display(&self) -> String {
        format!(
            "{}.{:02}",
            self.total_amount_paid / 100,
            self.total_amount_paid % 100
        )
    }

    /// Links the provider customer. Re-linking the same customer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CustomerRefConflict` if a different customer is already linked.
    pub fn assign_customer_ref(&mut self, customer: CustomerRef) -> Result<(), DomainError> {
        match &self.customer_ref {
            Some(existing) if existing == &customer => Ok(()),
            Some(existing) => Err(DomainError::new(
                ErrorCode::CustomerRefConflict,
                "Account is already linked to a different customer",
            )
            .with_detail("existing", existing.as_str())
            .with_detail("attempted", customer.as_str())),
            None => {
                self.customer_ref = Some(customer);
                self.touch();
                Ok(())
            }
        }
    }

    /// Records a freshly created subscription.
    ///
    /// The account only becomes active if the provider already reports the
    /// subscription as active or trialing.
    pub fn attach_subscription(
        &mut self,
        subscription: SubscriptionRef,
        plan: PaidPlan,
        remote_status: &RemoteStatus,
    ) {
        self.subscription_ref = Some(subscription);
        self.current_plan = plan.into();
        self.subscription_status = SubscriptionStatus::from_remote(remote_status.clone());
        self.touch();
    }

    /// Moves an existing subscription to another plan. Status is untouched.
    pub fn change_plan(&mut self, plan: PaidPlan) {
        self.current_plan = plan.into();
        self.touch();
    }

    /// Forgets a subscription reference the provider no longer knows about.
    pub fn clear_subscription_ref(&mut self) {
        self.subscription_ref = None;
        self.touch();
    }

    /// Returns the account to having no subscription.
    pub fn reset_subscription(&mut self) {
        self.subscription_status = SubscriptionStatus::Inactive;
        self.current_plan = Plan::None;
        self.subscription_ref = None;
        self.touch();
    }

    /// Applies a provider "subscription created" notification.
    ///
    /// Returns whether the account ended up active. Activation is withheld
    /// when the price is unrecognized and the account has no plan yet.
    pub fn apply_subscription_created(
        &mut self,
        subscription: SubscriptionRef,
        plan: Option<PaidPlan>,
    ) -> bool {
        self.subscription_ref = Some(subscription);
        if let Some(plan) = plan {
            self.current_plan = plan.into();
        }
        self.touch();
        self.activate_if_planned()
    }

    /// Applies a provider "subscription updated" notification.
    pub fn apply_subscription_updated(
        &mut self,
        subscription: SubscriptionRef,
        remote_status: &RemoteStatus,
        plan: Option<PaidPlan>,
    ) -> bool {
        self.subscription_ref = Some(subscription);
        if let Some(plan) = plan {
            self.current_plan = plan.into();
        }
        self.touch();
        match SubscriptionStatus::from_remote(remote_status.clone()) {
            SubscriptionStatus::Active => self.activate_if_planned(),
            SubscriptionStatus::Inactive => {
                self.subscription_status = SubscriptionStatus::Inactive;
                false
            }
        }
    }

    /// Adds a successful payment to the lifetime value.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the total would overflow.
    pub fn credit_payment(&mut self, amount_cents: u64) -> Result<u64, DomainError> {
        let total = self
            .total_amount_paid
            .checked_add(amount_cents)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InvariantViolation,
                    "Lifetime value would overflow",
                )
            })?;
        self.total_amount_paid = total;
        self.touch();
        Ok(total)
    }

    /// Marks a paid invoice: the account becomes active if it is on a plan.
    pub fn mark_paid(&mut self) -> bool {
        self.activate_if_planned()
    }

    /// Overwrites the in-memory lifetime value with the persisted one.
    ///
    /// Called once an atomic increment has been persisted.
    pub(crate) fn sync_amount_paid(&mut self, persisted_total: u64) {
        self.total_amount_paid = persisted_total;
    }

    /// Verifies the cross-field invariants.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.subscription_status == SubscriptionStatus::Active
            && self.current_plan == Plan::None
        {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "An active account must be on a plan",
            )
            .with_detail("account_id", self.id.to_string()));
        }
        Ok(())
    }

    fn activate_if_planned(&mut self) -> bool {
        if self.current_plan == Plan::None {
            return false;
        }
        self.subscription_status = SubscriptionStatus::Active;
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::register(AccountId::new(), "jane@example.com").unwrap()
    }

    fn sub(id: &str) -> SubscriptionRef {
        SubscriptionRef::new(id).unwrap()
    }

    fn customer(id: &str) -> CustomerRef {
        CustomerRef::new(id).unwrap()
    }

    // Construction tests

    #[test]
    fn register_starts_without_subscription() {
        let account = account();
        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert_eq!(account.current_plan(), Plan::None);
        assert_eq!(account.total_amount_paid(), 0);
        assert!(account.customer_ref().is_none());
        assert!(account.subscription_ref().is_none());
    }

    #[test]
    fn register_rejects_blank_email() {
        let err = Account::register(AccountId::new(), "  ").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn restore_rejects_negative_lifetime_value() {
        let now = Utc::now();
        let result = Account::restore(AccountParts {
            id: AccountId::new(),
            email: "a@example.com".into(),
            subscription_status: SubscriptionStatus::Inactive,
            current_plan: Plan::None,
            total_amount_paid: -1,
            customer_ref: None,
            subscription_ref: None,
            created_at: now,
            updated_at: now,
        });
        assert!(result.is_err());
    }

    #[test]
    fn restore_rejects_active_without_plan() {
        let now = Utc::now();
        let result = Account::restore(AccountParts {
            id: AccountId::new(),
            email: "a@example.com".into(),
            subscription_status: SubscriptionStatus::Active,
            current_plan: Plan::None,
            total_amount_paid: 0,
            customer_ref: None,
            subscription_ref: None,
            created_at: now,
            updated_at: now,
        });
        assert_eq!(result.unwrap_err().code, ErrorCode::InvariantViolation);
    }

    // Customer reference tests

    #[test]
    fn customer_ref_is_write_once() {
        let mut account = account();
        account.assign_customer_ref(customer("cus_1")).unwrap();
        account.assign_customer_ref(customer("cus_1")).unwrap();

        let err = account.assign_customer_ref(customer("cus_2")).unwrap_err();
        assert_eq!(err.code, ErrorCode::CustomerRefConflict);
        assert_eq!(account.customer_ref(), Some(&customer("cus_1")));
    }

    // Subscription transitions

    #[test]
    fn attach_with_incomplete_remote_stays_inactive() {
        let mut account = account();
        account.attach_subscription(sub("sub_1"), PaidPlan::Pro, &RemoteStatus::Incomplete);

        assert_eq!(account.current_plan(), Plan::Pro);
        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert_eq!(account.subscription_ref(), Some(&sub("sub_1")));
    }

    #[test]
    fn attach_with_trialing_remote_activates() {
        let mut account = account();
        account.attach_subscription(sub("sub_1"), PaidPlan::Basic, &RemoteStatus::Trialing);
        assert!(account.is_subscription_active());
    }

    #[test]
    fn reset_clears_everything_but_lifetime_value() {
        let mut account = account();
        account.attach_subscription(sub("sub_1"), PaidPlan::Pro, &RemoteStatus::Active);
        account.credit_payment(1500).unwrap();

        account.reset_subscription();

        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert_eq!(account.current_plan(), Plan::None);
        assert!(account.subscription_ref().is_none());
        assert_eq!(account.total_amount_paid(), 1500);
    }

    #[test]
    fn created_event_with_unknown_price_keeps_plan() {
        let mut account = account();
        account.change_plan(PaidPlan::Basic);

        let activated = account.apply_subscription_created(sub("sub_9"), None);

        assert!(activated);
        assert_eq!(account.current_plan(), Plan::Basic);
        assert!(account.is_subscription_active());
    }

    #[test]
    fn created_event_without_any_plan_withholds_activation() {
        let mut account = account();
        let activated = account.apply_subscription_created(sub("sub_9"), None);

        assert!(!activated);
        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert!(account.check_invariants().is_ok());
    }

    #[test]
    fn updated_event_past_due_deactivates() {
        let mut account = account();
        account.attach_subscription(sub("sub_1"), PaidPlan::Pro, &RemoteStatus::Active);

        account.apply_subscription_updated(sub("sub_1"), &RemoteStatus::PastDue, None);

        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert_eq!(account.current_plan(), Plan::Pro);
    }

    #[test]
    fn mark_paid_requires_a_plan() {
        let mut account = account();
        assert!(!account.mark_paid());

        account.change_plan(PaidPlan::Basic);
        assert!(account.mark_paid());
        assert!(account.is_subscription_active());
    }

    // Lifetime value

    #[test]
    fn credit_payment_accumulates() {
        let mut account = account();
        account.credit_payment(2000).unwrap();
        assert_eq!(account.credit_payment(1000).unwrap(), 3000);
    }

    #[test]
    fn credit_payment_rejects_overflow() {
        let mut account = account();
        account.credit_payment(u64::MAX).unwrap();
        assert!(account.credit_payment(1).is_err());
        assert_eq!(account.total_amount_paid(), u64::MAX);
    }

    #[test]
    fn lifetime_value_display_uses_two_decimals() {
        let mut account = account();
        assert_eq!(account.lifetime_value_display(), "0.00");
        account.credit_payment(2005).unwrap();
        assert_eq!(account.lifetime_value_display(), "20.05");
    }

    #[test]
    fn has_plan_matches_any_or_specific() {
        let mut account = account();
        assert!(!account.has_plan(None));
        account.change_plan(PaidPlan::Pro);
        assert!(account.has_plan(None));
        assert!(account.has_plan(Some(Plan::Pro)));
        assert!(!account.has_plan(Some(Plan::Basic)));
    }
}
