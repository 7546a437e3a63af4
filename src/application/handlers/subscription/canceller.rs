//! SubscriptionCanceller - Ends a subscription immediately.

use std::sync::Arc;

use crate::domain::account::{Account, SubscriptionError};
use crate::domain::foundation::SubscriptionRef;
use crate::ports::{AccountUnitOfWork, DeleteOutcome, PaymentErrorCode, PaymentGateway};

/// Deletes the remote subscription and resets the account to no plan.
///
/// A subscription the provider no longer has counts as cancelled.
pub struct SubscriptionCanceller {
    gateway: Arc<dyn PaymentGateway>,
}

impl SubscriptionCanceller {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// # Errors
    ///
    /// Provider failures other than "not found" abort before any local
    /// change, so the cancel can be retried.
    pub async fn execute(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account: &mut Account,
        existing: &SubscriptionRef,
    ) -> Result<DeleteOutcome, SubscriptionError> {
        let outcome = match self.gateway.delete_subscription(existing).await {
            Ok(outcome) => outcome,
            Err(e) if e.code == PaymentErrorCode::NotFound => DeleteOutcome::AlreadyAbsent,
            Err(e) => {
                tracing::error!(
                    account_id = %account.id,
                    subscription_ref = %existing,
                    error = %e,
                    "Failed to delete subscription"
                );
                return Err(e.into());
            }
        };

        if outcome == DeleteOutcome::AlreadyAbsent {
            tracing::warn!(
                account_id = %account.id,
                subscription_ref = %existing,
                "Subscription already deleted at the provider"
            );
        }

        account.reset_subscription();
        uow.save(account).await.map_err(|e| {
            tracing::error!(
                account_id = %account.id,
                subscription_ref = %existing,
                error = %e,
                "Subscription deleted remotely but not recorded locally"
            );
            SubscriptionError::partial(account.id, existing.to_string(), e.to_string())
        })?;

        tracing::info!(account_id = %account.id, subscription_ref = %existing, "Subscription cancelled");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryAccountStore, MockPaymentGateway};
    use crate::domain::account::{PaidPlan, Plan, RemoteStatus, SubscriptionStatus};
    use crate::domain::foundation::{AccountId, CustomerRef};
    use crate::ports::{AccountStore, PaymentError};

    fn sub() -> SubscriptionRef {
        SubscriptionRef::new("sub_1").unwrap()
    }

    async fn subscribed(store: &InMemoryAccountStore) -> Account {
        let mut account = Account::register(AccountId::new(), "a@example.com").unwrap();
        account
            .assign_customer_ref(CustomerRef::new("cus_1").unwrap())
            .unwrap();
        account.attach_subscription(sub(), PaidPlan::Basic, &RemoteStatus::Active);
        store.insert(&account).await.unwrap();
        account
    }

    async fn cancel(
        gateway: &MockPaymentGateway,
        store: &InMemoryAccountStore,
        id: &AccountId,
    ) -> Result<DeleteOutcome, SubscriptionError> {
        let canceller = SubscriptionCanceller::new(Arc::new(gateway.clone()));
        let mut uow = store.begin().await.unwrap();
        let mut account = uow.lock_by_id(id).await.unwrap().unwrap();
        let result = canceller.execute(uow.as_mut(), &mut account, &sub()).await;
        if result.is_ok() {
            uow.commit().await.unwrap();
        }
        result
    }

    fn assert_reset(account: &Account) {
        assert_eq!(account.subscription_status(), SubscriptionStatus::Inactive);
        assert_eq!(account.current_plan(), Plan::None);
        assert!(account.subscription_ref().is_none());
    }

    #[tokio::test]
    async fn deletes_and_resets() {
        let store = InMemoryAccountStore::new();
        let account = subscribed(&store).await;
        let gateway = MockPaymentGateway::with_subscription(
            &CustomerRef::new("cus_1").unwrap(),
            &sub(),
            "price_basic",
            RemoteStatus::Active,
        );

        let outcome = cancel(&gateway, &store, &account.id).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(gateway.subscription_count(), 0);
        assert_reset(&store.get(&account.id).await.unwrap());
    }

    #[tokio::test]
    async fn already_absent_still_resets() {
        let store = InMemoryAccountStore::new();
        let account = subscribed(&store).await;
        let gateway = MockPaymentGateway::new();

        let outcome = cancel(&gateway, &store, &account.id).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
        assert_reset(&store.get(&account.id).await.unwrap());
    }

    #[tokio::test]
    async fn not_found_error_counts_as_absent() {
        let store = InMemoryAccountStore::new();
        let account = subscribed(&store).await;
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("delete_subscription", PaymentError::not_found("subscription"));

        let outcome = cancel(&gateway, &store, &account.id).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn transient_failure_keeps_subscription() {
        let store = InMemoryAccountStore::new();
        let account = subscribed(&store).await;
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("delete_subscription", PaymentError::rate_limited("slow down"));

        let err = cancel(&gateway, &store, &account.id).await.unwrap_err();

        assert!(err.is_retryable());
        let saved = store.get(&account.id).await.unwrap();
        assert_eq!(saved.current_plan(), Plan::Basic);
        assert_eq!(saved.subscription_ref(), Some(&sub()));
    }
}
