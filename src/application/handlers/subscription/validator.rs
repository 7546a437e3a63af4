//! SubscriptionValidator - Resolves an account's subscription reference
//! against the payment provider.

use std::sync::Arc;

use crate::domain::account::{Account, SubscriptionError};
use crate::domain::foundation::SubscriptionRef;
use crate::ports::{AccountStore, PaymentGateway, RemoteLookup, RemoteSubscription};

/// What the provider says about an account's stored subscription reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionResolution {
    /// The subscription exists and can still be changed.
    Live(RemoteSubscription),

    /// The account holds no reference; the provider was not contacted.
    NoReference,

    /// The provider no longer knows the reference, so it was cleared.
    StaleCleared(SubscriptionRef),
}

impl SubscriptionResolution {
    /// The reference the locked account must still hold for this resolution
    /// to be acted upon.
    pub fn expected_ref(&self) -> Option<&SubscriptionRef> {
        match self {
            SubscriptionResolution::Live(remote) => Some(&remote.id),
            SubscriptionResolution::NoReference | SubscriptionResolution::StaleCleared(_) => None,
        }
    }

    pub fn live(&self) -> Option<&RemoteSubscription> {
        match self {
            SubscriptionResolution::Live(remote) => Some(remote),
            _ => None,
        }
    }
}

/// Checks a stored subscription reference with the provider and clears it
/// when the provider has no live subscription behind it.
///
/// The clear is its own atomic write, committed before the caller's unit of
/// work begins, so it survives whatever the caller does next.
pub struct SubscriptionValidator {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn AccountStore>,
}

impl SubscriptionValidator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn AccountStore>) -> Self {
        Self { gateway, store }
    }

    /// Resolves the account's current subscription.
    ///
    /// # Errors
    ///
    /// Transient provider failures propagate unchanged; nothing is cleared
    /// in that case.
    pub async fn resolve(
        &self,
        account: &Account,
    ) -> Result<SubscriptionResolution, SubscriptionError> {
        let Some(subscription_ref) = account.subscription_ref() else {
            return Ok(SubscriptionResolution::NoReference);
        };

        let lookup = self
            .gateway
            .retrieve_subscription(subscription_ref)
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = %account.id,
                    subscription_ref = %subscription_ref,
                    error = %e,
                    "Failed to retrieve subscription"
                );
                SubscriptionError::from(e)
            })?;

        match lookup {
            RemoteLookup::Found(remote) if !remote.status.is_ended() => {
                Ok(SubscriptionResolution::Live(remote))
            }
            RemoteLookup::Found(remote) => {
                tracing::warn!(
                    account_id = %account.id,
                    subscription_ref = %subscription_ref,
                    remote_status = %remote.status,
                    "Stored subscription has ended at the provider, clearing reference"
                );
                self.clear(account, subscription_ref).await
            }
            RemoteLookup::NotFound => {
                tracing::warn!(
                    account_id = %account.id,
                    subscription_ref = %subscription_ref,
                    "Stored subscription not found at the provider, clearing reference"
                );
                self.clear(account, subscription_ref).await
            }
        }
    }

    async fn clear(
        &self,
        account: &Account,
        subscription_ref: &SubscriptionRef,
    ) -> Result<SubscriptionResolution, SubscriptionError> {
        let cleared = self
            .store
            .clear_subscription_ref(&account.id, subscription_ref)
            .await?;

        if !cleared {
            tracing::debug!(
                account_id = %account.id,
                subscription_ref = %subscription_ref,
                "Subscription reference already changed by another writer"
            );
        }
        Ok(SubscriptionResolution::StaleCleared(subscription_ref.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryAccountStore, MockPaymentGateway};
    use crate::domain::account::{PaidPlan, RemoteStatus};
    use crate::domain::foundation::{AccountId, CustomerRef};
    use crate::ports::PaymentError;

    fn sub() -> SubscriptionRef {
        SubscriptionRef::new("sub_1").unwrap()
    }

    fn subscribed_account() -> Account {
        let mut account = Account::register(AccountId::new(), "a@example.com").unwrap();
        account
            .assign_customer_ref(CustomerRef::new("cus_1").unwrap())
            .unwrap();
        account.attach_subscription(sub(), PaidPlan::Basic, &RemoteStatus::Active);
        account
    }

    async fn setup(
        gateway: MockPaymentGateway,
        account: &Account,
    ) -> (SubscriptionValidator, InMemoryAccountStore, MockPaymentGateway) {
        let store = InMemoryAccountStore::new();
        store.insert(account).await.unwrap();
        let validator = SubscriptionValidator::new(Arc::new(gateway.clone()), Arc::new(store.clone()));
        (validator, store, gateway)
    }

    #[tokio::test]
    async fn no_reference_skips_the_provider() {
        let account = Account::register(AccountId::new(), "a@example.com").unwrap();
        let (validator, _, gateway) = setup(MockPaymentGateway::new(), &account).await;

        let resolution = validator.resolve(&account).await.unwrap();

        assert_eq!(resolution, SubscriptionResolution::NoReference);
        assert!(!gateway.was_called("retrieve_subscription"));
    }

    #[tokio::test]
    async fn live_subscription_is_returned() {
        let account = subscribed_account();
        let gateway = MockPaymentGateway::with_subscription(
            &CustomerRef::new("cus_1").unwrap(),
            &sub(),
            "price_basic",
            RemoteStatus::Active,
        );
        let (validator, store, _) = setup(gateway, &account).await;

        let resolution = validator.resolve(&account).await.unwrap();

        assert_eq!(resolution.expected_ref(), Some(&sub()));
        assert!(store.get(&account.id).await.unwrap().subscription_ref().is_some());
    }

    #[tokio::test]
    async fn missing_subscription_clears_reference() {
        let account = subscribed_account();
        let (validator, store, _) = setup(MockPaymentGateway::new(), &account).await;

        let resolution = validator.resolve(&account).await.unwrap();

        assert_eq!(resolution, SubscriptionResolution::StaleCleared(sub()));
        assert!(store.get(&account.id).await.unwrap().subscription_ref().is_none());
    }

    #[tokio::test]
    async fn canceled_subscription_clears_reference() {
        let account = subscribed_account();
        let gateway = MockPaymentGateway::with_subscription(
            &CustomerRef::new("cus_1").unwrap(),
            &sub(),
            "price_basic",
            RemoteStatus::Canceled,
        );
        let (validator, store, _) = setup(gateway, &account).await;

        let resolution = validator.resolve(&account).await.unwrap();

        assert!(resolution.live().is_none());
        assert!(store.get(&account.id).await.unwrap().subscription_ref().is_none());
    }

    #[tokio::test]
    async fn transient_failure_propagates_without_clearing() {
        let account = subscribed_account();
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("retrieve_subscription", PaymentError::network("timeout"));
        let (validator, store, _) = setup(gateway, &account).await;

        let err = validator.resolve(&account).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(store.get(&account.id).await.unwrap().subscription_ref().is_some());
    }
}
