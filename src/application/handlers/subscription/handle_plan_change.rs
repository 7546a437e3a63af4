//! HandlePlanChangeHandler - Command handler for moving an account between plans.
//!
//! The single entry point for user-initiated plan changes. Decides between
//! creating, updating and cancelling a subscription, and runs the chosen path
//! inside one unit of work holding the account's row lock.

use std::sync::Arc;

use crate::domain::account::{
    Account, AccountSnapshot, PaidPlan, Plan, PlanCatalog, SubscriptionError,
};
use crate::domain::foundation::{AccountId, SubscriptionRef, ValidationError};
use crate::ports::{AccountStore, AccountUnitOfWork, PaymentGateway};

use super::{
    SubscriptionCanceller, SubscriptionCreator, SubscriptionResolution, SubscriptionUpdater,
    SubscriptionValidator,
};

/// Command to change an account's plan.
#[derive(Debug, Clone)]
pub struct HandlePlanChangeCommand {
    pub account_id: AccountId,
    /// Requested plan as received: "basic", "pro" or "none".
    pub target_plan: String,
}

/// Which path a plan change took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChangePath {
    /// A new subscription was created.
    Created { subscription_ref: SubscriptionRef },
    /// The existing subscription moved to another price.
    Updated { subscription_ref: SubscriptionRef },
    /// The existing subscription was deleted.
    Cancelled { subscription_ref: SubscriptionRef },
    /// No remote subscription was left to cancel; only local state changed.
    LocalReset,
}

impl PlanChangePath {
    fn touched_provider(&self) -> Option<&SubscriptionRef> {
        match self {
            PlanChangePath::Created { subscription_ref }
            | PlanChangePath::Updated { subscription_ref }
            | PlanChangePath::Cancelled { subscription_ref } => Some(subscription_ref),
            PlanChangePath::LocalReset => None,
        }
    }
}

/// Result of a successful plan change.
#[derive(Debug, Clone)]
pub struct PlanChangeResult {
    pub snapshot: AccountSnapshot,
    pub path: PlanChangePath,
}

/// Handler for plan changes.
pub struct HandlePlanChangeHandler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn AccountStore>,
    validator: SubscriptionValidator,
    creator: SubscriptionCreator,
    updater: SubscriptionUpdater,
    canceller: SubscriptionCanceller,
}

impl HandlePlanChangeHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn AccountStore>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            validator: SubscriptionValidator::new(gateway.clone(), store.clone()),
            creator: SubscriptionCreator::new(gateway.clone(), catalog.clone()),
            updater: SubscriptionUpdater::new(gateway.clone(), catalog),
            canceller: SubscriptionCanceller::new(gateway.clone()),
            gateway,
            store,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePlanChangeCommand,
    ) -> Result<PlanChangeResult, SubscriptionError> {
        // 1. Validate the requested plan before any side effect
        let target: Plan = cmd
            .target_plan
            .trim()
            .parse()
            .map_err(|e: ValidationError| SubscriptionError::validation("target_plan", e.to_string()))?;

        // 2. Fail fast without provider credentials
        if !self.gateway.is_configured() {
            tracing::warn!(account_id = %cmd.account_id, "Plan change requested but payment gateway is not configured");
            return Err(SubscriptionError::GatewayUnconfigured);
        }

        // 3. Load the account
        let account = self
            .store
            .find_by_id(&cmd.account_id)
            .await?
            .ok_or(SubscriptionError::AccountNotFound(cmd.account_id))?;

        // 4. Resolve the stored subscription (clears stale references on its own)
        let resolution = self.validator.resolve(&account).await?;

        // 5. Apply the chosen path under the row lock
        let mut uow = self.store.begin().await?;
        let applied = self
            .apply(uow.as_mut(), &cmd.account_id, &resolution, target)
            .await;

        let (account, path) = match applied {
            Ok(applied) => applied,
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(account_id = %cmd.account_id, error = %rollback_err, "Rollback failed");
                }
                return Err(err);
            }
        };

        // 6. Commit
        if let Err(e) = uow.commit().await {
            return Err(match path.touched_provider() {
                Some(remote) => {
                    tracing::error!(
                        account_id = %cmd.account_id,
                        subscription_ref = %remote,
                        error = %e,
                        "Provider changed but local commit failed, reconciliation required"
                    );
                    SubscriptionError::partial(cmd.account_id, remote.to_string(), e.to_string())
                }
                None => e.into(),
            });
        }

        tracing::info!(
            account_id = %cmd.account_id,
            plan = %account.current_plan(),
            status = %account.subscription_status(),
            path = ?path,
            "Plan change completed"
        );

        Ok(PlanChangeResult {
            snapshot: AccountSnapshot::from(&account),
            path,
        })
    }

    async fn apply(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account_id: &AccountId,
        resolution: &SubscriptionResolution,
        target: Plan,
    ) -> Result<(Account, PlanChangePath), SubscriptionError> {
        let mut account = uow
            .lock_by_id(account_id)
            .await?
            .ok_or(SubscriptionError::AccountNotFound(*account_id))?;

        if account.subscription_ref() != resolution.expected_ref() {
            tracing::warn!(
                account_id = %account_id,
                "Subscription reference changed while the plan change was in flight"
            );
            return Err(SubscriptionError::ConcurrentModification(*account_id));
        }

        let path = match (target.as_paid(), resolution.live()) {
            (None, Some(remote)) => {
                self.canceller
                    .execute(uow, &mut account, &remote.id)
                    .await?;
                PlanChangePath::Cancelled {
                    subscription_ref: remote.id.clone(),
                }
            }
            (None, None) => {
                account.reset_subscription();
                uow.save(&account).await?;
                tracing::info!(account_id = %account_id, "No remote subscription to cancel, reset locally");
                PlanChangePath::LocalReset
            }
            (Some(plan), Some(remote)) => {
                self.updater
                    .execute(uow, &mut account, remote, plan)
                    .await?;
                PlanChangePath::Updated {
                    subscription_ref: remote.id.clone(),
                }
            }
            (Some(plan), None) => self.create(uow, &mut account, plan).await?,
        };

        Ok((account, path))
    }

    async fn create(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account: &mut Account,
        plan: PaidPlan,
    ) -> Result<PlanChangePath, SubscriptionError> {
        let remote = self.creator.execute(uow, account, plan).await?;
        Ok(PlanChangePath::Created {
            subscription_ref: remote.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryAccountStore, MockPaymentGateway};
    use crate::domain::account::{RemoteStatus, SubscriptionStatus};
    use crate::domain::foundation::{CustomerRef, DomainError, EventId};
    use crate::ports::{PaymentError, ProcessedEventRecord};
    use chrono::{DateTime, Utc};

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(Some("price_basic".into()), Some("price_pro".into()))
    }

    fn sub() -> SubscriptionRef {
        SubscriptionRef::new("sub_1").unwrap()
    }

    fn customer() -> CustomerRef {
        CustomerRef::new("cus_1").unwrap()
    }

    struct Fixture {
        store: InMemoryAccountStore,
        gateway: MockPaymentGateway,
        handler: HandlePlanChangeHandler,
        account_id: AccountId,
    }

    async fn fixture(gateway: MockPaymentGateway, account: Account) -> Fixture {
        let store = InMemoryAccountStore::new();
        store.insert(&account).await.unwrap();
        let handler = HandlePlanChangeHandler::new(
            Arc::new(gateway.clone()),
            Arc::new(store.clone()),
            catalog(),
        );
        Fixture {
            store,
            gateway,
            handler,
            account_id: account.id,
        }
    }

    fn fresh_account() -> Account {
        Account::register(AccountId::new(), "a@example.com").unwrap()
    }

    fn pro_account() -> Account {
        let mut account = fresh_account();
        account.assign_customer_ref(customer()).unwrap();
        account.attach_subscription(sub(), PaidPlan::Pro, &RemoteStatus::Active);
        account
    }

    fn live_gateway(price: &str) -> MockPaymentGateway {
        MockPaymentGateway::with_subscription(&customer(), &sub(), price, RemoteStatus::Active)
    }

    fn cmd(account_id: AccountId, plan: &str) -> HandlePlanChangeCommand {
        HandlePlanChangeCommand {
            account_id,
            target_plan: plan.to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Validation Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_plan_is_rejected_before_side_effects() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;

        let err = f.handler.handle(cmd(f.account_id, "enterprise")).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::ValidationFailed { .. }));
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_gateway_fails_fast() {
        let f = fixture(MockPaymentGateway::unconfigured(), fresh_account()).await;

        let err = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap_err();

        assert_eq!(err, SubscriptionError::GatewayUnconfigured);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_account_is_reported() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;
        let missing = AccountId::new();

        let err = f.handler.handle(cmd(missing, "basic")).await.unwrap_err();

        assert_eq!(err, SubscriptionError::AccountNotFound(missing));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Dispatch Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn no_subscription_takes_creator_path() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "pro")).await.unwrap();

        assert!(matches!(result.path, PlanChangePath::Created { .. }));
        assert_eq!(result.snapshot.current_plan, Plan::Pro);
        assert!(result.snapshot.has_customer);
        assert!(result.snapshot.has_subscription);
    }

    #[tokio::test]
    async fn live_subscription_takes_updater_path() {
        let f = fixture(live_gateway("price_pro"), pro_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap();

        assert_eq!(result.path, PlanChangePath::Updated { subscription_ref: sub() });
        assert_eq!(result.snapshot.current_plan, Plan::Basic);
        assert!(!f.gateway.was_called("create_subscription"));
        assert!(!f.gateway.was_called("delete_subscription"));
    }

    #[tokio::test]
    async fn none_with_live_subscription_cancels() {
        let f = fixture(live_gateway("price_pro"), pro_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "none")).await.unwrap();

        assert_eq!(result.path, PlanChangePath::Cancelled { subscription_ref: sub() });
        assert_eq!(result.snapshot.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(result.snapshot.current_plan, Plan::None);
        assert!(!result.snapshot.has_subscription);
    }

    #[tokio::test]
    async fn none_without_reference_resets_locally() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "none")).await.unwrap();

        assert_eq!(result.path, PlanChangePath::LocalReset);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn none_with_stale_reference_resets_without_delete() {
        let f = fixture(MockPaymentGateway::new(), pro_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "none")).await.unwrap();

        assert_eq!(result.path, PlanChangePath::LocalReset);
        assert!(f.gateway.was_called("retrieve_subscription"));
        assert!(!f.gateway.was_called("delete_subscription"));
        assert_eq!(result.snapshot.current_plan, Plan::None);
    }

    #[tokio::test]
    async fn paid_plan_with_stale_reference_creates_new_subscription() {
        let f = fixture(MockPaymentGateway::new(), pro_account()).await;

        let result = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap();

        match result.path {
            PlanChangePath::Created { subscription_ref } => assert_ne!(subscription_ref, sub()),
            other => panic!("expected creator path, got {:?}", other),
        }
        assert!(!f.gateway.was_called("create_customer"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn transient_provider_failure_leaves_account_unchanged() {
        let f = fixture(live_gateway("price_pro"), pro_account()).await;
        f.gateway
            .set_method_error("modify_subscription", PaymentError::network("timeout"));

        let err = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap_err();

        assert!(err.is_retryable());
        let saved = f.store.get(&f.account_id).await.unwrap();
        assert_eq!(saved.current_plan(), Plan::Pro);
    }

    #[tokio::test]
    async fn failed_create_discards_linked_customer() {
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("create_subscription", PaymentError::card_declined("declined"));
        let f = fixture(gateway, fresh_account()).await;

        let err = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::GatewayRejected(_)));
        let saved = f.store.get(&f.account_id).await.unwrap();
        assert!(saved.customer_ref().is_none());
        assert_eq!(saved.current_plan(), Plan::None);
    }

    #[tokio::test]
    async fn commit_failure_after_remote_change_needs_reconciliation() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;
        f.store.fail_next_commit();

        let err = f.handler.handle(cmd(f.account_id, "basic")).await.unwrap_err();

        assert!(err.requires_reconciliation());
        assert_eq!(f.gateway.subscription_count(), 1);
        let saved = f.store.get(&f.account_id).await.unwrap();
        assert!(saved.subscription_ref().is_none());
    }

    #[tokio::test]
    async fn commit_failure_on_local_reset_is_retryable() {
        let f = fixture(MockPaymentGateway::new(), fresh_account()).await;
        f.store.fail_next_commit();

        let err = f.handler.handle(cmd(f.account_id, "none")).await.unwrap_err();

        assert!(!err.requires_reconciliation());
        assert!(err.is_retryable());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Concurrent Reference Change
    // ════════════════════════════════════════════════════════════════════════════

    /// Store that links a different subscription to the account right before
    /// handing out a unit of work, as a webhook landing mid-request would.
    struct RelinkingStore {
        inner: InMemoryAccountStore,
        replacement: SubscriptionRef,
    }

    #[async_trait::async_trait]
    impl AccountStore for RelinkingStore {
        async fn insert(&self, account: &Account) -> Result<(), DomainError> {
            self.inner.insert(account).await
        }

        async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_customer_ref(
            &self,
            customer_ref: &CustomerRef,
        ) -> Result<Option<Account>, DomainError> {
            self.inner.find_by_customer_ref(customer_ref).await
        }

        async fn clear_subscription_ref(
            &self,
            id: &AccountId,
            expected: &SubscriptionRef,
        ) -> Result<bool, DomainError> {
            self.inner.clear_subscription_ref(id, expected).await
        }

        async fn begin(&self) -> Result<Box<dyn AccountUnitOfWork>, DomainError> {
            let mut competing = self.inner.begin().await?;
            let mut account = competing
                .lock_by_customer_ref(&customer())
                .await?
                .expect("account linked to customer");
            account.apply_subscription_created(self.replacement.clone(), Some(PaidPlan::Pro));
            competing.save(&account).await?;
            competing.commit().await?;

            self.inner.begin().await
        }

        async fn find_processed_event(
            &self,
            event_id: &EventId,
        ) -> Result<Option<ProcessedEventRecord>, DomainError> {
            self.inner.find_processed_event(event_id).await
        }

        async fn purge_processed_events(&self, before: DateTime<Utc>) -> Result<u64, DomainError> {
            self.inner.purge_processed_events(before).await
        }
    }

    #[tokio::test]
    async fn reference_changed_before_lock_is_concurrent_modification() {
        let inner = InMemoryAccountStore::new();
        let account = pro_account();
        inner.insert(&account).await.unwrap();
        let gateway = live_gateway("price_pro");
        let replacement = SubscriptionRef::new("sub_2").unwrap();
        let handler = HandlePlanChangeHandler::new(
            Arc::new(gateway.clone()),
            Arc::new(RelinkingStore {
                inner: inner.clone(),
                replacement: replacement.clone(),
            }),
            catalog(),
        );

        let err = handler.handle(cmd(account.id, "basic")).await.unwrap_err();

        assert_eq!(err, SubscriptionError::ConcurrentModification(account.id));
        assert!(err.is_retryable());
        let methods: Vec<String> = gateway.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["retrieve_subscription"]);

        let saved = inner.get(&account.id).await.unwrap();
        assert_eq!(saved.subscription_ref(), Some(&replacement));
        assert_eq!(saved.current_plan(), Plan::Pro);
    }
}
