//! SubscriptionUpdater - Moves a live subscription to another plan.

use std::sync::Arc;

use crate::domain::account::{Account, PaidPlan, PlanCatalog, SubscriptionError};
use crate::ports::{
    AccountUnitOfWork, ModifySubscriptionRequest, PaymentGateway, ProrationBehavior,
    RemoteSubscription,
};

/// Swaps the price of a subscription's line item, prorating and invoicing
/// the difference immediately.
pub struct SubscriptionUpdater {
    gateway: Arc<dyn PaymentGateway>,
    catalog: PlanCatalog,
}

impl SubscriptionUpdater {
    pub fn new(gateway: Arc<dyn PaymentGateway>, catalog: PlanCatalog) -> Self {
        Self { gateway, catalog }
    }

    /// Changes `existing` to `plan`. On provider failure the account is
    /// left untouched.
    pub async fn execute(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account: &mut Account,
        existing: &RemoteSubscription,
        plan: PaidPlan,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        let price_id = self
            .catalog
            .price_for(plan)
            .ok_or(SubscriptionError::PriceNotConfigured(plan))?
            .to_string();

        let item_id = existing
            .item_id
            .clone()
            .ok_or_else(|| SubscriptionError::remote_not_found("subscription item"))?;

        let updated = self
            .gateway
            .modify_subscription(
                &existing.id,
                ModifySubscriptionRequest {
                    item_id,
                    price_id,
                    proration: ProrationBehavior::AlwaysInvoice,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = %account.id,
                    subscription_ref = %existing.id,
                    plan = %plan,
                    error = %e,
                    "Failed to modify subscription"
                );
                SubscriptionError::from(e)
            })?;

        let previous = account.current_plan();
        account.change_plan(plan);
        uow.save(account).await.map_err(|e| {
            tracing::error!(
                account_id = %account.id,
                subscription_ref = %existing.id,
                error = %e,
                "Subscription modified remotely but not recorded locally"
            );
            SubscriptionError::partial(account.id, existing.id.to_string(), e.to_string())
        })?;

        tracing::info!(
            account_id = %account.id,
            subscription_ref = %existing.id,
            from = %previous,
            to = %plan,
            "Subscription plan changed"
        );
        Ok(updated)
    }
}
