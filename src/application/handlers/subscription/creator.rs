//! SubscriptionCreator - Starts a brand-new subscription for an account.

use std::sync::Arc;

use crate::domain::account::{Account, PaidPlan, PlanCatalog, SubscriptionError};
use crate::ports::{
    AccountUnitOfWork, CreateCustomerRequest, CreateSubscriptionRequest, PaymentGateway,
    RemoteSubscription,
};

/// Creates the provider customer (when missing) and a subscription waiting
/// for payment confirmation.
///
/// Works inside the caller's unit of work on an already-locked account.
pub struct SubscriptionCreator {
    gateway: Arc<dyn PaymentGateway>,
    catalog: PlanCatalog,
}

impl SubscriptionCreator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, catalog: PlanCatalog) -> Self {
        Self { gateway, catalog }
    }

    /// Creates a subscription to `plan`.
    ///
    /// The account becomes active only if the provider reports the new
    /// subscription as active or trialing; otherwise a later webhook flips
    /// it once payment clears.
    ///
    /// # Errors
    ///
    /// - `PriceNotConfigured` before any side effect
    /// - provider failures from customer or subscription creation
    /// - `PartialApplication` if the subscription exists remotely but could
    ///   not be staged locally
    pub async fn execute(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account: &mut Account,
        plan: PaidPlan,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        // 1. Resolve price before touching the provider
        let price_id = self
            .catalog
            .price_for(plan)
            .ok_or(SubscriptionError::PriceNotConfigured(plan))?
            .to_string();

        // 2. Link a provider customer if the account has none
        let customer_ref = match account.customer_ref() {
            Some(existing) => existing.clone(),
            None => {
                let customer = self
                    .gateway
                    .create_customer(CreateCustomerRequest {
                        account_id: account.id,
                        email: account.email.clone(),
                        idempotency_key: Some(format!("customer-{}", account.id)),
                    })
                    .await
                    .map_err(|e| {
                        tracing::error!(account_id = %account.id, error = %e, "Failed to create customer");
                        SubscriptionError::from(e)
                    })?;

                account.assign_customer_ref(customer.clone())?;
                uow.save(account).await?;
                tracing::info!(account_id = %account.id, customer_ref = %customer, "Customer linked");
                customer
            }
        };

        // 3. Create the subscription
        let remote = self
            .gateway
            .create_subscription(CreateSubscriptionRequest::pending_payment(
                customer_ref.clone(),
                price_id,
            ))
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = %account.id,
                    customer_ref = %customer_ref,
                    plan = %plan,
                    error = %e,
                    "Failed to create subscription"
                );
                SubscriptionError::from(e)
            })?;

        // 4. Record it locally
        account.attach_subscription(remote.id.clone(), plan, &remote.status);
        uow.save(account).await.map_err(|e| {
            tracing::error!(
                account_id = %account.id,
                subscription_ref = %remote.id,
                error = %e,
                "Subscription created remotely but not recorded locally"
            );
            SubscriptionError::partial(account.id, remote.id.to_string(), e.to_string())
        })?;

        tracing::info!(
            account_id = %account.id,
            subscription_ref = %remote.id,
            plan = %plan,
            remote_status = %remote.status,
            "Subscription created"
        );
        Ok(remote)
    }
}
