//! WebhookReconciler - Applies verified provider events to local accounts.
//!
//! Each event is handled in one unit of work that locks the account linked
//! to the event's customer, records the event in the processed-event ledger
//! and applies the change. A redelivered event finds its ledger entry and is
//! acknowledged without touching the account again.

use chrono::Utc;
use serde_json::Value;

use std::sync::Arc;

use crate::domain::account::{Account, PaidPlan, PlanCatalog};
use crate::domain::foundation::{AccountId, CustomerRef};
use crate::domain::webhook::{
    InvoicePayload, ProviderEvent, ProviderEventData, ProviderEventKind, SubscriptionPayload,
    WebhookError,
};
use crate::ports::{AccountStore, AccountUnitOfWork, ProcessedEventRecord, SaveResult};

/// What happened to a dispatched event. Every outcome is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The account was updated.
    Applied { account_id: AccountId },
    /// Recorded for the account, but no state changed.
    Logged { account_id: AccountId },
    /// No local account is linked to the event's customer.
    AccountNotLinked { customer_ref: CustomerRef },
    /// The event was processed before.
    AlreadyProcessed,
    /// The event type is not acted upon.
    Ignored,
}

/// Reconciles provider events into the account store.
pub struct WebhookReconciler {
    store: Arc<dyn AccountStore>,
    catalog: PlanCatalog,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn AccountStore>, catalog: PlanCatalog) -> Self {
        Self { store, catalog }
    }

    /// Dispatches an event from its type and data object, as handed over by
    /// a transport that has already verified and parsed the envelope.
    pub async fn dispatch_parts(
        &self,
        event_id: &str,
        event_type: &str,
        object: &Value,
    ) -> Result<WebhookOutcome, WebhookError> {
        let event = ProviderEvent::parse(event_id, event_type, object, Utc::now().timestamp(), false)?;
        self.dispatch(&event).await
    }

    /// Applies a verified event.
    ///
    /// # Errors
    ///
    /// Store failures abort the unit of work and return
    /// `WebhookError::Database`, which asks the provider to redeliver.
    /// Changes that would break an account invariant, such as a lifetime
    /// value past the storable range, return `WebhookError::Rejected`.
    pub async fn dispatch(&self, event: &ProviderEvent) -> Result<WebhookOutcome, WebhookError> {
        let customer_ref = match event.customer_ref() {
            Some(customer_ref) if event.kind.is_handled() => customer_ref.clone(),
            _ => {
                tracing::debug!(event_id = %event.id, event_type = %event.kind, "Ignoring unhandled event");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        // Redeliveries of committed events skip the row lock; the ledger
        // insert below still decides races between in-flight deliveries.
        if self.store.find_processed_event(&event.id).await?.is_some() {
            tracing::info!(event_id = %event.id, event_type = %event.kind, "Event already processed, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let mut uow = self.store.begin().await?;
        match self.apply(uow.as_mut(), event, &customer_ref).await {
            Ok(Applied::Commit(outcome)) => {
                uow.commit().await.map_err(|e| {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to commit webhook changes");
                    WebhookError::from(e)
                })?;
                Ok(outcome)
            }
            Ok(Applied::Discard(outcome)) => {
                rollback(uow, event).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.kind,
                    error = %e,
                    "Webhook processing failed"
                );
                rollback(uow, event).await;
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        event: &ProviderEvent,
        customer_ref: &CustomerRef,
    ) -> Result<Applied, WebhookError> {
        // 1. Lock the linked account
        let Some(mut account) = uow.lock_by_customer_ref(customer_ref).await? else {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.kind,
                customer_ref = %customer_ref,
                "No account linked to customer, acknowledging event"
            );
            return Ok(Applied::Discard(WebhookOutcome::AccountNotLinked {
                customer_ref: customer_ref.clone(),
            }));
        };

        // 2. Claim the event in the ledger
        let record = match event.kind {
            ProviderEventKind::InvoicePaymentFailed => {
                ProcessedEventRecord::logged(event.id.clone(), event.kind.as_str(), account.id)
            }
            _ => ProcessedEventRecord::applied(event.id.clone(), event.kind.as_str(), account.id),
        };
        if uow.record_processed_event(record).await? == SaveResult::AlreadyExists {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.kind,
                account_id = %account.id,
                "Event already processed, skipping"
            );
            return Ok(Applied::Discard(WebhookOutcome::AlreadyProcessed));
        }

        // 3. Apply the change
        let outcome = match (&event.kind, &event.data) {
            (ProviderEventKind::SubscriptionCreated, ProviderEventData::Subscription(sub)) => {
                self.subscription_created(&mut account, sub)
            }
            (ProviderEventKind::SubscriptionUpdated, ProviderEventData::Subscription(sub)) => {
                self.subscription_updated(&mut account, sub)
            }
            (ProviderEventKind::SubscriptionDeleted, ProviderEventData::Subscription(sub)) => {
                account.reset_subscription();
                tracing::info!(
                    account_id = %account.id,
                    subscription_ref = %sub.subscription_ref,
                    "Subscription deleted at the provider"
                );
                WebhookOutcome::Applied { account_id: account.id }
            }
            (ProviderEventKind::InvoicePaid, ProviderEventData::Invoice(invoice)) => {
                self.invoice_paid(uow, &mut account, invoice).await?
            }
            (ProviderEventKind::InvoicePaymentFailed, ProviderEventData::Invoice(invoice)) => {
                tracing::warn!(
                    account_id = %account.id,
                    invoice_id = ?invoice.invoice_id,
                    "Invoice payment failed"
                );
                return Ok(Applied::Commit(WebhookOutcome::Logged { account_id: account.id }));
            }
            _ => {
                return Err(WebhookError::InvalidPayload(format!(
                    "unexpected data for event type {}",
                    event.kind
                )))
            }
        };

        uow.save(&account).await?;
        Ok(Applied::Commit(outcome))
    }

    fn subscription_created(&self, account: &mut Account, sub: &SubscriptionPayload) -> WebhookOutcome {
        let plan = self.plan_for(sub);
        let active = account.apply_subscription_created(sub.subscription_ref.clone(), plan);
        if !active {
            tracing::warn!(
                account_id = %account.id,
                subscription_ref = %sub.subscription_ref,
                price_id = ?sub.price_id,
                "Subscription created with unrecognized price, activation withheld"
            );
        }
        tracing::info!(
            account_id = %account.id,
            subscription_ref = %sub.subscription_ref,
            plan = %account.current_plan(),
            "Subscription created at the provider"
        );
        WebhookOutcome::Applied { account_id: account.id }
    }

    fn subscription_updated(&self, account: &mut Account, sub: &SubscriptionPayload) -> WebhookOutcome {
        let plan = self.plan_for(sub);
        account.apply_subscription_updated(sub.subscription_ref.clone(), &sub.status, plan);
        tracing::info!(
            account_id = %account.id,
            subscription_ref = %sub.subscription_ref,
            remote_status = %sub.status,
            status = %account.subscription_status(),
            plan = %account.current_plan(),
            "Subscription updated at the provider"
        );
        WebhookOutcome::Applied { account_id: account.id }
    }

    async fn invoice_paid(
        &self,
        uow: &mut dyn AccountUnitOfWork,
        account: &mut Account,
        invoice: &InvoicePayload,
    ) -> Result<WebhookOutcome, WebhookError> {
        let total = uow
            .increment_amount_paid(&account.id, invoice.amount_paid)
            .await?;
        account.sync_amount_paid(total);

        if !account.mark_paid() {
            tracing::warn!(
                account_id = %account.id,
                "Invoice paid for an account without a plan, not activating"
            );
        }
        tracing::info!(
            account_id = %account.id,
            amount_paid = invoice.amount_paid,
            total_amount_paid = total,
            "Invoice paid"
        );
        Ok(WebhookOutcome::Applied { account_id: account.id })
    }

    fn plan_for(&self, sub: &SubscriptionPayload) -> Option<PaidPlan> {
        sub.price_id
            .as_deref()
            .and_then(|price| self.catalog.plan_for_price(price))
    }
}

/// Whether the unit of work should be kept.
enum Applied {
    Commit(WebhookOutcome),
    Discard(WebhookOutcome),
}

async fn rollback(uow: Box<dyn AccountUnitOfWork>, event: &ProviderEvent) {
    if let Err(e) = uow.rollback().await {
        tracing::error!(event_id = %event.id, error = %e, "Rollback failed");
    }
}
