//! Synthetic Stripe events.
//!
//! Builds event envelopes shaped like real Stripe deliveries so operators and
//! tests can push an event through the same verification and reconciliation
//! path as production traffic.

use std::str::FromStr;

use secrecy::SecretString;
use serde_json::{json, Value};

use crate::domain::foundation::{CustomerRef, SubscriptionRef, ValidationError};
use crate::domain::webhook::WebhookError;

use super::webhook_verifier::sign_payload;

/// Default invoice amount in cents.
pub const DEFAULT_INVOICE_AMOUNT: u64 = 1000;

/// Event kinds an operator can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentFailed,
}

impl SimulatedEventKind {
    pub const ALL: [SimulatedEventKind; 5] = [
        SimulatedEventKind::SubscriptionCreated,
        SimulatedEventKind::SubscriptionUpdated,
        SimulatedEventKind::SubscriptionDeleted,
        SimulatedEventKind::InvoicePaid,
        SimulatedEventKind::InvoicePaymentFailed,
    ];

    /// Stripe event type string.
    pub fn event_type(&self) -> &'static str {
        match self {
            SimulatedEventKind::SubscriptionCreated => "customer.subscription.created",
            SimulatedEventKind::SubscriptionUpdated => "customer.subscription.updated",
            SimulatedEventKind::SubscriptionDeleted => "customer.subscription.deleted",
            SimulatedEventKind::InvoicePaid => "invoice.paid",
            SimulatedEventKind::InvoicePaymentFailed => "invoice.payment_failed",
        }
    }

    fn is_invoice(&self) -> bool {
        matches!(
            self,
            SimulatedEventKind::InvoicePaid | SimulatedEventKind::InvoicePaymentFailed
        )
    }
}

impl FromStr for SimulatedEventKind {
    type Err = ValidationError;

    /// Accepts the full Stripe type or the short forms `created`, `updated`,
    /// `deleted`, `paid` and `failed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "customer.subscription.created" | "created" => Ok(Self::SubscriptionCreated),
            "customer.subscription.updated" | "updated" => Ok(Self::SubscriptionUpdated),
            "customer.subscription.deleted" | "deleted" => Ok(Self::SubscriptionDeleted),
            "invoice.paid" | "paid" => Ok(Self::InvoicePaid),
            "invoice.payment_failed" | "failed" => Ok(Self::InvoicePaymentFailed),
            other => Err(ValidationError::invalid_format(
                "event_type",
                format!("unsupported event type '{}'", other),
            )),
        }
    }
}

/// Parameters of a simulated event.
#[derive(Debug, Clone)]
pub struct SimulatedEvent {
    pub kind: SimulatedEventKind,
    pub customer_ref: CustomerRef,
    pub subscription_ref: Option<SubscriptionRef>,
    pub status: String,
    pub price_id: Option<String>,
    pub amount_paid: u64,
    pub event_id: Option<String>,
}

impl SimulatedEvent {
    pub fn new(kind: SimulatedEventKind, customer_ref: CustomerRef) -> Self {
        Self {
            kind,
            customer_ref,
            subscription_ref: None,
            status: "active".to_string(),
            price_id: None,
            amount_paid: DEFAULT_INVOICE_AMOUNT,
            event_id: None,
        }
    }

    pub fn with_subscription(mut self, subscription_ref: SubscriptionRef) -> Self {
        self.subscription_ref = Some(subscription_ref);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_price(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    pub fn with_amount(mut self, amount_paid: u64) -> Self {
        self.amount_paid = amount_paid;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Event ID, generated when not set.
    pub fn event_id(&self) -> String {
        self.event_id
            .clone()
            .unwrap_or_else(|| format!("evt_sim_{}", uuid::Uuid::new_v4().simple()))
    }

    /// The `data.object` of the event.
    pub fn object(&self) -> Value {
        if self.kind.is_invoice() {
            let amount = match self.kind {
                SimulatedEventKind::InvoicePaid => self.amount_paid,
                _ => 0,
            };
            let mut invoice = json!({
                "id": format!("in_sim_{}", uuid::Uuid::new_v4().simple()),
                "object": "invoice",
                "customer": self.customer_ref.as_str(),
                "amount_paid": amount,
            });
            if let Some(sub) = &self.subscription_ref {
                invoice["subscription"] = json!(sub.as_str());
            }
            return invoice;
        }

        let subscription_id = self
            .subscription_ref
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| format!("sub_sim_{}", uuid::Uuid::new_v4().simple()));

        let items = match &self.price_id {
            Some(price) => json!({
                "object": "list",
                "data": [{ "id": "si_sim", "price": { "id": price } }],
            }),
            None => json!({ "object": "list", "data": [] }),
        };

        json!({
            "id": subscription_id,
            "object": "subscription",
            "customer": self.customer_ref.as_str(),
            "status": self.status,
            "items": items,
        })
    }

    /// Full event envelope with the given event ID.
    pub fn envelope(&self, event_id: &str, created: i64) -> Value {
        json!({
            "id": event_id,
            "object": "event",
            "type": self.kind.event_type(),
            "created": created,
            "livemode": false,
            "data": { "object": self.object() },
        })
    }

    /// Serialized envelope plus a valid `Stripe-Signature` header for it.
    pub fn signed(
        &self,
        secret: &SecretString,
        timestamp: i64,
    ) -> Result<(Vec<u8>, String), WebhookError> {
        let payload = serde_json::to_vec(&self.envelope(&self.event_id(), timestamp))
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let header = sign_payload(secret, timestamp, &payload)?;
        Ok((payload, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::{ProviderEvent, ProviderEventData, ProviderEventKind};

    fn customer() -> CustomerRef {
        CustomerRef::new("cus_sim").unwrap()
    }

    fn parse(sim: &SimulatedEvent) -> ProviderEvent {
        ProviderEvent::parse(
            "evt_sim",
            sim.kind.event_type(),
            &sim.object(),
            0,
            false,
        )
        .unwrap()
    }

    #[test]
    fn short_names_parse() {
        assert_eq!(
            "paid".parse::<SimulatedEventKind>().unwrap(),
            SimulatedEventKind::InvoicePaid
        );
        assert_eq!(
            "customer.subscription.deleted"
                .parse::<SimulatedEventKind>()
                .unwrap(),
            SimulatedEventKind::SubscriptionDeleted
        );
        assert!("charge.refunded".parse::<SimulatedEventKind>().is_err());
    }

    #[test]
    fn every_kind_parses_as_handled_event() {
        for kind in SimulatedEventKind::ALL {
            let sim = SimulatedEvent::new(kind, customer()).with_price("price_basic");
            let event = parse(&sim);
            assert!(event.kind.is_handled(), "{:?}", kind);
            assert_eq!(event.customer_ref(), Some(&customer()));
        }
    }

    #[test]
    fn invoice_paid_carries_default_amount() {
        let sim = SimulatedEvent::new(SimulatedEventKind::InvoicePaid, customer());
        match parse(&sim).data {
            ProviderEventData::Invoice(invoice) => assert_eq!(invoice.amount_paid, 1000),
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn subscription_event_carries_price_and_status() {
        let sim = SimulatedEvent::new(SimulatedEventKind::SubscriptionUpdated, customer())
            .with_subscription(SubscriptionRef::new("sub_7").unwrap())
            .with_status("past_due")
            .with_price("price_pro");

        let event = parse(&sim);
        assert_eq!(event.kind, ProviderEventKind::SubscriptionUpdated);
        match event.data {
            ProviderEventData::Subscription(sub) => {
                assert_eq!(sub.subscription_ref.as_str(), "sub_7");
                assert_eq!(sub.price_id.as_deref(), Some("price_pro"));
                assert!(!sub.status.grants_access());
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn generated_event_ids_are_unique() {
        let sim = SimulatedEvent::new(SimulatedEventKind::InvoicePaid, customer());
        assert_ne!(sim.event_id(), sim.event_id());
        assert_eq!(sim.clone().with_event_id("evt_fixed").event_id(), "evt_fixed");
    }
}
