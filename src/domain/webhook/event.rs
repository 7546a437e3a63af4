//! Provider event model.
//!
//! A verified webhook is reduced to a `ProviderEvent`: the event id used for
//! deduplication, the kind of change and a typed view of the object it
//! carries. Only fields the reconciler acts on are captured; everything else
//! in the provider's payload is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::foundation::{CustomerRef, EventId, SubscriptionRef};
use crate::domain::account::RemoteStatus;

use super::WebhookError;

/// Kind of provider event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentFailed,
    /// Any event type this system does not act on.
    Other(String),
}

impl ProviderEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => ProviderEventKind::SubscriptionCreated,
            "customer.subscription.updated" => ProviderEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => ProviderEventKind::SubscriptionDeleted,
            "invoice.paid" => ProviderEventKind::InvoicePaid,
            "invoice.payment_failed" => ProviderEventKind::InvoicePaymentFailed,
            other => ProviderEventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderEventKind::SubscriptionCreated => "customer.subscription.created",
            ProviderEventKind::SubscriptionUpdated => "customer.subscription.updated",
            ProviderEventKind::SubscriptionDeleted => "customer.subscription.deleted",
            ProviderEventKind::InvoicePaid => "invoice.paid",
            ProviderEventKind::InvoicePaymentFailed => "invoice.payment_failed",
            ProviderEventKind::Other(event_type) => event_type,
        }
    }

    /// Returns true if the reconciler acts on this kind of event.
    pub fn is_handled(&self) -> bool {
        !matches!(self, ProviderEventKind::Other(_))
    }
}

impl std::fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription object carried by `customer.subscription.*` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPayload {
    pub subscription_ref: SubscriptionRef,
    pub customer_ref: CustomerRef,
    pub status: RemoteStatus,
    /// Price of the first subscription item, if present.
    pub price_id: Option<String>,
}

/// Invoice object carried by `invoice.*` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePayload {
    pub invoice_id: Option<String>,
    pub customer_ref: CustomerRef,
    /// Amount paid in cents; a missing amount counts as zero.
    pub amount_paid: u64,
}

/// Typed event data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEventData {
    Subscription(SubscriptionPayload),
    Invoice(InvoicePayload),
    Unhandled,
}

/// A verified provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: EventId,
    pub kind: ProviderEventKind,
    pub data: ProviderEventData,
    /// Unix timestamp at which the provider created the event.
    pub created: i64,
    pub livemode: bool,
}

impl ProviderEvent {
    /// Builds a typed event from the provider's event type and data object.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` or `InvalidPayload` when a handled event's
    /// object lacks the fields the reconciler needs. Unhandled event types
    /// never fail here.
    pub fn parse(
        id: &str,
        event_type: &str,
        object: &Value,
        created: i64,
        livemode: bool,
    ) -> Result<Self, WebhookError> {
        let id = EventId::new(id).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let kind = ProviderEventKind::from_type(event_type);

        let data = match kind {
            ProviderEventKind::SubscriptionCreated
            | ProviderEventKind::SubscriptionUpdated
            | ProviderEventKind::SubscriptionDeleted => {
                ProviderEventData::Subscription(parse_subscription(object)?)
            }
            ProviderEventKind::InvoicePaid | ProviderEventKind::InvoicePaymentFailed => {
                ProviderEventData::Invoice(parse_invoice(object)?)
            }
            ProviderEventKind::Other(_) => ProviderEventData::Unhandled,
        };

        Ok(Self {
            id,
            kind,
            data,
            created,
            livemode,
        })
    }

    /// Customer the event concerns, if the event is one we handle.
    pub fn customer_ref(&self) -> Option<&CustomerRef> {
        match &self.data {
            ProviderEventData::Subscription(sub) => Some(&sub.customer_ref),
            ProviderEventData::Invoice(invoice) => Some(&invoice.customer_ref),
            ProviderEventData::Unhandled => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Wire shapes
// ══════════════════════════════════════════════════════════════

/// A field the provider may send either as an id or as an expanded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSubscription {
    id: Option<String>,
    customer: Option<Expandable>,
    status: Option<String>,
    items: Option<WireList<WireSubscriptionItem>>,
}

#[derive(Debug, Deserialize)]
struct WireList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WireSubscriptionItem {
    price: Option<Expandable>,
}

#[derive(Debug, Deserialize)]
struct WireInvoice {
    id: Option<String>,
    customer: Option<Expandable>,
    amount_paid: Option<i64>,
}

fn parse_customer(customer: Option<Expandable>) -> Result<CustomerRef, WebhookError> {
    let raw = customer
        .map(Expandable::into_id)
        .ok_or(WebhookError::MissingField("customer"))?;
    CustomerRef::new(raw).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

fn parse_subscription(object: &Value) -> Result<SubscriptionPayload, WebhookError> {
    let wire: WireSubscription = decode(object)?;

    let raw_id = wire.id.ok_or(WebhookError::MissingField("id"))?;
    let subscription_ref =
        SubscriptionRef::new(raw_id).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let customer_ref = parse_customer(wire.customer)?;

    let status = wire
        .status
        .as_deref()
        .map(RemoteStatus::from_provider)
        .unwrap_or(RemoteStatus::Unknown);

    let price_id = wire
        .items
        .and_then(|items| items.data.into_iter().next())
        .and_then(|item| item.price)
        .map(Expandable::into_id);

    Ok(SubscriptionPayload {
        subscription_ref,
        customer_ref,
        status,
        price_id,
    })
}

fn parse_invoice(object: &Value) -> Result<InvoicePayload, WebhookError> {
    let wire: WireInvoice = decode(object)?;

    let customer_ref = parse_customer(wire.customer)?;
    let amount = wire.amount_paid.unwrap_or(0);
    let amount_paid = u64::try_from(amount).map_err(|_| {
        WebhookError::InvalidPayload(format!("amount_paid must not be negative, got {}", amount))
    })?;

    Ok(InvoicePayload {
        invoice_id: wire.id,
        customer_ref,
        amount_paid,
    })
}

/// Deserializes a borrowed JSON value, mapping failures to `InvalidPayload`.
fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, WebhookError> {
    T::deserialize(value).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}
