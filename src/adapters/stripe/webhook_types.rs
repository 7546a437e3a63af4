//! Stripe-specific wire types.
//!
//! These types represent Stripe objects as they arrive in webhook payloads
//! and API responses. Only the fields this service reads are declared;
//! Stripe's additional fields are ignored on deserialization.

use serde::{Deserialize, Serialize};

use crate::domain::account::RemoteStatus;
use crate::domain::foundation::{CustomerRef, SubscriptionRef};
use crate::ports::{PaymentError, RemoteSubscription};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
    /// A component is not of the form key=value.
    MalformedComponent,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
            Self::MalformedComponent => write!(f, "Malformed signature component"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header components.
///
/// The header format is `t=timestamp,v1=signature[,v1=signature...]`.
/// Several v1 entries appear while a signing secret is being rolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe signed the event.
    pub timestamp: i64,

    /// v1 signatures (HMAC-SHA256, hex-decoded).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MalformedComponent)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex_decode(value.trim())
                            .ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                _ => {
                    // v0 and unknown schemes are ignored
                }
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16).ok()?;
        bytes.push(byte);
    }
    Some(bytes)
}

/// Encode bytes to hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "invoice.paid").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    #[serde(default)]
    pub created: i64,

    /// Event payload containing the affected object.
    pub data: StripeEventData,

    /// Whether this is a live or test event.
    #[serde(default)]
    pub livemode: bool,

    /// Stripe API version used for this event.
    pub api_version: Option<String>,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe API Objects
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Customer object (create response).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    /// Customer email address.
    pub email: Option<String>,
}

/// Stripe Subscription object (create, update, retrieve and delete responses).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer ID owning this subscription. Expanded objects are not requested.
    pub customer: Option<String>,

    /// Subscription status.
    pub status: String,

    /// Subscription items (price/quantity pairs).
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscriptionItems {
    #[serde(default)]
    pub data: Vec<StripeSubscriptionItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    /// Item ID (si_...).
    pub id: String,

    /// Price object.
    pub price: StripePrice,
}

/// Stripe Price object (embedded in subscription items).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    /// Price ID.
    pub id: String,
}

impl StripeSubscription {
    /// Converts to the gateway's view of a subscription.
    pub fn into_remote(self) -> Result<RemoteSubscription, PaymentError> {
        let id = SubscriptionRef::new(self.id)
            .map_err(|e| PaymentError::provider(format!("unexpected subscription id: {}", e)))?;
        let customer_ref = self.customer.and_then(|c| CustomerRef::new(c).ok());
        let first_item = self.items.data.into_iter().next();

        Ok(RemoteSubscription {
            id,
            customer_ref,
            status: RemoteStatus::from_provider(&self.status),
            item_id: first_item.as_ref().map(|item| item.id.clone()),
            price_id: first_item.map(|item| item.price.id),
        })
    }
}

/// Error body returned by the Stripe API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeApiError,
}

/// Stripe API error details.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    /// Error category (api_error, card_error, invalid_request_error, ...).
    #[serde(rename = "type")]
    pub error_type: Option<String>,

    /// Machine-readable code, e.g. "resource_missing".
    pub code: Option<String>,

    /// Human-readable message.
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // SignatureHeader Parsing Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_v1_only() {
        let header = SignatureHeader::parse("t=1704067200,v1=abcdef").unwrap();
        assert_eq!(header.timestamp, 1704067200);
        assert_eq!(header.v1_signatures, vec![vec![0xab, 0xcd, 0xef]]);
    }

    #[test]
    fn parse_header_collects_every_v1() {
        let header = SignatureHeader::parse("t=1,v1=aa,v1=bb").unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_ignores_v0_and_unknown_fields() {
        let header = SignatureHeader::parse("t=1,v0=zz,v1=aa,foo=bar").unwrap();
        assert_eq!(header.v1_signatures, vec![vec![0xaa]]);
    }

    #[test]
    fn parse_header_missing_timestamp_fails() {
        assert_eq!(
            SignatureHeader::parse("v1=abcdef").unwrap_err(),
            SignatureParseError::MissingTimestamp
        );
    }

    #[test]
    fn parse_header_missing_v1_fails() {
        assert_eq!(
            SignatureHeader::parse("t=1704067200").unwrap_err(),
            SignatureParseError::MissingV1Signature
        );
    }

    #[test]
    fn parse_header_invalid_timestamp_fails() {
        assert_eq!(
            SignatureHeader::parse("t=soon,v1=aa").unwrap_err(),
            SignatureParseError::InvalidTimestamp
        );
    }

    #[test]
    fn parse_header_invalid_hex_fails() {
        assert_eq!(
            SignatureHeader::parse("t=1,v1=xyz1").unwrap_err(),
            SignatureParseError::InvalidSignatureFormat
        );
    }

    #[test]
    fn parse_header_empty_fails() {
        assert_eq!(
            SignatureHeader::parse("").unwrap_err(),
            SignatureParseError::MissingHeader
        );
    }

    #[test]
    fn hex_round_trip() {
        let bytes = vec![0x00, 0x7f, 0xff];
        assert_eq!(hex_decode(&hex_encode(&bytes)), Some(bytes));
    }

    // ══════════════════════════════════════════════════════════════
    // Object Parsing Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn subscription_converts_first_item() {
        let json = r#"{
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_1",
            "status": "incomplete",
            "items": {
                "object": "list",
                "data": [{ "id": "si_1", "price": { "id": "price_basic", "currency": "usd" } }]
            }
        }"#;
        let sub: StripeSubscription = serde_json::from_str(json).unwrap();
        let remote = sub.into_remote().unwrap();

        assert_eq!(remote.id.as_str(), "sub_1");
        assert_eq!(remote.status, RemoteStatus::Incomplete);
        assert_eq!(remote.item_id.as_deref(), Some("si_1"));
        assert_eq!(remote.price_id.as_deref(), Some("price_basic"));
    }

    #[test]
    fn event_envelope_parses() {
        let json = r#"{
            "id": "evt_1",
            "type": "invoice.paid",
            "created": 1704067200,
            "livemode": false,
            "data": { "object": { "customer": "cus_1", "amount_paid": 1000 } }
        }"#;
        let event: StripeWebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "invoice.paid");
        assert_eq!(event.data.object["amount_paid"], 1000);
    }

    #[test]
    fn error_envelope_parses() {
        let json = r#"{"error":{"type":"invalid_request_error","code":"resource_missing","message":"No such subscription"}}"#;
        let envelope: StripeErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.error.code.as_deref(), Some("resource_missing"));
    }
}
