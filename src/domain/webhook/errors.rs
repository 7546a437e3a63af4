//! Webhook error types for provider webhook handling.
//!
//! Defines all error conditions that can occur while verifying and
//! reconciling provider notifications, with transport status mapping and
//! retryability semantics.

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors that occur during webhook processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Webhook timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Payload or signature header could not be parsed.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Required field missing from the event object.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Event livemode does not match the configured environment.
    #[error("Livemode mismatch: expected {expected}, got {actual}")]
    LivemodeMismatch { expected: bool, actual: bool },

    /// No webhook secret is configured, so nothing can be verified.
    #[error("Webhook secret not configured")]
    NotConfigured,

    /// The event would break an account invariant; redelivery cannot help.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_) | WebhookError::NotConfigured)
    }

    /// Maps the error to the status code returned to the provider.
    ///
    /// - 4xx: rejected, the provider will not retry
    /// - 5xx: server error, the provider retries with backoff
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp
            | WebhookError::InvalidPayload(_)
            | WebhookError::MissingField(_)
            | WebhookError::LivemodeMismatch { .. } => StatusCode::BAD_REQUEST,

            WebhookError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,

            WebhookError::NotConfigured | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::InvariantViolation => WebhookError::Rejected(err.to_string()),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Error Display Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn invalid_signature_displays_correctly() {
        let err = WebhookError::InvalidSignature;
        assert_eq!(format!("{}", err), "Invalid signature");
    }

    #[test]
    fn invalid_payload_displays_message() {
        let err = WebhookError::InvalidPayload("invalid JSON".to_string());
        assert_eq!(format!("{}", err), "Invalid payload: invalid JSON");
    }

    #[test]
    fn missing_field_displays_field_name() {
        let err = WebhookError::MissingField("customer");
        assert_eq!(format!("{}", err), "Missing field: customer");
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verification_failures_are_bad_requests() {
        assert_eq!(WebhookError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::TimestampOutOfRange.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::InvalidPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn database_errors_ask_for_retry() {
        let err = WebhookError::Database("connection reset".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_retryable());
    }

    #[test]
    fn bad_requests_are_not_retryable() {
        assert!(!WebhookError::InvalidSignature.is_retryable());
        assert!(!WebhookError::MissingField("id").is_retryable());
    }

    #[test]
    fn domain_error_converts_to_database_error() {
        let err: WebhookError = DomainError::new(ErrorCode::DatabaseError, "down").into();
        assert!(matches!(err, WebhookError::Database(_)));
    }

    #[test]
    fn invariant_violation_converts_to_rejection() {
        let err: WebhookError =
            DomainError::new(ErrorCode::InvariantViolation, "Lifetime value would overflow").into();
        assert!(matches!(err, WebhookError::Rejected(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
