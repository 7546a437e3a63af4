//! Subscription-specific error types.
//!
//! Errors surfaced by plan changes. Each variant is distinguishable so callers
//! can tell a retry-worthy provider hiccup from a configuration problem.
//!
//! # Retry Semantics
//!
//! | Error | Retryable |
//! |-------|-----------|
//! | GatewayUnconfigured | no |
//! | PriceNotConfigured | no |
//! | RemoteNotFound | no |
//! | TransientGateway | yes |
//! | GatewayRejected | no |
//! | ValidationFailed | no |
//! | AccountNotFound | no |
//! | ConcurrentModification | yes |
//! | PartialApplication | no, needs reconciliation |
//! | Infrastructure | yes |

use crate::domain::foundation::{AccountId, DomainError, ErrorCode};

use super::PaidPlan;

/// Errors from the plan change workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The payment provider credentials are missing.
    GatewayUnconfigured,

    /// No provider price is configured for the requested plan.
    PriceNotConfigured(PaidPlan),

    /// A provider resource the workflow depended on does not exist.
    RemoteNotFound { resource: String },

    /// Network, rate-limit or authentication hiccup at the provider.
    TransientGateway(String),

    /// The provider refused the request (declined card, invalid request).
    GatewayRejected(String),

    /// Input failed validation before any side effect.
    ValidationFailed { field: String, message: String },

    /// The account does not exist locally.
    AccountNotFound(AccountId),

    /// The account changed between reading and locking it.
    ConcurrentModification(AccountId),

    /// The provider accepted a change but the local write failed.
    PartialApplication {
        account_id: AccountId,
        remote_ref: String,
        reason: String,
    },

    /// Local store failure.
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn price_not_configured(plan: PaidPlan) -> Self {
        SubscriptionError::PriceNotConfigured(plan)
    }

    pub fn remote_not_found(resource: impl Into<String>) -> Self {
        SubscriptionError::RemoteNotFound {
            resource: resource.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        SubscriptionError::TransientGateway(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        SubscriptionError::GatewayRejected(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn partial(
        account_id: AccountId,
        remote_ref: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SubscriptionError::PartialApplication {
            account_id,
            remote_ref: remote_ref.into(),
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::GatewayUnconfigured => ErrorCode::GatewayUnconfigured,
            SubscriptionError::PriceNotConfigured(_) => ErrorCode::PriceNotConfigured,
            SubscriptionError::RemoteNotFound { .. } => ErrorCode::RemoteNotFound,
            SubscriptionError::TransientGateway(_) | SubscriptionError::GatewayRejected(_) => {
                ErrorCode::PaymentProviderError
            }
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            SubscriptionError::PartialApplication { .. } => ErrorCode::PartialApplication,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing message phrased in terms of plans.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::GatewayUnconfigured => {
                "Billing is not available right now".to_string()
            }
            SubscriptionError::PriceNotConfigured(plan) => {
                format!("The {} plan is not available right now", plan)
            }
            SubscriptionError::RemoteNotFound { resource } => {
                format!("The billing {} could not be found", resource)
            }
            SubscriptionError::TransientGateway(_) => {
                "The payment provider could not be reached, please try again".to_string()
            }
            SubscriptionError::GatewayRejected(reason) => {
                format!("The payment provider rejected the change: {}", reason)
            }
            SubscriptionError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            SubscriptionError::AccountNotFound(id) => format!("Account not found: {}", id),
            SubscriptionError::ConcurrentModification(_) => {
                "Your subscription changed while we were updating it, please try again"
                    .to_string()
            }
            SubscriptionError::PartialApplication { .. } => {
                "Your plan change was accepted but is still being recorded".to_string()
            }
            SubscriptionError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::TransientGateway(_)
                | SubscriptionError::ConcurrentModification(_)
                | SubscriptionError::Infrastructure(_)
        )
    }

    /// Returns true if local state now lags the provider and must be reconciled.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, SubscriptionError::PartialApplication { .. })
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionError::TransientGateway(detail) => {
                write!(f, "{} ({})", self.message(), detail)
            }
            SubscriptionError::PartialApplication {
                account_id,
                remote_ref,
                reason,
            } => write!(
                f,
                "{} (account {}, remote {}: {})",
                self.message(),
                account_id,
                remote_ref,
                reason
            ),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => {
                SubscriptionError::ValidationFailed {
                    field: err
                        .details
                        .get("field")
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string()),
                    message: err.message,
                }
            }
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
