//! Local and remote subscription status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Local subscription status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    /// Local status implied by a provider-side status.
    pub fn from_remote(remote: RemoteStatus) -> Self {
        if remote.grants_access() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Inactive
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Subscription status as reported by the payment provider.
///
/// Unrecognized values are kept as `Unknown` so that a new provider status
/// never fails event parsing; they simply do not grant access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Active,
    Trialing,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Unpaid,
    Canceled,
    Paused,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    /// Maps the provider's status string.
    pub fn from_provider(value: &str) -> Self {
        match value {
            "active" => RemoteStatus::Active,
            "trialing" => RemoteStatus::Trialing,
            "incomplete" => RemoteStatus::Incomplete,
            "incomplete_expired" => RemoteStatus::IncompleteExpired,
            "past_due" => RemoteStatus::PastDue,
            "unpaid" => RemoteStatus::Unpaid,
            "canceled" => RemoteStatus::Canceled,
            "paused" => RemoteStatus::Paused,
            _ => RemoteStatus::Unknown,
        }
    }

    /// Only `active` and `trialing` subscriptions count as active locally.
    pub fn grants_access(&self) -> bool {
        matches!(self, RemoteStatus::Active | RemoteStatus::Trialing)
    }

    /// The subscription can no longer be modified; the provider keeps it
    /// only as a record.
    pub fn is_ended(&self) -> bool {
        matches!(self, RemoteStatus::Canceled | RemoteStatus::IncompleteExpired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Active => "active",
            RemoteStatus::Trialing => "trialing",
            RemoteStatus::Incomplete => "incomplete",
            RemoteStatus::IncompleteExpired => "incomplete_expired",
            RemoteStatus::PastDue => "past_due",
            RemoteStatus::Unpaid => "unpaid",
            RemoteStatus::Canceled => "canceled",
            RemoteStatus::Paused => "paused",
            RemoteStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_and_expired_are_ended() {
        assert!(RemoteStatus::Canceled.is_ended());
        assert!(RemoteStatus::IncompleteExpired.is_ended());
        assert!(!RemoteStatus::PastDue.is_ended());
        assert!(!RemoteStatus::Incomplete.is_ended());
    }

    #[test]
    fn active_and_trialing_map_to_active() {
        assert_eq!(
            SubscriptionStatus::from_remote(RemoteStatus::Active),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_remote(RemoteStatus::Trialing),
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn every_other_remote_status_maps_to_inactive() {
        for remote in [
            RemoteStatus::Incomplete,
            RemoteStatus::IncompleteExpired,
            RemoteStatus::PastDue,
            RemoteStatus::Unpaid,
            RemoteStatus::Canceled,
            RemoteStatus::Paused,
            RemoteStatus::Unknown,
        ] {
            assert_eq!(
                SubscriptionStatus::from_remote(remote.clone()),
                SubscriptionStatus::Inactive,
                "{} should not grant access",
                remote
            );
        }
    }

    #[test]
    fn unknown_provider_status_is_tolerated() {
        assert_eq!(RemoteStatus::from_provider("on_hold"), RemoteStatus::Unknown);
        let parsed: RemoteStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(parsed, RemoteStatus::Unknown);
    }

    #[test]
    fn local_status_parses_stored_value() {
        assert_eq!(
            "inactive".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Inactive
        );
        assert!("trialing".parse::<SubscriptionStatus>().is_err());
    }
}
