//! Plan definitions.
//!
//! `Plan` is what an account is on; `PaidPlan` is what a subscription can be
//! created for or moved to. Keeping them separate means the creation and
//! modification paths can never be asked to subscribe someone to "none".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Plan an account is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Basic,
    Pro,
    /// No subscription plan.
    None,
}

impl Plan {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::None => "none",
        }
    }

    /// Returns true for plans backed by a provider price.
    pub fn is_paid(&self) -> bool {
        self.as_paid().is_some()
    }

    /// Narrows to a paid plan, or `None` for [`Plan::None`].
    pub fn as_paid(&self) -> Option<PaidPlan> {
        match self {
            Plan::Basic => Some(PaidPlan::Basic),
            Plan::Pro => Some(PaidPlan::Pro),
            Plan::None => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    /// Parses a plan name exactly as stored. Anything else is rejected
    /// before any side effect happens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "none" => Ok(Plan::None),
            "" => Err(ValidationError::empty_field("plan")),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan '{}', expected basic, pro or none", other),
            )),
        }
    }
}

/// A plan that has a provider price behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaidPlan {
    Basic,
    Pro,
}

impl PaidPlan {
    pub const ALL: [PaidPlan; 2] = [PaidPlan::Basic, PaidPlan::Pro];

    pub fn as_str(&self) -> &'static str {
        Plan::from(*self).as_str()
    }
}

impl From<PaidPlan> for Plan {
    fn from(plan: PaidPlan) -> Self {
        match plan {
            PaidPlan::Basic => Plan::Basic,
            PaidPlan::Pro => Plan::Pro,
        }
    }
}

impl fmt::Display for PaidPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_plans() {
        assert_eq!("basic".parse::<Plan>().unwrap(), Plan::Basic);
        assert_eq!("pro".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!("none".parse::<Plan>().unwrap(), Plan::None);
    }

    #[test]
    fn rejects_unknown_plan() {
        match "enterprise".parse::<Plan>() {
            Err(ValidationError::InvalidFormat { field, .. }) => assert_eq!(field, "plan"),
            other => panic!("Expected InvalidFormat error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_plan_names_with_different_case() {
        assert!("Pro".parse::<Plan>().is_err());
    }

    #[test]
    fn none_is_not_paid() {
        assert!(!Plan::None.is_paid());
        assert_eq!(Plan::None.as_paid(), None);
    }

    #[test]
    fn paid_plans_round_trip_through_plan() {
        for paid in PaidPlan::ALL {
            assert_eq!(Plan::from(paid).as_paid(), Some(paid));
        }
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Pro).unwrap(), "\"pro\"");
        assert_eq!(serde_json::to_string(&PaidPlan::Basic).unwrap(), "\"basic\"");
    }
}
