//! Mapping between plans and provider price identifiers.

use super::PaidPlan;

/// Configured provider price for each paid plan.
///
/// A plan whose price is not configured cannot be subscribed to, and events
/// carrying an unknown price leave the local plan untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCatalog {
    basic_price_id: Option<String>,
    pro_price_id: Option<String>,
}

impl PlanCatalog {
    /// Builds a catalog; blank price ids count as unconfigured.
    pub fn new(basic_price_id: Option<String>, pro_price_id: Option<String>) -> Self {
        fn normalize(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            basic_price_id: normalize(basic_price_id),
            pro_price_id: normalize(pro_price_id),
        }
    }

    pub fn price_for(&self, plan: PaidPlan) -> Option<&str> {
        match plan {
            PaidPlan::Basic => self.basic_price_id.as_deref(),
            PaidPlan::Pro => self.pro_price_id.as_deref(),
        }
    }

    /// Reverse lookup used when reconciling provider events.
    pub fn plan_for_price(&self, price_id: &str) -> Option<PaidPlan> {
        PaidPlan::ALL
            .into_iter()
            .find(|plan| self.price_for(*plan) == Some(price_id))
    }

    /// Plans that cannot currently be subscribed to.
    pub fn missing_prices(&self) -> Vec<PaidPlan> {
        PaidPlan::ALL
            .into_iter()
            .filter(|plan| self.price_for(*plan).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(Some("price_basic".into()), Some("price_pro".into()))
    }

    #[test]
    fn resolves_price_per_plan() {
        let catalog = catalog();
        assert_eq!(catalog.price_for(PaidPlan::Basic), Some("price_basic"));
        assert_eq!(catalog.price_for(PaidPlan::Pro), Some("price_pro"));
    }

    #[test]
    fn reverse_lookup_finds_plan() {
        assert_eq!(catalog().plan_for_price("price_pro"), Some(PaidPlan::Pro));
    }

    #[test]
    fn reverse_lookup_ignores_unknown_price() {
        assert_eq!(catalog().plan_for_price("price_legacy"), None);
    }

    #[test]
    fn blank_prices_are_unconfigured() {
        let catalog = PlanCatalog::new(Some("  ".into()), None);
        assert_eq!(catalog.price_for(PaidPlan::Basic), None);
        assert_eq!(catalog.missing_prices(), vec![PaidPlan::Basic, PaidPlan::Pro]);
    }

    #[test]
    fn empty_price_never_matches_unconfigured_plan() {
        let catalog = PlanCatalog::new(None, Some("price_pro".into()));
        assert_eq!(catalog.plan_for_price(""), None);
    }
}
