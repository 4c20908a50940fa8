//! Plan catalog: product ids, checkout parameters and request limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

/// Purchasable plan tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Single,
    Professional,
    Enterprise,
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Professional => write!(f, "professional"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Checkout session mode sent to the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// One-off purchase.
    Payment,
    /// Recurring subscription.
    Subscription,
}

/// How many requests a plan allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLimit {
    Limited(u32),
    Unlimited,
}

impl RequestLimit {
    /// Integer form used by clients: `-1` means unlimited.
    pub fn as_sentinel(&self) -> i64 {
        match self {
            Self::Limited(n) => i64::from(*n),
            Self::Unlimited => -1,
        }
    }

    /// Whether `used` prior requests still leave room for one more.
    pub fn allows(&self, used: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(n) => used < u64::from(*n),
        }
    }

    /// Remaining requests after `used`, floored at zero.
    pub fn remaining(&self, used: u64) -> Remaining {
        match self {
            Self::Unlimited => Remaining::Unlimited,
            Self::Limited(n) => Remaining::Count(u64::from(*n).saturating_sub(used)),
        }
    }
}

impl Serialize for RequestLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_sentinel())
    }
}

/// Remaining quota: a count, or `"Unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Count(u64),
    Unlimited,
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Unlimited => write!(f, "Unlimited"),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_u64(*n),
            Self::Unlimited => serializer.serialize_str("Unlimited"),
        }
    }
}

/// A purchasable plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub tier: PlanTier,
    pub name: String,
    pub product_id: String,
    pub price_id: String,
    pub price: Decimal,
    pub mode: CheckoutMode,
    pub limit: RequestLimit,
}

/// The set of plans known to this deployment.
#[derive(Debug, Clone, Serialize)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: vec![
                Plan {
                    tier: PlanTier::Single,
                    name: "Single Request".to_string(),
                    product_id: "prod_single_request".to_string(),
                    price_id: "price_single_request".to_string(),
                    price: dec!(9.99),
                    mode: CheckoutMode::Payment,
                    limit: RequestLimit::Limited(1),
                },
                Plan {
                    tier: PlanTier::Professional,
                    name: "Professional".to_string(),
                    product_id: "prod_professional".to_string(),
                    price_id: "price_professional_monthly".to_string(),
                    price: dec!(29.00),
                    mode: CheckoutMode::Subscription,
                    limit: RequestLimit::Limited(5),
                },
                Plan {
                    tier: PlanTier::Enterprise,
                    name: "Enterprise".to_string(),
                    product_id: "prod_enterprise".to_string(),
                    price_id: "price_enterprise_monthly".to_string(),
                    price: dec!(99.00),
                    mode: CheckoutMode::Subscription,
                    limit: RequestLimit::Unlimited,
                },
            ],
        }
    }
}

impl PlanCatalog {
    /// Build the catalog from `RECORDS_PLAN_<TIER>_{PRODUCT,PRICE_ID,PRICE}`
    /// lookups, keeping defaults for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut catalog = Self::default();
        for plan in &mut catalog.plans {
            let prefix = format!("RECORDS_PLAN_{}", plan.tier.to_string().to_uppercase());
            if let Some(product) = lookup(&format!("{prefix}_PRODUCT")) {
                plan.product_id = product;
            }
            if let Some(price_id) = lookup(&format!("{prefix}_PRICE_ID")) {
                plan.price_id = price_id;
            }
            let price_key = format!("{prefix}_PRICE");
            if let Some(raw) = lookup(&price_key) {
                plan.price = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: price_key.clone(),
                    message: format!("{e}"),
                })?;
            }
        }
        Ok(catalog)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn plan(&self, tier: PlanTier) -> &Plan {
        // The catalog always holds one plan per tier.
        self.plans
            .iter()
            .find(|p| p.tier == tier)
            .unwrap_or(&self.plans[0])
    }

    /// Tier for a billing product id, if it is one of ours.
    pub fn tier_for_product(&self, product_id: &str) -> Option<PlanTier> {
        self.plans
            .iter()
            .find(|p| p.product_id == product_id)
            .map(|p| p.tier)
    }

    /// Request limit for a product id. Unknown or missing ids get no quota.
    pub fn limit_for(&self, product_id: Option<&str>) -> RequestLimit {
        product_id
            .and_then(|id| self.tier_for_product(id))
            .map(|tier| self.plan(tier).limit)
            .unwrap_or(RequestLimit::Limited(0))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_limits() {
        let catalog = PlanCatalog::default();
        assert_eq!(
            catalog.limit_for(Some("prod_single_request")),
            RequestLimit::Limited(1)
        );
        assert_eq!(
            catalog.limit_for(Some("prod_professional")),
            RequestLimit::Limited(5)
        );
        assert_eq!(
            catalog.limit_for(Some("prod_enterprise")),
            RequestLimit::Unlimited
        );
    }

    #[test]
    fn unknown_product_has_no_quota() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.limit_for(Some("prod_mystery")), RequestLimit::Limited(0));
        assert_eq!(catalog.limit_for(None), RequestLimit::Limited(0));
    }

    #[test]
    fn sentinel_and_remaining() {
        assert_eq!(RequestLimit::Unlimited.as_sentinel(), -1);
        assert_eq!(RequestLimit::Limited(5).as_sentinel(), 5);
        assert_eq!(RequestLimit::Limited(5).remaining(4), Remaining::Count(1));
        assert_eq!(RequestLimit::Limited(5).remaining(9), Remaining::Count(0));
        assert_eq!(RequestLimit::Unlimited.remaining(1000), Remaining::Unlimited);
    }

    #[test]
    fn remaining_serializes_like_clients_expect() {
        assert_eq!(serde_json::to_string(&Remaining::Count(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&Remaining::Unlimited).unwrap(),
            "\"Unlimited\""
        );
        assert_eq!(serde_json::to_string(&RequestLimit::Unlimited).unwrap(), "-1");
    }

    #[test]
    fn lookup_overrides_ids_and_prices() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RECORDS_PLAN_PROFESSIONAL_PRODUCT", "prod_ABC"),
            ("RECORDS_PLAN_PROFESSIONAL_PRICE_ID", "price_ABC"),
            ("RECORDS_PLAN_SINGLE_PRICE", "4.50"),
        ]);
        let catalog = PlanCatalog::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(catalog.tier_for_product("prod_ABC"), Some(PlanTier::Professional));
        assert!(catalog.tier_for_product("prod_professional").is_none());
        assert_eq!(catalog.plan(PlanTier::Professional).price_id, "price_ABC");
        assert_eq!(catalog.plan(PlanTier::Single).price, dec!(4.50));
    }

    #[test]
    fn invalid_price_is_config_error() {
        let err = PlanCatalog::from_lookup(|k| {
            (k == "RECORDS_PLAN_ENTERPRISE_PRICE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn checkout_modes() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.plan(PlanTier::Single).mode, CheckoutMode::Payment);
        assert_eq!(
            catalog.plan(PlanTier::Enterprise).mode,
            CheckoutMode::Subscription
        );
    }
}
