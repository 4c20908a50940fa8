//! Entitlement: who may submit, and how many requests they have left.

pub mod billing;
pub mod cache;
pub mod plans;
pub mod resolver;
pub mod test_override;

pub use billing::{BillingStatus, BillingStatusService, HttpBillingService};
pub use cache::EntitlementCache;
pub use plans::{CheckoutMode, Plan, PlanCatalog, PlanTier, Remaining, RequestLimit};
pub use resolver::{
    EntitlementResolver, EntitlementSnapshot, EntitlementSource, Entitlements, SnapshotSource,
    can_submit, remaining,
};
pub use test_override::{TEST_OVERRIDE_KEY, TestOverride};
