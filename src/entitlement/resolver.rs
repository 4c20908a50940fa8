//! EntitlementResolver: turns billing status (or a test override) plus the
//! user's request count into a submit / no-submit decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::Database;
use crate::user::AuthenticatedUser;

use super::billing::BillingStatusService;
use super::plans::{PlanCatalog, Remaining, RequestLimit};
use super::test_override::{TestOverride, read_test_override};

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Billing,
    TestOverride,
}

/// Point-in-time subscription status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementSnapshot {
    pub subscribed: bool,
    pub product_id: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub source: SnapshotSource,
}

impl EntitlementSnapshot {
    /// The fail-closed snapshot.
    pub fn unsubscribed(source: SnapshotSource) -> Self {
        Self {
            subscribed: false,
            product_id: None,
            subscription_end: None,
            source,
        }
    }
}

/// Where a session's entitlement comes from. Chosen once per session.
#[derive(Clone)]
pub enum EntitlementSource {
    Billing(Arc<dyn BillingStatusService>),
    TestOverride(TestOverride),
}

impl std::fmt::Debug for EntitlementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Billing(_) => write!(f, "Billing"),
            Self::TestOverride(o) => f.debug_tuple("TestOverride").field(o).finish(),
        }
    }
}

/// Resolves entitlement for one session.
#[derive(Debug, Clone)]
pub struct EntitlementResolver {
    source: EntitlementSource,
    catalog: Arc<PlanCatalog>,
}

impl EntitlementResolver {
    pub fn new(source: EntitlementSource, catalog: Arc<PlanCatalog>) -> Self {
        Self { source, catalog }
    }

    /// Pick the session's entitlement source. The override slot is only
    /// read when overrides are enabled; a failed read falls back to billing.
    pub async fn for_user(
        db: &dyn Database,
        billing: Arc<dyn BillingStatusService>,
        catalog: Arc<PlanCatalog>,
        allow_test_override: bool,
        user: &AuthenticatedUser,
    ) -> Self {
        if allow_test_override {
            match read_test_override(db, &user.id).await {
                Ok(Some(o)) => {
                    info!(user_id = %user.id, product_id = %o.product_id, "Using test subscription override");
                    return Self::new(EntitlementSource::TestOverride(o), catalog);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "Failed to read test override slot");
                }
            }
        }
        Self::new(EntitlementSource::Billing(billing), catalog)
    }

    pub fn source(&self) -> &EntitlementSource {
        &self.source
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Current snapshot. A test override is returned verbatim; otherwise
    /// billing is queried and any error fails closed.
    pub async fn resolve(&self, user: &AuthenticatedUser) -> EntitlementSnapshot {
        match &self.source {
            EntitlementSource::TestOverride(o) => EntitlementSnapshot {
                subscribed: true,
                product_id: Some(o.product_id.clone()),
                subscription_end: None,
                source: SnapshotSource::TestOverride,
            },
            EntitlementSource::Billing(billing) => match billing.check_subscription(user).await {
                Ok(status) => EntitlementSnapshot {
                    subscribed: status.subscribed,
                    subscription_end: status.subscription_end_at(),
                    product_id: status.product_id,
                    source: SnapshotSource::Billing,
                },
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "Billing check failed, treating as unsubscribed");
                    EntitlementSnapshot::unsubscribed(SnapshotSource::Billing)
                }
            },
        }
    }

    /// Request limit for a product id.
    pub fn plan_limit(&self, product_id: Option<&str>) -> RequestLimit {
        self.catalog.limit_for(product_id)
    }

    /// Whether a user with `used` requests may submit another one.
    pub fn can_submit(&self, snapshot: &EntitlementSnapshot, used: u64) -> bool {
        can_submit(self.plan_limit(snapshot.product_id.as_deref()), snapshot, used)
    }
}

/// `subscribed && (unlimited || used < limit)`.
pub fn can_submit(limit: RequestLimit, snapshot: &EntitlementSnapshot, used: u64) -> bool {
    snapshot.subscribed && limit.allows(used)
}

/// Remaining quota, floored at zero.
pub fn remaining(limit: RequestLimit, used: u64) -> Remaining {
    limit.remaining(used)
}

/// Builds a resolver per session from the shared billing service and
/// catalog.
#[derive(Clone)]
pub struct Entitlements {
    db: Arc<dyn Database>,
    billing: Arc<dyn BillingStatusService>,
    catalog: Arc<PlanCatalog>,
    allow_test_override: bool,
}

impl Entitlements {
    pub fn new(
        db: Arc<dyn Database>,
        billing: Arc<dyn BillingStatusService>,
        catalog: Arc<PlanCatalog>,
        allow_test_override: bool,
    ) -> Self {
        Self {
            db,
            billing,
            catalog,
            allow_test_override,
        }
    }

    pub fn catalog(&self) -> &Arc<PlanCatalog> {
        &self.catalog
    }

    /// Resolver for one session.
    pub async fn resolver_for(&self, user: &AuthenticatedUser) -> EntitlementResolver {
        EntitlementResolver::for_user(
            self.db.as_ref(),
            Arc::clone(&self.billing),
            Arc::clone(&self.catalog),
            self.allow_test_override,
            user,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::entitlement::billing::BillingStatus;
    use crate::entitlement::test_override::write_test_override;
    use crate::error::BillingError;
    use crate::store::LibSqlBackend;

    /// Billing stub returning a fixed answer and counting calls.
    pub(crate) struct StubBilling {
        pub answer: Result<BillingStatus, String>,
        pub calls: AtomicUsize,
    }

    impl StubBilling {
        pub(crate) fn subscribed(product_id: &str) -> Self {
            Self {
                answer: Ok(BillingStatus {
                    subscribed: true,
                    product_id: Some(product_id.to_string()),
                    ..Default::default()
                }),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                answer: Err("connection refused".into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BillingStatusService for StubBilling {
        async fn check_subscription(
            &self,
            _user: &AuthenticatedUser,
        ) -> Result<BillingStatus, BillingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .clone()
                .map_err(|reason| BillingError::RequestFailed { reason })
        }
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new("u1", "u1@example.com", "tok")
    }

    fn snapshot(subscribed: bool, product: Option<&str>) -> EntitlementSnapshot {
        EntitlementSnapshot {
            subscribed,
            product_id: product.map(String::from),
            subscription_end: None,
            source: SnapshotSource::Billing,
        }
    }

    fn resolver(billing: StubBilling) -> EntitlementResolver {
        EntitlementResolver::new(
            EntitlementSource::Billing(Arc::new(billing)),
            Arc::new(PlanCatalog::default()),
        )
    }

    #[tokio::test]
    async fn billing_snapshot() {
        let resolver = resolver(StubBilling::subscribed("prod_professional"));
        let snap = resolver.resolve(&user()).await;
        assert!(snap.subscribed);
        assert_eq!(snap.product_id.as_deref(), Some("prod_professional"));
        assert_eq!(snap.source, SnapshotSource::Billing);
    }

    #[tokio::test]
    async fn billing_error_fails_closed() {
        let resolver = resolver(StubBilling::failing());
        let snap = resolver.resolve(&user()).await;
        assert_eq!(snap, EntitlementSnapshot::unsubscribed(SnapshotSource::Billing));
        assert!(!resolver.can_submit(&snap, 0));
    }

    #[tokio::test]
    async fn override_supersedes_billing() {
        let billing = Arc::new(StubBilling::subscribed("prod_single_request"));
        let resolver = EntitlementResolver::new(
            EntitlementSource::TestOverride(TestOverride {
                product_id: "prod_enterprise".into(),
                plan_name: "Enterprise".into(),
            }),
            Arc::new(PlanCatalog::default()),
        );

        let snap = resolver.resolve(&user()).await;
        assert!(snap.subscribed);
        assert_eq!(snap.product_id.as_deref(), Some("prod_enterprise"));
        assert_eq!(snap.source, SnapshotSource::TestOverride);
        assert_eq!(billing.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn can_submit_matches_formula_for_all_plans() {
        let resolver = resolver(StubBilling::failing());
        let products = [
            Some("prod_single_request"),
            Some("prod_professional"),
            Some("prod_enterprise"),
            Some("prod_unknown"),
            None,
        ];
        for product in products {
            let limit = resolver.plan_limit(product);
            let max_used = match limit {
                RequestLimit::Limited(n) => u64::from(n) + 2,
                RequestLimit::Unlimited => 1002,
            };
            for subscribed in [true, false] {
                let snap = snapshot(subscribed, product);
                for used in 0..=max_used {
                    let sentinel = limit.as_sentinel();
                    let expected = subscribed && (sentinel == -1 || (used as i64) < sentinel);
                    assert_eq!(
                        resolver.can_submit(&snap, used),
                        expected,
                        "product={product:?} subscribed={subscribed} used={used}"
                    );
                }
            }
        }
    }

    #[test]
    fn professional_with_four_used() {
        let resolver = resolver(StubBilling::failing());
        let snap = snapshot(true, Some("prod_professional"));
        assert!(resolver.can_submit(&snap, 4));
        assert_eq!(remaining(resolver.plan_limit(Some("prod_professional")), 4), Remaining::Count(1));
    }

    #[test]
    fn professional_with_five_used() {
        let resolver = resolver(StubBilling::failing());
        let snap = snapshot(true, Some("prod_professional"));
        assert!(!resolver.can_submit(&snap, 5));
        assert_eq!(remaining(resolver.plan_limit(Some("prod_professional")), 5), Remaining::Count(0));
    }

    #[test]
    fn enterprise_is_unlimited() {
        let resolver = resolver(StubBilling::failing());
        let snap = snapshot(true, Some("prod_enterprise"));
        assert!(resolver.can_submit(&snap, 1000));
        assert_eq!(
            remaining(resolver.plan_limit(Some("prod_enterprise")), 1000).to_string(),
            "Unlimited"
        );
    }

    #[test]
    fn unsubscribed_never_submits() {
        let resolver = resolver(StubBilling::failing());
        for product in ["prod_single_request", "prod_professional", "prod_enterprise", "x"] {
            assert!(!resolver.can_submit(&snapshot(false, Some(product)), 0));
        }
    }

    #[test]
    fn subscribed_unknown_product_gets_nothing() {
        let resolver = resolver(StubBilling::failing());
        assert_eq!(resolver.plan_limit(Some("prod_legacy")), RequestLimit::Limited(0));
        assert!(!resolver.can_submit(&snapshot(true, Some("prod_legacy")), 0));
    }

    #[tokio::test]
    async fn factory_ignores_override_when_disabled() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let o = TestOverride {
            product_id: "prod_enterprise".into(),
            plan_name: "Enterprise".into(),
        };
        write_test_override(db.as_ref(), "u1", &o).await.unwrap();

        let billing: Arc<dyn BillingStatusService> = Arc::new(StubBilling::failing());
        let catalog = Arc::new(PlanCatalog::default());

        let disabled = Entitlements::new(Arc::clone(&db), Arc::clone(&billing), Arc::clone(&catalog), false);
        assert!(matches!(
            disabled.resolver_for(&user()).await.source(),
            EntitlementSource::Billing(_)
        ));

        let enabled = Entitlements::new(db, billing, catalog, true);
        assert!(matches!(
            enabled.resolver_for(&user()).await.source(),
            EntitlementSource::TestOverride(_)
        ));
    }
}
