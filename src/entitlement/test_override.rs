//! Test subscription override stored in a settings slot.
//!
//! Lets a developer or admin pretend to hold a plan without going through
//! billing. Only consulted when `RECORDS_ALLOW_TEST_OVERRIDE` is enabled.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DatabaseError;
use crate::store::Database;

/// Settings key holding the override payload.
pub const TEST_OVERRIDE_KEY: &str = "test_subscription_override";

/// A pretend subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestOverride {
    pub product_id: String,
    pub plan_name: String,
}

impl TestOverride {
    /// Parse a raw slot value. Anything that isn't a well-formed override
    /// with a non-empty product id is treated as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<TestOverride>(raw) {
            Ok(parsed) if !parsed.product_id.trim().is_empty() => Some(parsed),
            Ok(_) => {
                warn!("Ignoring test override with empty product id");
                None
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed test override");
                None
            }
        }
    }
}

/// Read the user's override slot.
pub async fn read_test_override(
    db: &dyn Database,
    user_id: &str,
) -> Result<Option<TestOverride>, DatabaseError> {
    Ok(db
        .get_setting(user_id, TEST_OVERRIDE_KEY)
        .await?
        .as_deref()
        .and_then(TestOverride::parse))
}

/// Write the user's override slot.
pub async fn write_test_override(
    db: &dyn Database,
    user_id: &str,
    value: &TestOverride,
) -> Result<(), DatabaseError> {
    let raw =
        serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    db.set_setting(user_id, TEST_OVERRIDE_KEY, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[test]
    fn parse_valid_override() {
        let parsed =
            TestOverride::parse(r#"{"product_id":"prod_enterprise","plan_name":"Enterprise"}"#)
                .unwrap();
        assert_eq!(parsed.product_id, "prod_enterprise");
        assert_eq!(parsed.plan_name, "Enterprise");
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(TestOverride::parse("not json").is_none());
        assert!(TestOverride::parse("[]").is_none());
        assert!(TestOverride::parse(r#"{"product_id":"p"}"#).is_none());
        assert!(TestOverride::parse(r#"{"product_id":"","plan_name":"x"}"#).is_none());
        assert!(
            TestOverride::parse(r#"{"product_id":"p","plan_name":"x","extra":true}"#).is_none()
        );
    }

    #[tokio::test]
    async fn slot_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(read_test_override(&db, "u1").await.unwrap().is_none());

        let value = TestOverride {
            product_id: "prod_professional".into(),
            plan_name: "Professional".into(),
        };
        write_test_override(&db, "u1", &value).await.unwrap();
        assert_eq!(read_test_override(&db, "u1").await.unwrap(), Some(value));
        assert!(read_test_override(&db, "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_slot_reads_as_absent() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.set_setting("u1", TEST_OVERRIDE_KEY, "{broken").await.unwrap();
        assert!(read_test_override(&db, "u1").await.unwrap().is_none());
    }
}
