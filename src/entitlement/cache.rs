//! Short-lived cache of entitlement snapshots, keyed by user id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::user::AuthenticatedUser;

use super::resolver::{EntitlementResolver, EntitlementSnapshot};

/// Default time a snapshot stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CachedSnapshot {
    fetched_at: Instant,
    snapshot: EntitlementSnapshot,
}

/// Read-through snapshot cache. Billing events invalidate entries early.
pub struct EntitlementCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedSnapshot>>,
}

impl EntitlementCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh cached snapshot, or resolve and store a new one.
    pub async fn get_or_resolve(
        &self,
        resolver: &EntitlementResolver,
        user: &AuthenticatedUser,
    ) -> EntitlementSnapshot {
        if let Some(snapshot) = self.get(&user.id).await {
            return snapshot;
        }
        let snapshot = resolver.resolve(user).await;
        self.insert(&user.id, snapshot.clone()).await;
        snapshot
    }

    async fn get(&self, user_id: &str) -> Option<EntitlementSnapshot> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.snapshot.clone())
    }

    /// Store a snapshot resolved elsewhere (e.g. on wizard open).
    pub async fn insert(&self, user_id: &str, snapshot: EntitlementSnapshot) {
        self.entries.write().await.insert(
            user_id.to_string(),
            CachedSnapshot {
                fetched_at: Instant::now(),
                snapshot,
            },
        );
    }

    /// Drop a user's snapshot. Returns whether one was cached.
    pub async fn invalidate(&self, user_id: &str) -> bool {
        let removed = self.entries.write().await.remove(user_id).is_some();
        debug!(user_id, removed, "Invalidated entitlement snapshot");
        removed
    }
}

impl Default for EntitlementCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
