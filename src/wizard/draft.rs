//! DraftStore: live wizard sessions, keyed by session id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::WizardError;
use crate::user::AuthenticatedUser;

use super::controller::{WizardController, WizardServices, WizardView};

/// A shared handle to one session.
pub type SessionHandle = Arc<Mutex<WizardController>>;

struct DraftEntry {
    controller: SessionHandle,
    // Both kept outside the controller's mutex so closing never waits on
    // an in-flight call.
    cancel: CancellationToken,
    owner: Option<String>,
}

pub struct DraftStore {
    services: Arc<WizardServices>,
    sessions: RwLock<HashMap<Uuid, DraftEntry>>,
}

impl DraftStore {
    pub fn new(services: Arc<WizardServices>) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<WizardServices> {
        &self.services
    }

    /// Open a new session.
    pub async fn create(&self, user: Option<AuthenticatedUser>) -> (Uuid, WizardView) {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let controller =
            WizardController::open(id, Arc::clone(&self.services), user, cancel.clone()).await;
        let view = controller.view();
        let owner = controller.user().map(|u| u.id.clone());

        self.sessions.write().await.insert(
            id,
            DraftEntry {
                controller: Arc::new(Mutex::new(controller)),
                cancel,
                owner,
            },
        );
        (id, view)
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, WizardError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|e| Arc::clone(&e.controller))
            .ok_or(WizardError::SessionNotFound(id))
    }

    /// Id of the user the session was opened or signed in as.
    pub async fn owner(&self, id: Uuid) -> Result<Option<String>, WizardError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|e| e.owner.clone())
            .ok_or(WizardError::SessionNotFound(id))
    }

    /// Record who signed in on a session.
    pub async fn set_owner(&self, id: Uuid, owner: &str) -> Result<(), WizardError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or(WizardError::SessionNotFound(id))?;
        entry.owner = Some(owner.to_string());
        Ok(())
    }

    /// Close a session: cancel in-flight work, then drop it.
    pub async fn close(&self, id: Uuid) -> Result<(), WizardError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(WizardError::SessionNotFound(id))?;
        entry.cancel.cancel();
        entry.controller.lock().await.close();
        info!(session_id = %id, "Wizard session closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
