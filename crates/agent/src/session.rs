//! Session management (part of C11): a session owns an id, a title, and the
//! bookkeeping the rest of the core needs to resume it - which branch is
//! active and which auth profile it is bound to.

use anvil_foundation::{Error, JsonStore, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const SESSION_FILE_PREFIX: &str = "sessions";

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
    /// Branch currently checked out for this session (see `BranchStore`).
    pub active_branch_id: String,
    /// Auth profile last bound to this session by the rotator's sticky
    /// selection, if any.
    pub auth_profile_id: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: None,
            created_at: now,
            updated_at: now,
            active: true,
            active_branch_id: crate::branch::MAIN_BRANCH_ID.to_string(),
            auth_profile_id: None,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages the set of known sessions: in-memory cache plus optional JSON
/// persistence, one file per session under `sessions/<id>.json`.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    current_session_id: Arc<RwLock<Option<String>>>,
    store: Option<JsonStore>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            current_session_id: Arc::new(RwLock::new(None)),
            store: None,
        }
    }

    pub fn with_store(store: JsonStore) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            current_session_id: Arc::new(RwLock::new(None)),
            store: Some(store),
        }
    }

    fn session_key(id: &str) -> String {
        format!("{}/{}.json", SESSION_FILE_PREFIX, id)
    }

    fn persist(&self, session: &Session) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_atomic(&Self::session_key(&session.id), session) {
                tracing::warn!(session_id = %session.id, error = %e, "failed to persist session");
            }
        }
    }

    pub async fn get_or_create(&self) -> Session {
        {
            let current_id = self.current_session_id.read().await;
            if let Some(id) = current_id.as_ref() {
                let sessions = self.sessions.read().await;
                if let Some(session) = sessions.get(id) {
                    return session.clone();
                }
            }
        }

        let session = Session::new();
        self.add_session(session.clone()).await;
        self.set_current(&session.id).await;
        session
    }

    pub async fn add_session(&self, session: Session) {
        self.persist(&session);
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return Some(session.clone());
            }
        }
        let store = self.store.as_ref()?;
        let session: Session = store.load_optional(&Self::session_key(id)).ok().flatten()?;
        self.sessions.write().await.insert(id.to_string(), session.clone());
        Some(session)
    }

    pub async fn current(&self) -> Option<Session> {
        let current_id = self.current_session_id.read().await;
        if let Some(id) = current_id.as_ref() {
            self.get(id).await
        } else {
            None
        }
    }

    pub async fn set_current(&self, id: &str) {
        let mut current = self.current_session_id.write().await;
        *current = Some(id.to_string());
    }

    pub async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<_> = sessions.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    pub async fn set_title(&self, id: &str, title: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("session {} not found", id)))?;
        session.set_title(title);
        self.persist(session);
        Ok(())
    }

    /// Record which branch a session has checked out, for resumption.
    pub async fn set_active_branch(&self, id: &str, branch_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("session {} not found", id)))?;
        session.active_branch_id = branch_id.to_string();
        session.touch();
        self.persist(session);
        Ok(())
    }

    /// Record which auth profile the rotator bound to this session.
    pub async fn set_auth_profile(&self, id: &str, profile_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("session {} not found", id)))?;
        session.auth_profile_id = Some(profile_id.to_string());
        self.persist(session);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        {
            let mut current = self.current_session_id.write().await;
            if current.as_deref() == Some(id) {
                *current = None;
            }
        }
        if let Some(store) = &self.store {
            store.remove(&Self::session_key(id))?;
        }
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_same_session_on_repeat_calls() {
        let mgr = SessionManager::new();
        let s1 = mgr.get_or_create().await;
        let s2 = mgr.get_or_create().await;
        assert_eq!(s1.id, s2.id);
    }

    #[tokio::test]
    async fn new_session_defaults_to_main_branch() {
        let mgr = SessionManager::new();
        let session = mgr.get_or_create().await;
        assert_eq!(session.active_branch_id, crate::branch::MAIN_BRANCH_ID);
    }

    #[tokio::test]
    async fn set_active_branch_persists_across_reads() {
        let mgr = SessionManager::new();
        let session = mgr.get_or_create().await;
        mgr.set_active_branch(&session.id, "feature-x").await.unwrap();
        let reloaded = mgr.get(&session.id).await.unwrap();
        assert_eq!(reloaded.active_branch_id, "feature-x");
    }

    #[tokio::test]
    async fn delete_unknown_session_is_a_noop() {
        let mgr = SessionManager::new();
        assert!(mgr.delete("does-not-exist").await.is_ok());
    }

    #[tokio::test]
    async fn sessions_round_trip_through_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::with_store(JsonStore::new(dir.path()));
        let session = mgr.get_or_create().await;
        mgr.set_title(&session.id, "fix the flaky test").await.unwrap();

        let reloaded_mgr = SessionManager::with_store(JsonStore::new(dir.path()));
        let reloaded = reloaded_mgr.get(&session.id).await.unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("fix the flaky test"));
    }
}
