//! Branch store (C6): per-session conversation branches, fork/merge, and
//! atomic on-disk persistence.
//!
//! Grounded in `session.rs`'s `Arc<RwLock<HashMap<...>>>` in-memory map plus
//! an optional storage backend, generalised from one flat session per id to
//! one tree of named branches per session.

use anvil_foundation::storage::JsonStore;
use anvil_foundation::{Error, Result};
use anvil_provider::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const MAIN_BRANCH_ID: &str = "main";

/// Strategy used by `merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Append,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub parent_message_index: Option<usize>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            parent_message_index: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// All branches for a single session, keyed by branch id, with an active
/// pointer. One `BranchStore` instance is shared per session.
pub struct BranchStore {
    session_id: String,
    branches: RwLock<HashMap<String, Branch>>,
    active: RwLock<String>,
    store: Option<JsonStore>,
}

impl BranchStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let mut branches = HashMap::new();
        branches.insert(MAIN_BRANCH_ID.to_string(), Branch::new(MAIN_BRANCH_ID, "main"));
        Self {
            session_id,
            branches: RwLock::new(branches),
            active: RwLock::new(MAIN_BRANCH_ID.to_string()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: JsonStore) -> Self {
        self.store = Some(store);
        self
    }

    fn branch_filename(&self, branch_id: &str) -> String {
        format!("branches/{}/{}.json", self.session_id, branch_id)
    }

    fn persist(&self, branch: &Branch) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save_atomic(&self.branch_filename(&branch.id), branch) {
            warn!(branch = %branch.id, "failed to persist branch: {}", e);
        }
    }

    fn remove_file(&self, branch_id: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.remove(&self.branch_filename(branch_id)) {
            warn!(branch = %branch_id, "failed to remove branch file: {}", e);
        }
    }

    pub async fn active_id(&self) -> String {
        self.active.read().await.clone()
    }

    pub async fn active_branch(&self) -> Branch {
        let active = self.active.read().await.clone();
        self.branches.read().await.get(&active).cloned().expect("active branch always exists")
    }

    pub async fn get(&self, id: &str) -> Option<Branch> {
        self.branches.read().await.get(id).cloned()
    }

    /// `createBranch(id, name, parentId=active, parentMessageIndex=active.len)`.
    #[tracing::instrument(skip(self))]
    pub async fn create_branch(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: Option<&str>,
        parent_message_index: Option<usize>,
    ) -> Result<Branch> {
        let id = id.into();
        let mut branches = self.branches.write().await;
        if branches.contains_key(&id) {
            return Err(Error::Branch(format!("branch {} already exists", id)));
        }

        let active = self.active.read().await.clone();
        let parent_id = parent_id.unwrap_or(&active).to_string();
        let parent = branches
            .get(&parent_id)
            .ok_or_else(|| Error::BranchNotFound(parent_id.clone()))?;

        let cut = parent_message_index.unwrap_or(parent.messages.len());
        if cut > parent.messages.len() {
            return Err(Error::Branch(format!(
                "parent_message_index {} out of range (parent has {} messages)",
                cut,
                parent.messages.len()
            )));
        }

        let mut branch = Branch::new(id.clone(), name);
        branch.parent_id = Some(parent_id);
        branch.parent_message_index = Some(cut);
        branch.messages = parent.messages[..cut].to_vec();

        branches.insert(id.clone(), branch.clone());
        self.persist(&branch);
        info!(branch = %id, "created branch");
        Ok(branch)
    }

    /// `fork(name)`: branch off the active branch at its current length, then
    /// switch to it.
    pub async fn fork(&self, name: impl Into<String>) -> Result<Branch> {
        let active = self.active_branch().await;
        let new_id = format!("branch-{}", uuid::Uuid::new_v4());
        let branch = self
            .create_branch(new_id, name, Some(&active.id), Some(active.messages.len()))
            .await?;
        self.checkout(&branch.id).await?;
        Ok(branch)
    }

    /// `forkFromMessage(name, index)`: like `fork`, but cuts at `index`.
    pub async fn fork_from_message(&self, name: impl Into<String>, index: usize) -> Result<Branch> {
        let active = self.active_branch().await;
        if index > active.messages.len() {
            return Err(Error::Branch(format!(
                "index {} out of range (active branch has {} messages)",
                index,
                active.messages.len()
            )));
        }
        let new_id = format!("branch-{}", uuid::Uuid::new_v4());
        let branch = self
            .create_branch(new_id, name, Some(&active.id), Some(index))
            .await?;
        self.checkout(&branch.id).await?;
        Ok(branch)
    }

    pub async fn checkout(&self, id: &str) -> Result<()> {
        if !self.branches.read().await.contains_key(id) {
            return Err(Error::BranchNotFound(id.to_string()));
        }
        *self.active.write().await = id.to_string();
        debug!(branch = %id, "checked out branch");
        Ok(())
    }

    /// `merge(sourceId, strategy)` into the currently active branch.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, source_id: &str, strategy: MergeStrategy) -> Result<Branch> {
        let target_id = self.active.read().await.clone();
        if source_id == target_id {
            return Err(Error::Branch("cannot merge a branch into itself".to_string()));
        }

        let mut branches = self.branches.write().await;
        let source_messages = branches
            .get(source_id)
            .ok_or_else(|| Error::BranchNotFound(source_id.to_string()))?
            .messages
            .clone();

        let target = branches
            .get_mut(&target_id)
            .ok_or_else(|| Error::BranchNotFound(target_id.clone()))?;

        match strategy {
            MergeStrategy::Append => target.messages.extend(source_messages),
            MergeStrategy::Replace => target.messages = source_messages,
        }
        target.touch();
        let merged = target.clone();
        self.persist(&merged);
        info!(source = %source_id, target = %target_id, "merged branch");
        Ok(merged)
    }

    /// Refuses to delete `main`; switches active to `main` if deleting the
    /// active branch.
    pub async fn delete_branch(&self, id: &str) -> Result<()> {
        if id == MAIN_BRANCH_ID {
            return Err(Error::Branch("cannot delete the main branch".to_string()));
        }
        let mut branches = self.branches.write().await;
        if branches.remove(id).is_none() {
            return Err(Error::BranchNotFound(id.to_string()));
        }
        drop(branches);
        self.remove_file(id);

        let mut active = self.active.write().await;
        if *active == id {
            *active = MAIN_BRANCH_ID.to_string();
        }
        Ok(())
    }

    pub async fn rename_branch(&self, id: &str, new_name: impl Into<String>) -> Result<Branch> {
        let mut branches = self.branches.write().await;
        let branch = branches
            .get_mut(id)
            .ok_or_else(|| Error::BranchNotFound(id.to_string()))?;
        branch.name = new_name.into();
        branch.touch();
        let updated = branch.clone();
        self.persist(&updated);
        Ok(updated)
    }

    /// Append a message to the active branch.
    pub async fn add_message(&self, message: Message) -> Result<()> {
        let active_id = self.active.read().await.clone();
        let mut branches = self.branches.write().await;
        let branch = branches
            .get_mut(&active_id)
            .ok_or_else(|| Error::BranchNotFound(active_id.clone()))?;
        branch.messages.push(message);
        branch.touch();
        let updated = branch.clone();
        self.persist(&updated);
        Ok(())
    }

    pub async fn set_messages(&self, branch_id: &str, messages: Vec<Message>) -> Result<()> {
        let mut branches = self.branches.write().await;
        let branch = branches
            .get_mut(branch_id)
            .ok_or_else(|| Error::BranchNotFound(branch_id.to_string()))?;
        branch.messages = messages;
        branch.touch();
        let updated = branch.clone();
        self.persist(&updated);
        Ok(())
    }

    /// Branches sorted by `updated_at` descending.
    pub async fn list(&self) -> Vec<Branch> {
        let mut list: Vec<Branch> = self.branches.read().await.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Ancestry chain from root to `id` inclusive, following `parent_id` edges.
    pub async fn history(&self, id: &str) -> Result<Vec<Branch>> {
        let branches = self.branches.read().await;
        let mut chain = Vec::new();
        let mut current = branches
            .get(id)
            .ok_or_else(|| Error::BranchNotFound(id.to_string()))?
            .clone();
        loop {
            let parent_id = current.parent_id.clone();
            chain.push(current.clone());
            match parent_id {
                Some(pid) => match branches.get(&pid) {
                    Some(parent) => current = parent.clone(),
                    None => break,
                },
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_provider::Message;

    async fn store() -> BranchStore {
        BranchStore::new("s1")
    }

    #[tokio::test]
    async fn fresh_store_has_only_main() {
        let s = store().await;
        let list = s.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MAIN_BRANCH_ID);
    }

    #[tokio::test]
    async fn fork_copies_by_value_not_reference() {
        let s = store().await;
        s.add_message(Message::user("u1")).await.unwrap();
        s.add_message(Message::assistant("a1")).await.unwrap();

        let forked = s.fork("alt").await.unwrap();
        assert_eq!(forked.messages.len(), 2);

        s.add_message(Message::user("u2-only-on-forked")).await.unwrap();
        s.checkout(MAIN_BRANCH_ID).await.unwrap();
        let main = s.active_branch().await;
        assert_eq!(main.messages.len(), 2);
    }

    #[tokio::test]
    async fn create_branch_rejects_duplicate_id() {
        let s = store().await;
        s.create_branch("b1", "b1", None, None).await.unwrap();
        let err = s.create_branch("b1", "b1-again", None, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn deleting_main_is_refused() {
        let s = store().await;
        assert!(s.delete_branch(MAIN_BRANCH_ID).await.is_err());
    }

    #[tokio::test]
    async fn deleting_active_branch_switches_to_main() {
        let s = store().await;
        s.fork("alt").await.unwrap();
        let active = s.active_id().await;
        s.delete_branch(&active).await.unwrap();
        assert_eq!(s.active_id().await, MAIN_BRANCH_ID);
    }

    #[tokio::test]
    async fn merge_append_concatenates_messages() {
        // S5 from the testable-properties scenarios.
        let s = store().await;
        s.add_message(Message::user("u1")).await.unwrap();
        s.add_message(Message::assistant("a1")).await.unwrap();
        s.add_message(Message::user("u2")).await.unwrap();
        s.add_message(Message::assistant("a2")).await.unwrap();

        let alt = s.fork("alt").await.unwrap();
        s.add_message(Message::user("u3")).await.unwrap();

        s.checkout(MAIN_BRANCH_ID).await.unwrap();
        let merged = s.merge(&alt.id, MergeStrategy::Append).await.unwrap();
        assert_eq!(merged.messages.len(), 9);
        assert_eq!(merged.messages.last().unwrap().content, "u3");
    }

    #[tokio::test]
    async fn merge_replace_overwrites_messages() {
        let s = store().await;
        s.add_message(Message::user("u1")).await.unwrap();
        let alt = s.fork("alt").await.unwrap();
        s.add_message(Message::user("u3")).await.unwrap();

        s.checkout(MAIN_BRANCH_ID).await.unwrap();
        let merged = s.merge(&alt.id, MergeStrategy::Replace).await.unwrap();
        assert_eq!(merged.messages.len(), 2);
    }

    #[tokio::test]
    async fn merge_into_self_is_rejected() {
        let s = store().await;
        assert!(s.merge(MAIN_BRANCH_ID, MergeStrategy::Append).await.is_err());
    }

    #[tokio::test]
    async fn history_follows_parent_chain() {
        let s = store().await;
        let alt = s.fork("alt").await.unwrap();
        let grand = s.fork_from_message("grand", 0).await.unwrap();
        let chain = s.history(&grand.id).await.unwrap();
        assert_eq!(chain.iter().map(|b| b.id.clone()).collect::<Vec<_>>()[0], MAIN_BRANCH_ID);
        assert_eq!(chain.last().unwrap().id, grand.id);
        assert!(chain.iter().any(|b| b.id == alt.id));
    }

    #[tokio::test]
    async fn persistence_round_trips_through_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let s = BranchStore::new("s1").with_store(store.clone());
        s.add_message(Message::user("hi")).await.unwrap();

        let loaded: Branch = store.load("branches/s1/main.json").unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }
}
