//! JSON file storage, with an atomic variant for state that must never be
//! observed half-written (branch files, rotator cooldown state).

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Global config dir, `~/.anvil`.
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot find config directory".to_string()))?
            .join("anvil");
        Ok(Self::new(dir))
    }

    /// Project-local config dir, `<root>/.anvil`.
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(".anvil"))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// Creates any intermediate directories implied by `path`
    /// (e.g. `branches/<sessionId>/`).
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Config(format!("failed to create directory: {}", e)))?;
            }
        }
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        self.load(filename).unwrap_or_default()
    }

    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);
        self.ensure_parent_dir(&path)?;
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Config(format!("failed to serialize: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Write `filename` atomically: serialize to a sibling `.tmp` file, then
    /// rename over the target. A reader never observes a partially written
    /// file, and a crash mid-write leaves the previous version intact.
    /// `filename` may contain subdirectories (e.g. `branches/<sessionId>/<id>.json`);
    /// they are created as needed.
    pub fn save_atomic<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);
        self.ensure_parent_dir(&path)?;
        let tmp_path = self.file_path(&format!("{}.tmp", filename));
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Config(format!("failed to serialize: {}", e)))?;
        std::fs::write(&tmp_path, content)
            .map_err(|e| Error::Config(format!("failed to write {}: {}", tmp_path.display(), e)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| Error::Config(format!("failed to rename {} into place: {}", path.display(), e)))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }

    pub fn remove(&self, filename: &str) -> Result<()> {
        let path = self.file_path(filename);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::Config(format!("failed to remove {}: {}", path.display(), e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.save_atomic("state.json", &serde_json::json!({"n": 1})).unwrap();
        assert!(store.exists("state.json"));
        assert!(!store.file_path("state.json.tmp").exists());

        let loaded: serde_json::Value = store.load("state.json").unwrap();
        assert_eq!(loaded["n"], 1);
    }

    #[test]
    fn atomic_save_overwrites_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.save_atomic("state.json", &serde_json::json!({"n": 1})).unwrap();
        store.save_atomic("state.json", &serde_json::json!({"n": 2})).unwrap();

        let loaded: serde_json::Value = store.load("state.json").unwrap();
        assert_eq!(loaded["n"], 2);
    }
}
