//! Persisted client identity (UUID and sync code)

use crate::error::{AppError, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Identity kept between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_code: Option<String>,
}

impl IdentityState {
    /// Adopt the UUID confirmed by the control server
    ///
    /// A different UUID invalidates the stored sync code. Returns whether
    /// anything changed.
    pub fn adopt_uuid(&mut self, uuid: &str) -> bool {
        if self.uuid.as_deref() == Some(uuid) {
            return false;
        }

        self.uuid = Some(uuid.to_string());
        self.sync_code = None;
        true
    }
}

/// JSON file holding an [`IdentityState`]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state; a missing file is an empty state
    pub fn load(&self) -> Result<IdentityState> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(IdentityState::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                AppError::config(format!("Corrupted state file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IdentityState::default()),
            Err(e) => Err(AppError::io(format!("Failed to read {}: {}", self.path.display(), e))),
        }
    }

    pub fn save(&self, state: &IdentityState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)?;
        write_atomically(&self.path, &content)
    }
}

/// Replace `path` with `content` without leaving a partial file behind
pub fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut file = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(content)
        .and_then(|_| file.flush())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), IdentityState::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));
        let state = IdentityState {
            uuid: Some("1f0e6a8c-2b3d-4e5f-8a9b-0c1d2e3f4a5b".to_string()),
            sync_code: Some("AB12".to_string()),
        };

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"sync_code\": \"AB12\""));
    }

    #[test]
    fn test_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let error = StateStore::new(&path).load().unwrap_err();
        assert_eq!(error.category(), "CONFIG");
    }

    #[test]
    fn test_adopt_uuid_drops_sync_code() {
        let mut state = IdentityState {
            uuid: Some("old".to_string()),
            sync_code: Some("AB12".to_string()),
        };

        assert!(!state.adopt_uuid("old"));
        assert_eq!(state.sync_code.as_deref(), Some("AB12"));

        assert!(state.adopt_uuid("new"));
        assert_eq!(state.uuid.as_deref(), Some("new"));
        assert!(state.sync_code.is_none());
    }

    #[test]
    fn test_write_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
