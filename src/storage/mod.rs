//! Persistent storage
//!
//! This module handles all data persistence for saved chats and settings.

pub mod history;
pub mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No saved chat named '{0}'")]
    NotFound(String),
    #[error("Invalid chat name '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidName(String),
    #[error("Could not determine a data directory for this platform")]
    NoDataDir,
}

/// Per-user data directory
///
/// Linux: ~/.local/share/lochat
/// macOS: ~/Library/Application Support/com.lochat.lochat
/// Windows: %APPDATA%\lochat\lochat\data
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("com", "lochat", "lochat")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}

/// Write `contents` to `path` through a sibling temp file and a rename, so a
/// crash mid-write never leaves a truncated file behind.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp_path, contents)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent_and_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("record.json");

        write_atomic(&path, "{\"a\":1}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert!(!dir.path().join("nested").join("record.json.tmp").exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");

        write_atomic(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }
}
