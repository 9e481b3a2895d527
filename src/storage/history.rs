//! Chat history persistence
//!
//! Saved chats live as one self-describing JSON record per file in the
//! history directory, addressed by name (`<name>.json`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::transcript::Conversation;
use crate::storage::{write_atomic, StorageError};
use crate::types::message::{self, Timestamp, Turn};

/// Current on-disk record format
pub const RECORD_VERSION: u32 = 1;

const RECORD_EXTENSION: &str = "json";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid name regex"));

/// Durable form of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRecord {
    pub version: u32,
    pub id: String,
    pub name: String,
    #[serde(with = "message::zoned")]
    pub created_at: Timestamp,
    #[serde(with = "message::zoned")]
    pub saved_at: Timestamp,
    #[serde(default)]
    pub system_prompt: String,
    pub turns: Vec<Turn>,
}

impl SavedRecord {
    fn snapshot(conversation: &Conversation, name: &str, system_prompt: &str) -> Self {
        Self {
            version: RECORD_VERSION,
            id: conversation.id.clone(),
            name: name.to_string(),
            created_at: conversation.created_at,
            saved_at: message::now(),
            system_prompt: system_prompt.to_string(),
            turns: conversation.all().to_vec(),
        }
    }

    fn into_conversation(self, name: String) -> Conversation {
        Conversation::from_parts(self.id, Some(name), self.created_at, self.turns)
    }
}

/// One line of `/list`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub name: String,
    pub turn_count: usize,
    pub created_at: Timestamp,
    pub saved_at: Timestamp,
    pub size_bytes: u64,
}

/// Named conversations on disk
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a snapshot of `conversation`, returning the name it was stored under.
    ///
    /// An explicit name overwrites any record of that name. Without one a
    /// fresh timestamped name is generated and never collides with an
    /// existing record.
    pub fn save(
        &self,
        conversation: &Conversation,
        requested: Option<&str>,
        system_prompt: &str,
    ) -> Result<String, StorageError> {
        let name = match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(requested) => normalize_name(requested)?,
            None => self.generate_name(message::now()),
        };

        let record = SavedRecord::snapshot(conversation, &name, system_prompt);
        let json = serde_json::to_string_pretty(&record)?;
        write_atomic(&self.record_path(&name), &json)?;

        tracing::info!(
            "Saved chat '{}' ({} turns) to {}",
            name,
            record.turns.len(),
            self.dir.display()
        );
        Ok(name)
    }

    /// Every readable record, most recently created first
    pub fn list(&self) -> Result<Vec<RecordSummary>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        // The directory itself may contain glob metacharacters
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = Path::new(&dir).join(format!("*.{RECORD_EXTENSION}"));
        let paths = glob::glob(&pattern.to_string_lossy()).map_err(|e| {
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let mut summaries = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping unreadable history entry: {}", e);
                    continue;
                }
            };
            match read_summary(&path) {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!("Listed {} saved chats", summaries.len());
        Ok(summaries)
    }

    pub fn load(&self, name: &str) -> Result<Conversation, StorageError> {
        let name = normalize_name(name)?;
        let path = self.record_path(&name);
        if !path.exists() {
            return Err(StorageError::NotFound(name));
        }

        let json = fs::read_to_string(&path)?;
        let record: SavedRecord = serde_json::from_str(&json)?;
        tracing::info!("Loaded chat '{}' ({} turns)", name, record.turns.len());
        Ok(record.into_conversation(name))
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    /// `chat_YYYYMMDD_HHMMSS_mmm`, suffixed `-2`, `-3`, ... if already taken
    fn generate_name(&self, at: Timestamp) -> String {
        let base = format!("chat_{}", at.format("%Y%m%d_%H%M%S_%3f"));
        if !self.record_path(&base).exists() {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.record_path(candidate).exists())
            .unwrap_or(base)
    }
}

/// Strip a trailing `.json` and reject names that are not plain file stems
fn normalize_name(raw: &str) -> Result<String, StorageError> {
    let trimmed = raw.trim();
    let stem = trimmed.strip_suffix(".json").unwrap_or(trimmed);
    if NAME_PATTERN.is_match(stem) {
        Ok(stem.to_string())
    } else {
        Err(StorageError::InvalidName(raw.to_string()))
    }
}

/// Summaries are named by file stem, the key `load` looks records up by
fn read_summary(path: &Path) -> Result<RecordSummary, StorageError> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| StorageError::InvalidName(path.display().to_string()))?;
    let json = fs::read_to_string(path)?;
    let size_bytes = json.len() as u64;
    let record: SavedRecord = serde_json::from_str(&json)?;
    Ok(RecordSummary {
        name,
        turn_count: record.turns.len(),
        created_at: record.created_at,
        saved_at: record.saved_at,
        size_bytes,
    })
}
