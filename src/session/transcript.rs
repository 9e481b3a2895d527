//! Transcript store
//!
//! The in-memory, append-only turn sequence of the active conversation.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::message::{self, Role, Timestamp, Turn};

/// Rough characters-per-token ratio used for context estimates
pub const CHARS_PER_TOKEN: usize = 4;

/// The active chat: ordered turns plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Set once the conversation has been saved or loaded under a name
    pub name: Option<String>,
    #[serde(with = "message::zoned")]
    pub created_at: Timestamp,
    turns: Vec<Turn>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Conversation {
    pub fn new(name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: message::now(),
            turns: Vec::new(),
        }
    }

    /// Rebuild a conversation from persisted parts
    pub fn from_parts(
        id: String,
        name: Option<String>,
        created_at: Timestamp,
        turns: Vec<Turn>,
    ) -> Self {
        Self {
            id,
            name,
            created_at,
            turns,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Drop every turn and start over as a fresh, unnamed conversation
    pub fn clear(&mut self) {
        *self = Self::new(None);
    }

    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }

    /// The last `n` turns in chat order; all of them if `n` exceeds the length
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn total_chars(&self) -> usize {
        self.turns.iter().map(|t| t.text.chars().count()).sum()
    }

    pub fn stats(&self) -> TranscriptStats {
        let total_chars = self.total_chars();
        let span = match (self.turns.first(), self.turns.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        };

        TranscriptStats {
            total_turns: self.turns.len(),
            user_turns: self.count_by_role(Role::User),
            assistant_turns: self.count_by_role(Role::Assistant),
            total_chars,
            estimated_tokens: total_chars / CHARS_PER_TOKEN,
            span,
        }
    }
}

/// Counts derived from the transcript for `/stats`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptStats {
    pub total_turns: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub total_chars: usize,
    pub estimated_tokens: usize,
    /// Time between the first and the last turn
    pub span: Duration,
}
