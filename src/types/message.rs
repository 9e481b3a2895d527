//! Message types
//!
//! Defines chat turns, roles, and the fixed clock they are stamped with.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timezone every timestamp is expressed in, regardless of host locale.
pub const CHAT_TIMEZONE: Tz = chrono_tz::Europe::London;

/// Zoned timestamp used for turns and conversation metadata
pub type Timestamp = DateTime<Tz>;

/// Current time on the chat clock
pub fn now() -> Timestamp {
    Utc::now().with_timezone(&CHAT_TIMEZONE)
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt (only ever part of a prompt, never stored as a turn)
    System,
}

impl Role {
    /// Header name used by the chat template and the history display
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// A single utterance in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the speaker
    pub role: Role,
    /// What was said
    pub text: String,
    /// When the turn was created
    #[serde(with = "zoned")]
    pub timestamp: Timestamp,
}

impl Turn {
    /// Create a new turn stamped with the current time
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::at(role, text, now())
    }

    /// Create a turn with an explicit timestamp
    pub fn at(role: Role, text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Serde adapter storing zoned timestamps as RFC 3339 strings.
///
/// chrono only deserializes fixed-offset datetimes, so the value is parsed
/// with its offset and moved back onto the chat timezone.
pub mod zoned {
    use super::{Timestamp, CHAT_TIMEZONE};
    use chrono::{DateTime, SecondsFormat};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&CHAT_TIMEZONE))
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("Hello, world!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text, "Hello, world!");
        assert_eq!(turn.timestamp.timezone(), CHAT_TIMEZONE);
    }

    #[test]
    fn test_role_equality() {
        assert_eq!(Role::User, Role::User);
        assert_ne!(Role::User, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_timestamp_keeps_subsecond_precision() {
        let ts = CHAT_TIMEZONE
            .with_ymd_and_hms(2026, 7, 1, 12, 30, 0)
            .unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let turn = Turn::at(Role::Assistant, "Hi", ts);

        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("+01:00"), "summer time offset expected: {json}");

        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
        assert_eq!(back.timestamp.timezone(), CHAT_TIMEZONE);
    }

    #[test]
    fn test_foreign_offset_is_normalized() {
        let json = r#"{"role":"user","text":"x","timestamp":"2026-01-15T09:00:00-05:00"}"#;
        let turn: Turn = serde_json::from_str(json).unwrap();
        assert_eq!(turn.timestamp.to_rfc3339(), "2026-01-15T14:00:00+00:00");
    }
}
