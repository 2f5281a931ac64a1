// Message records and the derived session summary

use serde::{Deserialize, Serialize};

/// Speaker tag for a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Caller-supplied message payload, before the store stamps it.
///
/// The store owns key assignment and timestamping; callers own only the
/// role and the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Store-assigned surrogate key, unique and monotonically increasing.
    pub id: u64,
    /// Grouping key for the conversation this message belongs to.
    /// Immutable after creation.
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch, stamped at save time.
    pub timestamp: u64,
}

/// Preview line for the session list.
///
/// Derived on demand from the message collection, never persisted; stale
/// as soon as a message is saved or a session is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Latest activity in the session.
    pub timestamp: u64,
    /// Text of the earliest user message, or of the session's first
    /// stored record when no user message exists.
    pub content: String,
    pub role: Role,
}
