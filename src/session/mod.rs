//! Conversation data model
//!
//! A [`ChatSession`] is the unit of persistence, synchronization and merge.
//! It owns an ordered list of [`ChatMessage`]s, which are never mutated
//! once appended.
//!
//! Wire format is camelCase JSON with RFC 3339 timestamps, shared by the
//! local store and the active-history slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub mod ordering;

pub use ordering::{derive_title, enforce_cap, group_by_day, sort_sessions, DayBucket};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human asking questions
    User,
    /// The assistant model
    Model,
    /// System or tool-generated notices
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single message within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: String,
    /// Who produced the message
    pub role: Role,
    /// Message body
    pub content: String,
    /// When the message was produced
    pub timestamp: DateTime<Utc>,
    /// Set when the message reports a failed model call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Opaque payload attached by tools (graph results, citations, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_data: Option<serde_json::Value>,
    /// Ordered reasoning/tool trace lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

impl ChatMessage {
    /// Create a message with a fresh id and the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_error: None,
            related_data: None,
            trace: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a model message
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A titled, ordered conversation persisted as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Opaque, time-derived identifier, unique within the local store
    pub id: String,
    /// Display title
    pub title: String,
    /// Messages in conversation order
    pub messages: Vec<ChatMessage>,
    /// Last-modified marker
    pub timestamp: DateTime<Utc>,
    /// Pinned sessions are listed before unpinned ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

impl ChatSession {
    /// Create an empty, unpinned session
    pub fn empty(id: impl Into<String>, title: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            timestamp,
            pinned: None,
        }
    }

    /// Whether the session is pinned (absent flag means unpinned)
    pub fn is_pinned(&self) -> bool {
        self.pinned.unwrap_or(false)
    }
}

/// Mint a new session id
///
/// ULIDs embed their creation time and sort lexicographically by it, so
/// ids stay time-derived while remaining unique across rapid creations.
pub fn new_session_id() -> String {
    Ulid::new().to_string()
}

/// Mint a new message id
pub fn new_message_id() -> String {
    Ulid::new().to_string()
}
