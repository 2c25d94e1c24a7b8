//! Schema validation for persisted blobs
//!
//! Decoding is all-or-nothing: a single malformed entry rejects the whole
//! collection with `QuireError::Schema`. Callers decide whether that is
//! fatal; the local store treats it as an empty read.

use crate::error::{QuireError, Result};
use crate::session::{ChatMessage, ChatSession};
use std::collections::HashSet;

/// Decode and validate a JSON array of sessions
///
/// # Errors
///
/// Returns `QuireError::Schema` when the blob is not a JSON array of
/// well-formed sessions, a session or message id is blank, or two
/// sessions share an id.
pub fn parse_sessions(raw: &str) -> Result<Vec<ChatSession>> {
    let sessions: Vec<ChatSession> = serde_json::from_str(raw)
        .map_err(|e| QuireError::Schema(format!("sessions blob: {}", e)))?;
    validate_sessions(&sessions)?;
    Ok(sessions)
}

/// Decode and validate a JSON array of messages
///
/// # Errors
///
/// Returns `QuireError::Schema` when the blob is malformed or a message
/// id is blank.
pub fn parse_messages(raw: &str) -> Result<Vec<ChatMessage>> {
    let messages: Vec<ChatMessage> = serde_json::from_str(raw)
        .map_err(|e| QuireError::Schema(format!("messages blob: {}", e)))?;
    validate_messages(&messages, "active history")?;
    Ok(messages)
}

/// Check semantic constraints serde cannot express
pub fn validate_sessions(sessions: &[ChatSession]) -> Result<()> {
    let mut seen = HashSet::with_capacity(sessions.len());
    for session in sessions {
        if session.id.trim().is_empty() {
            return Err(QuireError::Schema("session with blank id".to_string()).into());
        }
        if !seen.insert(session.id.as_str()) {
            return Err(QuireError::Schema(format!("duplicate session id {}", session.id)).into());
        }
        validate_messages(&session.messages, &session.id)?;
    }
    Ok(())
}

fn validate_messages(messages: &[ChatMessage], owner: &str) -> Result<()> {
    if let Some(msg) = messages.iter().find(|m| m.id.trim().is_empty()) {
        return Err(QuireError::Schema(format!(
            "message with blank id in {} (role {})",
            owner, msg.role
        ))
        .into());
    }
    Ok(())
}
