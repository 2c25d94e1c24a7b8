//! Merging the local collection with a remote fetch
//!
//! Sessions are keyed by id. Local sessions are inserted first, then each
//! remote session either fills a gap or meets its local counterpart, in
//! which case a [`ConflictStrategy`] picks the survivor. The merged list is
//! re-sorted and capped.

use super::SyncState;
use crate::error::{QuireError, Result};
use crate::session::{enforce_cap, sort_sessions, ChatSession};
use std::collections::HashMap;

/// Picks the surviving copy when a session exists locally and remotely
pub trait ConflictStrategy: Send + Sync {
    /// Short identifier used in config and logs
    fn name(&self) -> &'static str;

    /// Return the copy to keep
    fn resolve(&self, local: ChatSession, remote: ChatSession) -> ChatSession;
}

/// The remote copy always wins
///
/// The remote store holds the durable cross-device record, so once it has
/// been fetched it overrides the local cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWins;

impl ConflictStrategy for RemoteWins {
    fn name(&self) -> &'static str {
        "remote_wins"
    }

    fn resolve(&self, _local: ChatSession, remote: ChatSession) -> ChatSession {
        remote
    }
}

/// The copy with the later `timestamp` wins; ties go to the remote copy
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestWins;

impl ConflictStrategy for NewestWins {
    fn name(&self) -> &'static str {
        "newest_wins"
    }

    fn resolve(&self, local: ChatSession, remote: ChatSession) -> ChatSession {
        if local.timestamp > remote.timestamp {
            local
        } else {
            remote
        }
    }
}

/// Look up a strategy by its config name
///
/// # Errors
///
/// Returns `QuireError::Config` for an unknown name.
pub fn strategy_from_name(name: &str) -> Result<Box<dyn ConflictStrategy>> {
    match name {
        "remote_wins" => Ok(Box::new(RemoteWins)),
        "newest_wins" => Ok(Box::new(NewestWins)),
        other => Err(QuireError::Config(format!(
            "Unknown conflict strategy: {}. Must be one of: remote_wins, newest_wins",
            other
        ))
        .into()),
    }
}

/// Outcome of a merge
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged, sorted and capped collection
    pub sessions: Vec<ChatSession>,
    /// Sync state of every surviving session
    pub states: HashMap<String, SyncState>,
    /// Ids dropped by the cap
    pub evicted: Vec<String>,
    /// Ids present on both sides with different content
    pub conflicts: Vec<String>,
}

/// Merge `remote` into `local`
pub fn merge_sessions(
    local: Vec<ChatSession>,
    remote: Vec<ChatSession>,
    strategy: &dyn ConflictStrategy,
    max_sessions: usize,
) -> MergeResult {
    let mut order: Vec<String> = Vec::with_capacity(local.len() + remote.len());
    let mut by_id: HashMap<String, ChatSession> = HashMap::new();
    let mut states: HashMap<String, SyncState> = HashMap::new();
    let mut conflicts = Vec::new();

    for session in local {
        if !by_id.contains_key(&session.id) {
            order.push(session.id.clone());
        }
        states.insert(session.id.clone(), SyncState::LocalOnly);
        by_id.insert(session.id.clone(), session);
    }

    for session in remote {
        let id = session.id.clone();
        match by_id.remove(&id) {
            Some(existing) if same_content(&existing, &session) => {
                states.insert(id.clone(), SyncState::Synced);
                by_id.insert(id, strategy.resolve(existing, session));
            }
            Some(existing) => {
                states.insert(id.clone(), SyncState::Diverged);
                conflicts.push(id.clone());
                by_id.insert(id, strategy.resolve(existing, session));
            }
            None => {
                order.push(id.clone());
                states.insert(id.clone(), SyncState::Synced);
                by_id.insert(id, session);
            }
        }
    }

    let mut sessions: Vec<ChatSession> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    sort_sessions(&mut sessions);
    let evicted = enforce_cap(&mut sessions, max_sessions);
    for id in &evicted {
        states.remove(id);
    }

    MergeResult {
        sessions,
        states,
        evicted,
        conflicts,
    }
}

/// Content equality that treats an absent pinned flag as unpinned
pub fn same_content(a: &ChatSession, b: &ChatSession) -> bool {
    a.id == b.id
        && a.title == b.title
        && a.timestamp == b.timestamp
        && a.is_pinned() == b.is_pinned()
        && a.messages == b.messages
}
