//! Remote mirror boundary
//!
//! The remote mirror is an external durable store that receives a
//! best-effort copy of every session, scoped by identity token. This crate
//! consumes it through the [`RemoteMirror`] trait and assumes:
//!
//! - `upsert_session` fully replaces the record with the same `id`
//! - `load_sessions` only returns records of the supplied identity
//!
//! Any rejected call is treated as the remote being unavailable.

use crate::error::{QuireError, Result};
use crate::session::{ChatMessage, ChatSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub mod http;

pub use http::HttpMirror;

/// A session as stored by the remote mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSessionRecord {
    /// Session id, the upsert key
    pub id: String,
    /// Session title
    pub title: String,
    /// Full message list
    pub messages: Vec<ChatMessage>,
    /// Last-modified time of the session
    pub updated_at: DateTime<Utc>,
    /// Pinned flag
    #[serde(default)]
    pub pinned: bool,
    /// Identity token owning the record
    #[serde(default)]
    pub fingerprint: String,
}

impl RemoteSessionRecord {
    /// Build the upsert payload for a local session
    pub fn from_session(session: &ChatSession, fingerprint: &str) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            messages: session.messages.clone(),
            updated_at: session.timestamp,
            pinned: session.is_pinned(),
            fingerprint: fingerprint.to_string(),
        }
    }

    /// Convert a fetched record into a local session
    pub fn into_session(self) -> ChatSession {
        ChatSession {
            id: self.id,
            title: self.title,
            messages: self.messages,
            timestamp: self.updated_at,
            pinned: Some(self.pinned),
        }
    }
}

/// Operations the synchronizer needs from the remote store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Fetch every session owned by `fingerprint`
    async fn load_sessions(&self, fingerprint: &str) -> Result<Vec<RemoteSessionRecord>>;

    /// Insert or fully replace the record with `record.id`
    async fn upsert_session(&self, record: &RemoteSessionRecord) -> Result<()>;

    /// Delete one session by id
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// Delete every session owned by `fingerprint`
    async fn delete_all_sessions(&self, fingerprint: &str) -> Result<()>;
}

/// A call received by an [`InMemoryMirror`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCall {
    /// `load_sessions(fingerprint)`
    Load(String),
    /// `upsert_session` for a session id
    Upsert(String),
    /// `delete_session(id)`
    Delete(String),
    /// `delete_all_sessions(fingerprint)`
    DeleteAll(String),
}

#[derive(Debug, Default)]
struct InMemoryState {
    records: HashMap<String, RemoteSessionRecord>,
    calls: Vec<MirrorCall>,
    failing: bool,
}

/// In-process mirror with failure injection
///
/// Clones share state, so a test can keep a handle for assertions while
/// the synchronizer owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMirror {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryMirror {
    /// Create an empty mirror
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    ///
    /// Failing calls are still recorded in [`InMemoryMirror::calls`].
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = failing;
        }
    }

    /// Seed a record directly, bypassing call recording
    pub fn insert(&self, record: RemoteSessionRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.records.insert(record.id.clone(), record);
        }
    }

    /// Stored record by id
    pub fn get(&self, id: &str) -> Option<RemoteSessionRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.records.get(id).cloned())
    }

    /// Number of stored records across all identities
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Whether no records are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<MirrorCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn record_call<T>(
        &self,
        call: MirrorCall,
        f: impl FnOnce(&mut HashMap<String, RemoteSessionRecord>) -> T,
    ) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QuireError::Remote("in-memory mirror lock poisoned".to_string()))?;
        state.calls.push(call);
        if state.failing {
            return Err(QuireError::Remote("in-memory mirror is failing".to_string()).into());
        }
        Ok(f(&mut state.records))
    }
}

#[async_trait]
impl RemoteMirror for InMemoryMirror {
    async fn load_sessions(&self, fingerprint: &str) -> Result<Vec<RemoteSessionRecord>> {
        self.record_call(MirrorCall::Load(fingerprint.to_string()), |records| {
            let mut owned: Vec<RemoteSessionRecord> = records
                .values()
                .filter(|r| r.fingerprint == fingerprint)
                .cloned()
                .collect();
            owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            owned
        })
    }

    async fn upsert_session(&self, record: &RemoteSessionRecord) -> Result<()> {
        self.record_call(MirrorCall::Upsert(record.id.clone()), |records| {
            records.insert(record.id.clone(), record.clone());
        })
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.record_call(MirrorCall::Delete(id.to_string()), |records| {
            records.remove(id);
        })
    }

    async fn delete_all_sessions(&self, fingerprint: &str) -> Result<()> {
        self.record_call(MirrorCall::DeleteAll(fingerprint.to_string()), |records| {
            records.retain(|_, r| r.fingerprint != fingerprint);
        })
    }
}

/// Mirror used when remote sync is disabled; every call is rejected
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineMirror;

impl OfflineMirror {
    fn unavailable<T>() -> Result<T> {
        Err(QuireError::Remote("remote sync is disabled".to_string()).into())
    }
}

#[async_trait]
impl RemoteMirror for OfflineMirror {
    async fn load_sessions(&self, _fingerprint: &str) -> Result<Vec<RemoteSessionRecord>> {
        Self::unavailable()
    }

    async fn upsert_session(&self, _record: &RemoteSessionRecord) -> Result<()> {
        Self::unavailable()
    }

    async fn delete_session(&self, _id: &str) -> Result<()> {
        Self::unavailable()
    }

    async fn delete_all_sessions(&self, _fingerprint: &str) -> Result<()> {
        Self::unavailable()
    }
}
