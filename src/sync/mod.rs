//! Session synchronizer
//!
//! The synchronizer owns the in-memory session collection. Every command
//! first mutates the collection and the local store synchronously, then
//! queues the matching remote mutation on the [`Outbox`]. Callers never
//! wait on the network for correctness, only for cross-device durability.
//!
//! Startup is two-phase: [`SessionSynchronizer::open`] loads the local
//! store immediately, and [`SessionSynchronizer::pull_remote`] (usually via
//! [`SessionSynchronizer::spawn_initial_sync`]) fetches the remote copy and
//! merges it in with the configured [`ConflictStrategy`]. A failed fetch
//! leaves the local data untouched and is only logged.

use crate::error::{QuireError, Result};
use crate::remote::{RemoteMirror, RemoteSessionRecord};
use crate::session::{
    derive_title, enforce_cap, group_by_day, new_session_id, sort_sessions, ChatMessage,
    ChatSession, DayBucket,
};
use crate::storage::LocalSessionStore;
use chrono::{FixedOffset, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod merge;
pub mod outbox;

pub use merge::{
    merge_sessions, same_content, strategy_from_name, ConflictStrategy, MergeResult, NewestWins,
    RemoteWins,
};
pub use outbox::{
    DrainSummary, OpStatus, Outbox, OutboxEntry, OutboxWorker, Removals, RemoteOp,
};

/// Default cap on retained sessions
pub const DEFAULT_MAX_SESSIONS: usize = 50;

/// Title given to a session created by "new chat"
pub const NEW_SESSION_TITLE: &str = "New Chat";

/// Where a session stands relative to the remote mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Only known locally, or its last remote mutation failed
    LocalOnly,
    /// A remote mutation is queued or in flight
    Syncing,
    /// The remote store holds the same content
    Synced,
    /// Both sides differed at the last merge; the strategy picked a winner
    Diverged,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::LocalOnly => write!(f, "local-only"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::Diverged => write!(f, "diverged"),
        }
    }
}

/// Result of a remote pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote sessions were fetched and merged
    Merged {
        /// Number of remote sessions fetched
        fetched: usize,
        /// Sessions present on both sides with different content
        conflicts: usize,
        /// Sessions dropped by the cap
        evicted: usize,
    },
    /// The remote store could not be reached; local data is unchanged
    Unavailable {
        /// Error message of the failed fetch
        reason: String,
    },
    /// The identity changed, or every session was deleted, while the fetch
    /// was running; result discarded
    Stale,
}

/// Tunables for a synchronizer
pub struct SyncOptions {
    /// Cap enforced at every insertion point
    pub max_sessions: usize,
    /// Extra sends of a failed remote mutation
    pub retry_attempts: u32,
    /// Merge policy for sessions present on both sides
    pub strategy: Box<dyn ConflictStrategy>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            retry_attempts: 0,
            strategy: Box::new(RemoteWins),
        }
    }
}

struct SyncInner {
    sessions: Vec<ChatSession>,
    current_id: Option<String>,
    fingerprint: String,
    merge_states: HashMap<String, SyncState>,
    merged_through: u64,
}

impl SyncInner {
    fn commit(&mut self, sessions: Vec<ChatSession>, removed: &[String]) {
        self.sessions = sessions;
        for id in removed {
            self.merge_states.remove(id);
            if self.current_id.as_deref() == Some(id.as_str()) {
                self.current_id = None;
            }
        }
    }
}

/// Local-first session store mirrored to a remote store
pub struct SessionSynchronizer {
    local: LocalSessionStore,
    mirror: Arc<dyn RemoteMirror>,
    outbox: Arc<Outbox>,
    strategy: Box<dyn ConflictStrategy>,
    max_sessions: usize,
    inner: Mutex<SyncInner>,
}

impl SessionSynchronizer {
    /// Load the local store and build a synchronizer
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns an error only when the storage medium is unavailable.
    pub fn open(
        local: LocalSessionStore,
        mirror: Arc<dyn RemoteMirror>,
        fingerprint: impl Into<String>,
        options: SyncOptions,
    ) -> Result<Self> {
        let mut sessions = local.load_all()?;
        sort_sessions(&mut sessions);
        tracing::info!("Loaded {} local sessions", sessions.len());

        Ok(Self {
            local,
            mirror,
            outbox: Arc::new(Outbox::new(options.retry_attempts)),
            strategy: options.strategy,
            max_sessions: options.max_sessions.max(1),
            inner: Mutex::new(SyncInner {
                sessions,
                current_id: None,
                fingerprint: fingerprint.into(),
                merge_states: HashMap::new(),
                merged_through: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All sessions, pinned first then most recent first
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.lock().sessions.clone()
    }

    /// One session by id
    pub fn session(&self, id: &str) -> Option<ChatSession> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Sessions grouped by calendar day in `offset`, newest day first
    pub fn sessions_by_day(&self, offset: FixedOffset) -> Vec<DayBucket> {
        group_by_day(&self.lock().sessions, offset)
    }

    /// Id of the open session
    pub fn current_session_id(&self) -> Option<String> {
        self.lock().current_id.clone()
    }

    /// Identity token used for remote calls
    pub fn fingerprint(&self) -> String {
        self.lock().fingerprint.clone()
    }

    /// Cap on retained sessions
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Name of the active conflict strategy
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Messages cached in the active-history slot
    pub fn active_history(&self) -> Result<Vec<ChatMessage>> {
        self.local.load_active_history()
    }

    /// Outbox of remote mutations
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Create an empty session, make it current and return its id
    pub fn create_session(&self) -> Result<String> {
        let mut inner = self.lock();
        let session = ChatSession::empty(new_session_id(), NEW_SESSION_TITLE, Utc::now());
        let id = session.id.clone();

        let mut sessions = inner.sessions.clone();
        sessions.insert(0, session.clone());
        let evicted = self.settle(&mut sessions);
        self.local.persist_all(&sessions)?;
        self.local.clear_active_history()?;
        inner.commit(sessions, &evicted);
        inner.current_id = Some(id.clone());

        tracing::debug!("Created session {}", id);
        self.enqueue_upsert(&inner, &session);
        Ok(id)
    }

    /// Open a session: copy its messages into the active-history slot
    ///
    /// Purely local; remote copies are only pulled in bulk.
    ///
    /// # Errors
    ///
    /// Returns `QuireError::SessionNotFound` for an unknown id.
    pub fn load_session(&self, id: &str) -> Result<Vec<ChatMessage>> {
        let mut inner = self.lock();
        let messages = inner
            .sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.messages.clone())
            .ok_or_else(|| QuireError::SessionNotFound(id.to_string()))?;

        self.local.save_active_history(&messages)?;
        inner.current_id = Some(id.to_string());
        Ok(messages)
    }

    /// Delete a session; returns `false` when no such session exists
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let mut inner = self.lock();
        if !inner.sessions.iter().any(|s| s.id == id) {
            return Ok(false);
        }
        let sessions: Vec<ChatSession> = inner
            .sessions
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();

        let was_current = inner.current_id.as_deref() == Some(id);
        if was_current {
            self.local.clear_active_history()?;
        }
        if sessions.is_empty() {
            self.local.clear_sessions()?;
        } else {
            self.local.persist_all(&sessions)?;
        }
        inner.commit(sessions, &[id.to_string()]);

        tracing::debug!("Deleted session {}", id);
        self.outbox.enqueue(RemoteOp::Delete { id: id.to_string() });
        Ok(true)
    }

    /// Change a session's title
    ///
    /// # Errors
    ///
    /// Returns `QuireError::SessionNotFound` for an unknown id.
    pub fn rename_session(&self, id: &str, title: &str) -> Result<()> {
        self.update_session(id, |session| session.title = title.to_string())
    }

    /// Pin or unpin a session
    ///
    /// # Errors
    ///
    /// Returns `QuireError::SessionNotFound` for an unknown id.
    pub fn pin_session(&self, id: &str, pinned: bool) -> Result<()> {
        self.update_session(id, |session| session.pinned = Some(pinned))
    }

    fn update_session(&self, id: &str, apply: impl FnOnce(&mut ChatSession)) -> Result<()> {
        let mut inner = self.lock();
        let mut sessions = inner.sessions.clone();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| QuireError::SessionNotFound(id.to_string()))?;
        apply(session);
        let updated = session.clone();

        sort_sessions(&mut sessions);
        self.local.persist_all(&sessions)?;
        inner.sessions = sessions;
        self.enqueue_upsert(&inner, &updated);
        Ok(())
    }

    /// Delete every session locally and, for the current identity, remotely
    pub fn delete_all(&self) -> Result<()> {
        let mut inner = self.lock();
        self.local.clear_all()?;
        inner.sessions.clear();
        inner.current_id = None;
        inner.merge_states.clear();

        tracing::info!("Deleted all sessions");
        self.outbox.enqueue(RemoteOp::DeleteAll {
            fingerprint: inner.fingerprint.clone(),
        });
        Ok(())
    }

    /// Persist the open conversation after a model turn
    ///
    /// A list with one message or fewer (the greeting alone) is ignored and
    /// `None` is returned. Otherwise the current session is updated, or a
    /// new one is minted when none is open, and its id is returned. The
    /// title is re-derived from the first user message; the pinned flag of
    /// an existing session is kept.
    pub fn save_current_session(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        if messages.len() <= 1 {
            return Ok(None);
        }

        let mut inner = self.lock();
        let now = Utc::now();
        let id = inner.current_id.clone().unwrap_or_else(new_session_id);
        let pinned = inner
            .sessions
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.pinned);

        let session = ChatSession {
            id: id.clone(),
            title: derive_title(messages, now),
            messages: messages.to_vec(),
            timestamp: now,
            pinned,
        };

        let mut sessions = inner.sessions.clone();
        match sessions.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.insert(0, session.clone()),
        }
        let evicted = self.settle(&mut sessions);
        self.local.persist_all(&sessions)?;
        self.local.save_active_history(messages)?;
        inner.commit(sessions, &evicted);
        inner.current_id = Some(id.clone());

        self.enqueue_upsert(&inner, &session);
        Ok(Some(id))
    }

    /// Fetch the remote copy for the current identity and merge it in
    ///
    /// Remote failures are logged and reported as
    /// [`PullOutcome::Unavailable`]; only local storage failures are errors.
    pub async fn pull_remote(&self) -> Result<PullOutcome> {
        let fingerprint = self.fingerprint();
        let since = self.outbox.last_seq();
        let records = match self.mirror.load_sessions(&fingerprint).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Remote fetch failed, continuing with local data: {}", e);
                return Ok(PullOutcome::Unavailable {
                    reason: e.to_string(),
                });
            }
        };

        let mut inner = self.lock();
        if inner.fingerprint != fingerprint {
            tracing::debug!("Discarding remote fetch for a replaced identity");
            return Ok(PullOutcome::Stale);
        }

        // Deletes issued during the fetch must not be undone by it.
        let removals = self.outbox.removals_after(since);
        if removals.all {
            tracing::debug!("Discarding remote fetch overtaken by a delete-all");
            return Ok(PullOutcome::Stale);
        }

        let fetched = records.len();
        let remote: Vec<ChatSession> = records
            .into_iter()
            .filter(|r| !removals.ids.contains(&r.id))
            .map(RemoteSessionRecord::into_session)
            .collect();
        let remote_by_id: HashMap<String, ChatSession> =
            remote.iter().map(|s| (s.id.clone(), s.clone())).collect();
        let merged = merge_sessions(
            inner.sessions.clone(),
            remote,
            self.strategy.as_ref(),
            self.max_sessions,
        );
        self.local.persist_all(&merged.sessions)?;

        inner.sessions = merged.sessions;
        inner.merge_states = merged.states;
        inner.merged_through = self.outbox.last_seq();

        // Queued upserts for a conflict are only still wanted if the local copy won.
        for id in &merged.conflicts {
            let Some(winner) = inner.sessions.iter().find(|s| &s.id == id).cloned() else {
                continue;
            };
            let remote_won = remote_by_id
                .get(id)
                .map(|r| same_content(r, &winner))
                .unwrap_or(false);
            if remote_won {
                self.outbox.discard_pending_upserts(id);
            } else {
                self.enqueue_upsert(&inner, &winner);
            }
        }

        if let Some(current) = inner.current_id.clone() {
            match inner.sessions.iter().find(|s| s.id == current) {
                Some(session) => self.local.save_active_history(&session.messages)?,
                None => inner.current_id = None,
            }
        }

        tracing::info!(
            "Merged {} remote sessions ({} conflicts resolved by {}, {} evicted)",
            fetched,
            merged.conflicts.len(),
            self.strategy.name(),
            merged.evicted.len()
        );
        Ok(PullOutcome::Merged {
            fetched,
            conflicts: merged.conflicts.len(),
            evicted: merged.evicted.len(),
        })
    }

    /// Re-read the local store and switch identity
    ///
    /// Called after an accepted identity import; follow with
    /// [`SessionSynchronizer::pull_remote`].
    pub fn reload(&self, fingerprint: impl Into<String>) -> Result<()> {
        let mut sessions = self.local.load_all()?;
        sort_sessions(&mut sessions);

        let mut inner = self.lock();
        inner.sessions = sessions;
        inner.current_id = None;
        inner.merge_states.clear();
        inner.fingerprint = fingerprint.into();
        tracing::info!("Reloaded {} local sessions for new identity", inner.sessions.len());
        Ok(())
    }

    /// Where a session stands relative to the remote mirror
    pub fn sync_state(&self, id: &str) -> SyncState {
        let inner = self.lock();
        let latest = self.outbox.latest_for(id);
        let from_outbox = latest.as_ref().map(|entry| match entry.status {
            OpStatus::Pending | OpStatus::InFlight => SyncState::Syncing,
            OpStatus::Confirmed | OpStatus::Superseded => SyncState::Synced,
            OpStatus::Failed => SyncState::LocalOnly,
        });

        let newer_than_merge = latest
            .as_ref()
            .map(|entry| entry.seq > inner.merged_through)
            .unwrap_or(false);
        if newer_than_merge {
            return from_outbox.unwrap_or(SyncState::LocalOnly);
        }
        inner
            .merge_states
            .get(id)
            .copied()
            .or(from_outbox)
            .unwrap_or(SyncState::LocalOnly)
    }

    /// Send every queued remote mutation now
    pub async fn flush(&self) -> DrainSummary {
        self.outbox.drain(self.mirror.as_ref()).await
    }

    /// Start draining the outbox in the background
    pub fn spawn_worker(&self, cancel: CancellationToken) -> JoinHandle<()> {
        OutboxWorker::spawn(self.outbox.clone(), self.mirror.clone(), cancel)
    }

    /// Run [`SessionSynchronizer::pull_remote`] in the background
    pub fn spawn_initial_sync(self: &Arc<Self>) -> JoinHandle<Result<PullOutcome>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.pull_remote().await })
    }

    fn settle(&self, sessions: &mut Vec<ChatSession>) -> Vec<String> {
        sort_sessions(sessions);
        let evicted = enforce_cap(sessions, self.max_sessions);
        for id in &evicted {
            tracing::debug!("Evicted session {} over cap {}", id, self.max_sessions);
        }
        evicted
    }

    fn enqueue_upsert(&self, inner: &SyncInner, session: &ChatSession) {
        let record = RemoteSessionRecord::from_session(session, &inner.fingerprint);
        self.outbox.enqueue(RemoteOp::Upsert(record));
    }
}
