//! Outbox of pending remote mutations
//!
//! Every local mutation enqueues the matching remote operation here instead
//! of firing an unawaited call. A single drainer sends entries strictly in
//! enqueue order, one at a time, so for any session id the mutation issued
//! last is the one the remote store receives last.
//!
//! A pending upsert is marked `Superseded` (and never sent) when a newer
//! upsert or delete for the same id is enqueued. Failed sends are retried
//! immediately up to `retry_attempts` extra times, then marked `Failed`;
//! no backoff and no deferred retry.

use crate::error::Result;
use crate::remote::{RemoteMirror, RemoteSessionRecord};
use metrics::increment_counter;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Number of finished entries kept for inspection
pub const HISTORY_LIMIT: usize = 256;

/// A remote mutation
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    /// Insert or fully replace a session
    Upsert(RemoteSessionRecord),
    /// Delete one session
    Delete {
        /// Session id
        id: String,
    },
    /// Delete every session of an identity
    DeleteAll {
        /// Identity token
        fingerprint: String,
    },
}

impl RemoteOp {
    /// Session id the operation targets, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            RemoteOp::Upsert(record) => Some(&record.id),
            RemoteOp::Delete { id } => Some(id),
            RemoteOp::DeleteAll { .. } => None,
        }
    }

    /// Metric/log label
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteOp::Upsert(_) => "upsert",
            RemoteOp::Delete { .. } => "delete",
            RemoteOp::DeleteAll { .. } => "delete_all",
        }
    }

    async fn apply(&self, mirror: &dyn RemoteMirror) -> Result<()> {
        match self {
            RemoteOp::Upsert(record) => mirror.upsert_session(record).await,
            RemoteOp::Delete { id } => mirror.delete_session(id).await,
            RemoteOp::DeleteAll { fingerprint } => mirror.delete_all_sessions(fingerprint).await,
        }
    }
}

/// Lifecycle of an outbox entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Waiting to be sent
    Pending,
    /// Currently being sent
    InFlight,
    /// The remote store accepted it
    Confirmed,
    /// Every attempt was rejected
    Failed,
    /// Replaced by a newer operation for the same session before sending
    Superseded,
}

impl OpStatus {
    /// Whether the entry will not change any more
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            OpStatus::Confirmed | OpStatus::Failed | OpStatus::Superseded
        )
    }
}

/// One queued remote mutation and its observable state
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,
    /// The mutation
    pub op: RemoteOp,
    /// Current status
    pub status: OpStatus,
    /// Number of sends so far
    pub attempts: u32,
    /// Error of the last failed send
    pub last_error: Option<String>,
}

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Entries confirmed by the remote store
    pub confirmed: usize,
    /// Entries given up on
    pub failed: usize,
}

/// Session removals queued after some point in the outbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removals {
    /// Ids targeted by a `Delete`
    pub ids: HashSet<String>,
    /// Whether a `DeleteAll` was queued
    pub all: bool,
}

#[derive(Debug, Default)]
struct OutboxState {
    next_seq: u64,
    queue: VecDeque<OutboxEntry>,
    finished: VecDeque<OutboxEntry>,
}

impl OutboxState {
    fn supersede_upserts(&mut self, id: &str, by: u64) -> usize {
        let (stale, keep): (VecDeque<OutboxEntry>, VecDeque<OutboxEntry>) =
            std::mem::take(&mut self.queue).into_iter().partition(|e| {
                e.status == OpStatus::Pending
                    && matches!(&e.op, RemoteOp::Upsert(r) if r.id == id)
            });
        self.queue = keep;
        let count = stale.len();
        for mut entry in stale {
            tracing::debug!("Outbox entry {} superseded by {}", entry.seq, by);
            entry.status = OpStatus::Superseded;
            self.finish(entry);
        }
        count
    }

    fn finish(&mut self, entry: OutboxEntry) {
        self.finished.push_back(entry);
        while self.finished.len() > HISTORY_LIMIT {
            self.finished.pop_front();
        }
    }
}

/// Ordered queue of remote mutations with observable state
#[derive(Debug)]
pub struct Outbox {
    state: Mutex<OutboxState>,
    wake: Notify,
    drain_lock: tokio::sync::Mutex<()>,
    retry_attempts: u32,
}

impl Outbox {
    /// Create an outbox that re-sends a failed entry up to `retry_attempts` times
    pub fn new(retry_attempts: u32) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            wake: Notify::new(),
            drain_lock: tokio::sync::Mutex::new(()),
            retry_attempts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        // No section panics while the state is inconsistent; poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an operation and wake the drainer; returns its sequence number
    pub fn enqueue(&self, op: RemoteOp) -> u64 {
        let mut state = self.lock();
        state.next_seq += 1;
        let seq = state.next_seq;

        if let Some(id) = op.session_id() {
            state.supersede_upserts(id, seq);
        }

        tracing::debug!("Outbox enqueued {} #{}", op.kind(), seq);
        state.queue.push_back(OutboxEntry {
            seq,
            op,
            status: OpStatus::Pending,
            attempts: 0,
            last_error: None,
        });
        drop(state);
        self.wake.notify_one();
        seq
    }

    /// Drop pending upserts of a session without sending them
    ///
    /// Used after a merge replaced the local copy with the remote one.
    pub fn discard_pending_upserts(&self, session_id: &str) -> usize {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.supersede_upserts(session_id, seq)
    }

    /// Send every queued entry, in order, until the queue is empty
    ///
    /// Only one drain runs at a time; a concurrent caller waits for the
    /// running drain and then drains whatever is left.
    pub async fn drain(&self, mirror: &dyn RemoteMirror) -> DrainSummary {
        let _guard = self.drain_lock.lock().await;
        let mut summary = DrainSummary::default();

        loop {
            let (seq, op) = {
                let mut state = self.lock();
                let Some(entry) = state.queue.front_mut() else {
                    break;
                };
                entry.status = OpStatus::InFlight;
                entry.attempts += 1;
                (entry.seq, entry.op.clone())
            };

            let result = op.apply(mirror).await;

            let mut state = self.lock();
            let Some(pos) = state.queue.iter().position(|e| e.seq == seq) else {
                continue;
            };
            match result {
                Ok(()) => {
                    if let Some(mut entry) = state.queue.remove(pos) {
                        entry.status = OpStatus::Confirmed;
                        entry.last_error = None;
                        state.finish(entry);
                    }
                    summary.confirmed += 1;
                    increment_counter!(
                        "quire_remote_ops_total",
                        "op" => op.kind(),
                        "status" => "confirmed"
                    );
                }
                Err(e) => {
                    let retry = state.queue[pos].attempts <= self.retry_attempts;
                    state.queue[pos].last_error = Some(e.to_string());
                    if retry {
                        tracing::debug!("Retrying outbox entry {}: {}", seq, e);
                        state.queue[pos].status = OpStatus::Pending;
                    } else {
                        tracing::warn!(
                            "Remote {} #{} failed, continuing local-only: {}",
                            op.kind(),
                            seq,
                            e
                        );
                        if let Some(mut entry) = state.queue.remove(pos) {
                            entry.status = OpStatus::Failed;
                            state.finish(entry);
                        }
                        summary.failed += 1;
                        increment_counter!(
                            "quire_remote_ops_total",
                            "op" => op.kind(),
                            "status" => "failed"
                        );
                    }
                }
            }
        }

        summary
    }

    /// Wait until an entry is enqueued
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Number of entries not yet finished
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Highest sequence number handed out so far
    pub fn last_seq(&self) -> u64 {
        self.lock().next_seq
    }

    /// Deletes enqueued with a sequence number above `seq`
    pub fn removals_after(&self, seq: u64) -> Removals {
        let state = self.lock();
        let mut removals = Removals::default();
        for entry in state.queue.iter().chain(state.finished.iter()) {
            if entry.seq <= seq {
                continue;
            }
            match &entry.op {
                RemoteOp::Delete { id } => {
                    removals.ids.insert(id.clone());
                }
                RemoteOp::DeleteAll { .. } => removals.all = true,
                RemoteOp::Upsert(_) => {}
            }
        }
        removals
    }

    /// Status of an entry, if it is still queued or in the history
    pub fn status(&self, seq: u64) -> Option<OpStatus> {
        let state = self.lock();
        state
            .queue
            .iter()
            .chain(state.finished.iter())
            .find(|e| e.seq == seq)
            .map(|e| e.status)
    }

    /// Most recent non-superseded entry targeting a session
    pub fn latest_for(&self, session_id: &str) -> Option<OutboxEntry> {
        let state = self.lock();
        state
            .queue
            .iter()
            .chain(state.finished.iter())
            .filter(|e| e.status != OpStatus::Superseded)
            .filter(|e| e.op.session_id() == Some(session_id))
            .max_by_key(|e| e.seq)
            .cloned()
    }

    /// Snapshot of queued and finished entries, ordered by sequence
    pub fn entries(&self) -> Vec<OutboxEntry> {
        let state = self.lock();
        let mut entries: Vec<OutboxEntry> = state
            .queue
            .iter()
            .chain(state.finished.iter())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Finished entries that failed
    pub fn failed(&self) -> Vec<OutboxEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.status == OpStatus::Failed)
            .collect()
    }
}

/// Background task draining an outbox whenever work arrives
pub struct OutboxWorker;

impl OutboxWorker {
    /// Spawn the drain loop on the current tokio runtime
    ///
    /// The loop exits once `cancel` fires; entries still queued at that
    /// point stay queued.
    pub fn spawn(
        outbox: Arc<Outbox>,
        mirror: Arc<dyn RemoteMirror>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!("Outbox worker started");
            loop {
                outbox.drain(mirror.as_ref()).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = outbox.notified() => {}
                }
            }
            tracing::debug!("Outbox worker stopped");
        })
    }
}
