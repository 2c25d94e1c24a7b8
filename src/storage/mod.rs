//! Local persistence for sessions and identity
//!
//! Everything the client keeps on disk goes through a [`StorageBackend`]:
//! a tiny synchronous string key-value interface mirroring browser local
//! storage. The session collection, the active-history slot, the identity
//! token and the "identity shown" flag each live under their own key.
//!
//! Backends are injected, so tests use [`MemoryBackend`] while the binary
//! uses the durable [`SledBackend`].

use crate::error::Result;

pub mod backend;
pub mod local;
pub mod schema;

pub use backend::{MemoryBackend, SledBackend};
pub use local::LocalSessionStore;

/// Key holding the JSON array of all sessions
pub const SESSIONS_KEY: &str = "chatSessions";

/// Key holding the JSON array of messages of the open session
pub const ACTIVE_HISTORY_KEY: &str = "chatHistory";

/// Key holding the persisted identity token
pub const FINGERPRINT_KEY: &str = "userFingerprint";

/// Key holding `"true"`/`"false"` for whether the token was shown
pub const FINGERPRINT_SHOWN_KEY: &str = "fingerprintShown";

/// Synchronous string key-value storage
///
/// Errors from a backend mean the storage medium itself is unavailable;
/// callers let them propagate rather than masking the loss of persistence.
pub trait StorageBackend: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}
