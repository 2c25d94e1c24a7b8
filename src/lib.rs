//! Quire - local-first conversation store library
//!
//! Quire keeps chat sessions on the local device and mirrors them,
//! best-effort, to a remote store scoped by an anonymous identity token.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session and message types, ordering, capping and titles
//! - `storage`: Key-value backends, the local session store and schema checks
//! - `identity`: Identity token generation, import and export
//! - `remote`: Remote mirror trait and its HTTP, in-memory and offline adapters
//! - `sync`: Session synchronizer, merge strategies and the remote outbox
//! - `ratelimit`: FIFO admission gate for outbound API calls
//! - `literature`: Rate-limited paper search client
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```
//! use quire::remote::InMemoryMirror;
//! use quire::storage::{LocalSessionStore, MemoryBackend};
//! use quire::sync::{SessionSynchronizer, SyncOptions};
//! use std::sync::Arc;
//!
//! let store = LocalSessionStore::new(Arc::new(MemoryBackend::new()));
//! let sync = SessionSynchronizer::open(
//!     store,
//!     Arc::new(InMemoryMirror::new()),
//!     "fp_example",
//!     SyncOptions::default(),
//! )
//! .unwrap();
//! let id = sync.create_session().unwrap();
//! sync.rename_session(&id, "Oncology Notes").unwrap();
//! assert_eq!(sync.sessions()[0].title, "Oncology Notes");
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod literature;
pub mod ratelimit;
pub mod remote;
pub mod session;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use error::{QuireError, Result};
pub use identity::IdentityProvider;
pub use ratelimit::RateLimiter;
pub use session::{ChatMessage, ChatSession, Role};
pub use sync::{SessionSynchronizer, SyncOptions, SyncState};
