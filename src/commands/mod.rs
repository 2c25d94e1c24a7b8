/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `sessions` - List and mutate chat sessions
- `identity` - Show, export and import the identity token
- `sync`     - Pull, merge and push against the remote mirror
- `search`   - Rate-limited literature lookup

Handlers share an [`AppContext`] that wires the storage backend, identity
provider and synchronizer from the loaded configuration.
*/

use crate::config::Config;
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::remote::{HttpMirror, OfflineMirror, RemoteMirror};
use crate::storage::{LocalSessionStore, MemoryBackend, SledBackend, StorageBackend};
use crate::sync::{strategy_from_name, DrainSummary, PullOutcome, SessionSynchronizer, SyncOptions};
use std::sync::Arc;

pub mod identity;
pub mod search;
pub mod sessions;
pub mod sync;

/// Everything a session or identity command needs
pub struct AppContext {
    /// Loaded configuration
    pub config: Config,
    /// Identity token provider
    pub identity: IdentityProvider,
    /// Session synchronizer bound to the current identity
    pub sync: Arc<SessionSynchronizer>,
}

impl AppContext {
    /// Open storage and build the synchronizer for `config`
    pub fn open(config: Config) -> Result<Self> {
        let backend = open_backend(&config)?;
        let identity = IdentityProvider::new(backend.clone())?;
        let fingerprint = identity.get_identity()?;

        let options = SyncOptions {
            max_sessions: config.store.max_sessions,
            retry_attempts: config.remote.retry_attempts,
            strategy: strategy_from_name(&config.remote.conflict_strategy)?,
        };
        let sync = SessionSynchronizer::open(
            LocalSessionStore::new(backend),
            open_mirror(&config)?,
            fingerprint,
            options,
        )?;

        Ok(Self {
            config,
            identity,
            sync: Arc::new(sync),
        })
    }

    /// Whether the remote mirror is configured
    pub fn remote_enabled(&self) -> bool {
        self.config.remote.enabled
    }

    /// Merge the remote copy in, when remote sync is enabled
    pub async fn pull(&self) -> Result<Option<PullOutcome>> {
        if !self.remote_enabled() {
            return Ok(None);
        }
        self.sync.pull_remote().await.map(Some)
    }

    /// Send queued remote mutations, when remote sync is enabled
    pub async fn finish(&self) -> DrainSummary {
        if !self.remote_enabled() {
            return DrainSummary::default();
        }
        let summary = self.sync.flush().await;
        if summary.failed > 0 {
            tracing::warn!(
                "{} remote changes failed; they are kept locally",
                summary.failed
            );
        }
        summary
    }
}

fn open_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    match config.store.backend.as_str() {
        "memory" => {
            tracing::debug!("Using in-memory storage backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
        _ => {
            let path = config.data_dir()?.join("store");
            tracing::debug!("Using sled storage at {}", path.display());
            Ok(Arc::new(SledBackend::open(path)?))
        }
    }
}

fn open_mirror(config: &Config) -> Result<Arc<dyn RemoteMirror>> {
    if config.remote.enabled {
        Ok(Arc::new(HttpMirror::from_config(&config.remote)?))
    } else {
        Ok(Arc::new(OfflineMirror))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.store.backend = "memory".to_string();
        config
    }

    #[test]
    fn test_open_memory_context_generates_identity() {
        let ctx = AppContext::open(memory_config()).unwrap();
        assert!(ctx.sync.fingerprint().starts_with("fp_"));
        assert_eq!(ctx.identity.get_identity().unwrap(), ctx.sync.fingerprint());
        assert!(!ctx.remote_enabled());
    }

    #[test]
    fn test_open_sled_context_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.data_dir = Some(dir.path().to_path_buf());
        let ctx = AppContext::open(config).unwrap();
        ctx.sync.create_session().unwrap();
        assert!(dir.path().join("store").exists());
    }

    #[tokio::test]
    async fn test_disabled_remote_skips_network() {
        let ctx = AppContext::open(memory_config()).unwrap();
        ctx.sync.create_session().unwrap();
        assert!(ctx.pull().await.unwrap().is_none());
        assert_eq!(ctx.finish().await, DrainSummary::default());
        assert_eq!(ctx.sync.outbox().pending_len(), 1);
    }
}
