//! Anonymous per-profile identity
//!
//! The identity token ("fingerprint") is the only key correlating a local
//! profile with its remotely mirrored sessions. Possessing the token is
//! possessing the sessions: it is a lightweight privacy boundary, not an
//! authentication mechanism.

use crate::error::{QuireError, Result};
use crate::storage::{StorageBackend, FINGERPRINT_KEY, FINGERPRINT_SHOWN_KEY};
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use std::sync::Arc;

/// Prefix every identity token starts with
pub const FINGERPRINT_PREFIX: &str = "fp_";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_CHARS: usize = 9;

/// Result of an accepted identity import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The imported token was already the current one
    Unchanged,
    /// The token was replaced; cached remote-derived state is stale and the
    /// consumer must reload local data and resync
    Replaced {
        /// Token in use before the import, if any
        previous: Option<String>,
    },
}

impl ImportOutcome {
    /// Whether the consumer must reload and resync
    pub fn requires_reload(&self) -> bool {
        matches!(self, ImportOutcome::Replaced { .. })
    }
}

/// Exported identity, for moving sessions to another device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityExport {
    /// Raw token value
    pub token: String,
    /// When the export was produced
    pub exported_at: DateTime<Utc>,
    /// Human-readable text bundle suitable for saving to a file
    pub bundle: String,
}

/// Derives, persists and imports the identity token
pub struct IdentityProvider {
    backend: Arc<dyn StorageBackend>,
    token_pattern: Regex,
}

impl IdentityProvider {
    /// Create a provider on top of the given backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let token_pattern = Regex::new(&format!("^{}", regex::escape(FINGERPRINT_PREFIX)))
            .map_err(|e| anyhow::anyhow!("Invalid identity pattern: {}", e))?;
        Ok(Self {
            backend,
            token_pattern,
        })
    }

    /// Return the persisted token, generating and persisting one on first use
    pub fn get_identity(&self) -> Result<String> {
        if let Some(token) = self.backend.get(FINGERPRINT_KEY)? {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        let token = generate_fingerprint(Utc::now());
        self.backend.set(FINGERPRINT_KEY, &token)?;
        tracing::info!("Generated new identity token");
        Ok(token)
    }

    /// Whether a string is an acceptable identity token
    pub fn is_valid_token(&self, token: &str) -> bool {
        self.token_pattern.is_match(token)
    }

    /// Replace the persisted token with an externally obtained one
    ///
    /// Surrounding whitespace is ignored. Nothing is written when the token
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns `QuireError::InvalidIdentity` if the token does not start
    /// with `fp_`.
    pub fn import_identity(&self, token: &str) -> Result<ImportOutcome> {
        let token = token.trim();
        if !self.is_valid_token(token) {
            tracing::warn!("Rejected identity import with malformed token");
            return Err(QuireError::InvalidIdentity(token.to_string()).into());
        }

        let previous = self.backend.get(FINGERPRINT_KEY)?;
        if previous.as_deref() == Some(token) {
            return Ok(ImportOutcome::Unchanged);
        }

        self.backend.set(FINGERPRINT_KEY, token)?;
        tracing::info!("Imported identity token; a reload and resync is required");
        Ok(ImportOutcome::Replaced { previous })
    }

    /// Export the current token with a timestamped text bundle
    pub fn export(&self) -> Result<IdentityExport> {
        let token = self.get_identity()?;
        let exported_at = Utc::now();
        let bundle = format!(
            "Quire identity token\n\
             Token: {}\n\
             Exported: {}\n\
             \n\
             Keep this token private. Importing it on another device gives that\n\
             device access to the same synchronized sessions.\n",
            token,
            exported_at.to_rfc3339()
        );
        Ok(IdentityExport {
            token,
            exported_at,
            bundle,
        })
    }

    /// Whether the user has already been shown their token
    pub fn has_been_shown(&self) -> Result<bool> {
        Ok(self.backend.get(FINGERPRINT_SHOWN_KEY)?.as_deref() == Some("true"))
    }

    /// Record that the token has been shown
    pub fn mark_shown(&self) -> Result<()> {
        self.backend.set(FINGERPRINT_SHOWN_KEY, "true")
    }
}

/// Generate a fresh token: prefix, random base-36 chars, base-36 millis
pub fn generate_fingerprint(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let random: String = (0..RANDOM_CHARS)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    format!("{}{}{}", FINGERPRINT_PREFIX, random, to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn provider() -> (IdentityProvider, MemoryBackend) {
        let backend = MemoryBackend::new();
        let provider = IdentityProvider::new(Arc::new(backend.clone())).expect("provider");
        (provider, backend)
    }

    #[test]
    fn test_generate_fingerprint_format() {
        let token = generate_fingerprint(Utc::now());
        assert!(token.starts_with("fp_"));
        assert!(token.len() > 3 + RANDOM_CHARS);
        assert!(token[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_get_identity_is_stable() {
        let (provider, backend) = provider();
        let first = provider.get_identity().unwrap();
        let second = provider.get_identity().unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.get(FINGERPRINT_KEY).unwrap(), Some(first));
    }

    #[test]
    fn test_import_rejects_malformed_token_without_mutation() {
        let (provider, backend) = provider();
        let original = provider.get_identity().unwrap();

        let err = provider.import_identity("not-a-token").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QuireError>(),
            Some(QuireError::InvalidIdentity(t)) if t == "not-a-token"
        ));
        assert_eq!(backend.get(FINGERPRINT_KEY).unwrap(), Some(original));
    }

    #[test]
    fn test_import_accepts_prefixed_token() {
        let (provider, _) = provider();
        let original = provider.get_identity().unwrap();

        let outcome = provider.import_identity("fp_abc123").unwrap();
        assert_eq!(
            outcome,
            ImportOutcome::Replaced {
                previous: Some(original)
            }
        );
        assert!(outcome.requires_reload());
        assert_eq!(provider.get_identity().unwrap(), "fp_abc123");
    }

    #[test]
    fn test_import_trims_and_detects_unchanged() {
        let (provider, _) = provider();
        provider.import_identity("fp_abc123").unwrap();
        let outcome = provider.import_identity("  fp_abc123\n").unwrap();
        assert_eq!(outcome, ImportOutcome::Unchanged);
        assert!(!outcome.requires_reload());
    }

    #[test]
    fn test_prefix_must_be_at_start() {
        let (provider, _) = provider();
        assert!(!provider.is_valid_token("xfp_abc"));
        assert!(!provider.is_valid_token("FP_abc"));
        assert!(provider.is_valid_token("fp_"));
    }

    #[test]
    fn test_export_contains_token_and_timestamp() {
        let (provider, _) = provider();
        provider.import_identity("fp_export1").unwrap();
        let export = provider.export().unwrap();
        assert_eq!(export.token, "fp_export1");
        assert!(export.bundle.contains("Token: fp_export1"));
        assert!(export.bundle.contains(&export.exported_at.to_rfc3339()));
    }

    #[test]
    fn test_shown_flag() {
        let (provider, backend) = provider();
        assert!(!provider.has_been_shown().unwrap());
        provider.mark_shown().unwrap();
        assert!(provider.has_been_shown().unwrap());
        assert_eq!(
            backend.get(FINGERPRINT_SHOWN_KEY).unwrap(),
            Some("true".to_string())
        );
    }
}
