//! Command-line interface definition for Quire
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for sessions, identity, sync and literature search.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quire - local-first conversation store
///
/// Keeps chat sessions on this device and mirrors them to a remote store
/// under an anonymous identity token.
#[derive(Parser, Debug, Clone)]
#[command(name = "quire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quire.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the storage backend (sled, memory)
    #[arg(long)]
    pub backend: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Quire
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage chat sessions
    Sessions {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Show, export or import the identity token
    Identity {
        /// Identity subcommand
        #[command(subcommand)]
        command: IdentityCommand,
    },

    /// Pull remote sessions, merge them and push pending changes
    Sync,

    /// Search the literature API
    Search {
        /// Free-text query
        query: String,

        /// Maximum number of papers to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
}

/// Session subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List sessions, pinned first then most recent
    List {
        /// Group by calendar day
        #[arg(long)]
        by_day: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an empty session
    New,

    /// Show a session's messages and make it current
    Show {
        /// Session id
        id: String,
    },

    /// Rename a session
    Rename {
        /// Session id
        id: String,

        /// New title
        title: String,
    },

    /// Pin a session to the top of the list
    Pin {
        /// Session id
        id: String,

        /// Unpin instead
        #[arg(long)]
        unpin: bool,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },

    /// Delete every session
    Clear,

    /// Save a conversation from a JSON file of messages
    Save {
        /// Path to a JSON array of messages
        #[arg(short, long)]
        file: PathBuf,

        /// Update this session instead of creating a new one
        #[arg(short, long)]
        session: Option<String>,
    },
}

/// Identity subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum IdentityCommand {
    /// Print the identity token
    Show,

    /// Print a shareable bundle containing the identity token
    Export,

    /// Replace the identity token
    Import {
        /// Token starting with `fp_`
        token: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sessions_list() {
        let cli = Cli::try_parse_from(["quire", "sessions", "list", "--by-day"]).unwrap();
        assert_eq!(cli.config, Some("config/quire.yaml".to_string()));
        if let Commands::Sessions {
            command: SessionCommand::List { by_day, json },
        } = cli.command
        {
            assert!(by_day);
            assert!(!json);
        } else {
            panic!("Expected sessions list");
        }
    }

    #[test]
    fn test_cli_parse_rename() {
        let cli =
            Cli::try_parse_from(["quire", "sessions", "rename", "01ABC", "Oncology Notes"]).unwrap();
        if let Commands::Sessions {
            command: SessionCommand::Rename { id, title },
        } = cli.command
        {
            assert_eq!(id, "01ABC");
            assert_eq!(title, "Oncology Notes");
        } else {
            panic!("Expected sessions rename");
        }
    }

    #[test]
    fn test_cli_parse_pin_unpin() {
        let cli = Cli::try_parse_from(["quire", "sessions", "pin", "x", "--unpin"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                command: SessionCommand::Pin { unpin: true, .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_identity_import() {
        let cli = Cli::try_parse_from(["quire", "identity", "import", "fp_abc123"]).unwrap();
        if let Commands::Identity {
            command: IdentityCommand::Import { token },
        } = cli.command
        {
            assert_eq!(token, "fp_abc123");
        } else {
            panic!("Expected identity import");
        }
    }

    #[test]
    fn test_cli_parse_search_default_limit() {
        let cli = Cli::try_parse_from(["quire", "search", "TP53 mutations"]).unwrap();
        if let Commands::Search { query, limit } = cli.command {
            assert_eq!(query, "TP53 mutations");
            assert_eq!(limit, 5);
        } else {
            panic!("Expected search");
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["quire", "--verbose", "--backend", "memory", "sync"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.backend.as_deref(), Some("memory"));
        assert!(matches!(cli.command, Commands::Sync));
    }

    #[test]
    fn test_cli_parse_save_into_session() {
        let cli = Cli::try_parse_from([
            "quire", "sessions", "save", "--file", "chat.json", "--session", "01ABC",
        ])
        .unwrap();
        if let Commands::Sessions {
            command: SessionCommand::Save { file, session },
        } = cli.command
        {
            assert_eq!(file, PathBuf::from("chat.json"));
            assert_eq!(session.as_deref(), Some("01ABC"));
        } else {
            panic!("Expected sessions save");
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["quire"]).is_err());
    }
}
