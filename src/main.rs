//! Quire - local-first conversation store CLI
//!
#![doc = "Quire - local-first conversation store CLI"]
#![doc = "Main entry point for the quire binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quire::cli::{Cli, Commands};
use quire::commands::{self, AppContext};
use quire::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/quire.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Search { query, limit } => {
            tracing::info!("Starting literature search");
            commands::search::run_search(&config, &query, limit).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            let ctx = AppContext::open(config)?;
            commands::identity::show_first_run_notice(&ctx)?;
            commands::sessions::handle_sessions(&ctx, command).await?;
            Ok(())
        }
        Commands::Identity { command } => {
            let ctx = AppContext::open(config)?;
            commands::identity::handle_identity(&ctx, command).await?;
            Ok(())
        }
        Commands::Sync => {
            tracing::info!("Starting sync");
            let ctx = AppContext::open(config)?;
            commands::identity::show_first_run_notice(&ctx)?;
            commands::sync::run_sync(&ctx).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "quire=debug" } else { "quire=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
