//! `quire identity` show, export and import

use crate::cli::IdentityCommand;
use crate::commands::AppContext;
use crate::error::Result;
use crate::identity::ImportOutcome;
use colored::Colorize;

/// Handle identity commands
pub async fn handle_identity(ctx: &AppContext, command: IdentityCommand) -> Result<()> {
    match command {
        IdentityCommand::Show => {
            println!("{}", ctx.identity.get_identity()?);
            ctx.identity.mark_shown()?;
        }
        IdentityCommand::Export => {
            let export = ctx.identity.export()?;
            print!("{}", export.bundle);
            ctx.identity.mark_shown()?;
        }
        IdentityCommand::Import { token } => match ctx.identity.import_identity(&token)? {
            ImportOutcome::Unchanged => {
                println!("{}", "That identity is already in use.".yellow());
            }
            ImportOutcome::Replaced { .. } => {
                let token = ctx.identity.get_identity()?;
                ctx.sync.reload(token)?;
                ctx.pull().await?;
                println!(
                    "{}",
                    format!("Identity imported; {} sessions available.", ctx.sync.sessions().len())
                        .green()
                );
            }
        },
    }
    Ok(())
}

/// Print the token once, the first time any command runs
pub fn show_first_run_notice(ctx: &AppContext) -> Result<()> {
    if ctx.identity.has_been_shown()? {
        return Ok(());
    }
    let token = ctx.identity.get_identity()?;
    eprintln!(
        "{} {}",
        "Your identity token:".bold(),
        token.cyan()
    );
    eprintln!(
        "Keep it to open your sessions on another device ({}).",
        "quire identity export".cyan()
    );
    ctx.identity.mark_shown()
}
