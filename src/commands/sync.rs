//! `quire sync`: pull, merge and push in one go

use crate::commands::AppContext;
use crate::error::Result;
use crate::sync::PullOutcome;
use colored::Colorize;
use prettytable::{format, Table};

/// Pull, merge, push and report per-session sync state
pub async fn run_sync(ctx: &AppContext) -> Result<()> {
    if !ctx.remote_enabled() {
        println!(
            "{}",
            "Remote sync is disabled; set remote.enabled in the config.".yellow()
        );
        return Ok(());
    }

    match ctx.pull().await? {
        Some(PullOutcome::Merged {
            fetched,
            conflicts,
            evicted,
        }) => println!(
            "Fetched {} remote sessions ({} conflicts, {} evicted, strategy {}).",
            fetched,
            conflicts,
            evicted,
            ctx.sync.strategy_name()
        ),
        Some(PullOutcome::Unavailable { reason }) => {
            println!("{} {}", "Remote unavailable:".red(), reason)
        }
        Some(PullOutcome::Stale) | None => {}
    }

    let summary = ctx.finish().await;
    println!(
        "Pushed {} changes, {} failed.",
        summary.confirmed.to_string().green(),
        summary.failed.to_string().red()
    );

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["ID".bold(), "Title".bold(), "State".bold()]);
    for session in ctx.sync.sessions() {
        table.add_row(prettytable::row![
            session.id.cyan(),
            session.title,
            ctx.sync.sync_state(&session.id)
        ]);
    }
    table.printstd();

    for entry in ctx.sync.outbox().failed() {
        println!(
            "{} {} #{}: {}",
            "failed".red(),
            entry.op.kind(),
            entry.seq,
            entry.last_error.unwrap_or_default()
        );
    }
    Ok(())
}
