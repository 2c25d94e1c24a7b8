//! `quire sessions` subcommands

use crate::cli::SessionCommand;
use crate::commands::AppContext;
use crate::error::{QuireError, Result};
use crate::session::{ChatMessage, ChatSession, Role};
use crate::storage::schema::parse_messages;
use crate::sync::SessionSynchronizer;
use chrono::Local;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle session commands
pub async fn handle_sessions(ctx: &AppContext, command: SessionCommand) -> Result<()> {
    ctx.pull().await?;
    let sync = ctx.sync.as_ref();

    match command {
        SessionCommand::List { by_day, json } => {
            let sessions = sync.sessions();
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("{}", "No sessions found.".yellow());
                return Ok(());
            }

            if by_day {
                let offset = *Local::now().offset();
                for bucket in sync.sessions_by_day(offset) {
                    println!("\n{}", bucket.day.format("%A, %Y-%m-%d").to_string().bold());
                    session_table(sync, &bucket.sessions).printstd();
                }
            } else {
                println!("\nSessions:");
                session_table(sync, &sessions).printstd();
            }
            println!();
            println!(
                "Use {} to open a session.",
                "quire sessions show <ID>".cyan()
            );
            println!();
            return Ok(());
        }
        SessionCommand::New => {
            let id = sync.create_session()?;
            println!("{}", format!("Created session {}", id).green());
        }
        SessionCommand::Show { id } => {
            let messages = sync.load_session(&id)?;
            let title = sync.session(&id).map(|s| s.title).unwrap_or_default();
            println!("\n{}", title.bold());
            if messages.is_empty() {
                println!("{}", "(no messages)".dimmed());
            }
            for message in &messages {
                print_message(message);
            }
            println!();
            return Ok(());
        }
        SessionCommand::Rename { id, title } => {
            sync.rename_session(&id, &title)?;
            println!("{}", format!("Renamed session {} to '{}'", id, title).green());
        }
        SessionCommand::Pin { id, unpin } => {
            sync.pin_session(&id, !unpin)?;
            let verb = if unpin { "Unpinned" } else { "Pinned" };
            println!("{}", format!("{} session {}", verb, id).green());
        }
        SessionCommand::Delete { id } => {
            if sync.delete_session(&id)? {
                println!("{}", format!("Deleted session {}", id).green());
            } else {
                return Err(QuireError::SessionNotFound(id).into());
            }
        }
        SessionCommand::Clear => {
            sync.delete_all()?;
            println!("{}", "Deleted all sessions.".green());
        }
        SessionCommand::Save { file, session } => {
            let raw = std::fs::read_to_string(&file)?;
            let messages = parse_messages(&raw)?;
            if let Some(id) = &session {
                sync.load_session(id)?;
            }
            match sync.save_current_session(&messages)? {
                Some(id) => println!("{}", format!("Saved session {}", id).green()),
                None => println!(
                    "{}",
                    "Nothing to save: a conversation needs more than one message.".yellow()
                ),
            }
        }
    }

    ctx.finish().await;
    Ok(())
}

fn session_table(sync: &SessionSynchronizer, sessions: &[ChatSession]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold(),
        "Sync".bold()
    ]);

    for session in sessions {
        let title = if session.is_pinned() {
            format!("* {}", session.title)
        } else {
            session.title.clone()
        };
        let updated = session
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();

        table.add_row(prettytable::row![
            session.id.cyan(),
            title,
            session.messages.len(),
            updated,
            sync.sync_state(&session.id)
        ]);
    }
    table
}

fn print_message(message: &ChatMessage) {
    let label = match message.role {
        Role::User => "user".blue().bold(),
        Role::Model => "model".green().bold(),
        Role::System => "system".magenta().bold(),
    };
    if message.is_error.unwrap_or(false) {
        println!("{} {}", label, message.content.red());
    } else {
        println!("{} {}", label, message.content);
    }
}
