// chatlog — command-line front for the local chat history store
//
// This is a collaborator of the store, not part of it: every subcommand
// maps onto one of the four public store operations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chatlog_core::{MessageStore, NewMessage, Role};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;

#[derive(Parser)]
#[command(name = "chatlog")]
#[command(about = "Chatlog — local chat history", long_about = None)]
#[command(version)]
struct Cli {
    /// Database directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions, most recently active first
    Sessions,
    /// Show all messages of a session
    Show { session: String },
    /// Append a message to a session
    Send {
        session: String,
        message: String,
        #[arg(short, long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
    },
    /// Delete a session and all its messages
    Delete { session: String },
    /// Print a fresh session id
    New,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
    System,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
            RoleArg::System => Role::System,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let store = MessageStore::new(path);

    match cli.command {
        Commands::Sessions => {
            let sessions = store.list_sessions().await?;
            if sessions.is_empty() {
                println!("no sessions");
                return Ok(());
            }
            for summary in sessions {
                println!(
                    "{}  {}  [{}] {}",
                    summary.session_id.bold(),
                    format_timestamp(summary.timestamp).dimmed(),
                    role_label(summary.role),
                    preview(&summary.content)
                );
            }
        }
        Commands::Show { session } => {
            let records = store.list_by_session(&session).await?;
            if records.is_empty() {
                println!("no messages for {session}");
                return Ok(());
            }
            for record in records {
                println!(
                    "{} [{}] {}",
                    format_timestamp(record.timestamp).dimmed(),
                    role_label(record.role),
                    record.content
                );
            }
        }
        Commands::Send {
            session,
            message,
            role,
        } => {
            let id = store
                .save(
                    &session,
                    NewMessage {
                        role: role.into(),
                        content: message,
                    },
                )
                .await?;
            println!("saved message {id} to {session}");
        }
        Commands::Delete { session } => {
            store.delete_session(&session).await?;
            println!("deleted {session}");
        }
        Commands::New => println!("{}", uuid::Uuid::new_v4()),
    }

    Ok(())
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine platform data directory")?;
    Ok(base.join("chatlog").join("db"))
}

fn format_timestamp(millis: u64) -> String {
    match Local.timestamp_millis_opt(millis as i64) {
        chrono::LocalResult::Single(stamp) => stamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => millis.to_string(),
    }
}

fn role_label(role: Role) -> ColoredString {
    match role {
        Role::User => "user".green(),
        Role::Assistant => "assistant".blue(),
        Role::System => "system".yellow(),
    }
}

fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 60;
    let flat = content.replace('\n', " ");
    if flat.chars().count() > MAX_CHARS {
        let truncated: String = flat.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        flat
    }
}
