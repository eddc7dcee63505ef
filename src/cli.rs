use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::clipboard::{Notice, SystemClipboard};
use crate::commands;
use crate::config::Config;
use crate::context::Context;
use crate::db::SqliteBackend;
use crate::view;
use crate::watcher;
use crate::{AppMutex, AppState};

#[derive(Debug, Parser)]
#[command(name = "scratch-notes")]
#[command(version, about = "Scratch notes organized in threads")]
pub struct Args {
    /// Note database (defaults to $SCRATCH_NOTES_DB, then the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a note to the active thread
    Add {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Type notes line by line. Enter submits; end a line with \ to continue the note
    Compose,
    /// Show the active thread's notes
    List,
    /// Copy the active thread to the clipboard as markdown.
    /// On Linux this waits until the clipboard content is replaced
    Copy,
    /// Archive the active thread's notes and copy them.
    /// On Linux this waits until the clipboard content is replaced
    Clear,
    /// Print the active thread as markdown
    Export,
    /// List threads
    Threads,
    /// Create or switch threads
    #[command(subcommand)]
    Thread(ThreadCommand),
    /// List archived batches
    Archive,
    /// Restore an archived batch by its number in `archive`
    Restore {
        index: usize,
        #[arg(long, value_enum, default_value_t = RestoreTarget::Original)]
        to: RestoreTarget,
    },
    /// Follow changes made by other sessions
    Watch {
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ThreadCommand {
    /// Create a thread and switch to it
    New { name: String },
    /// Switch the active thread
    Select { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RestoreTarget {
    /// The thread the notes were cleared from
    Original,
    /// The active thread
    Current,
}

fn open_session(config: &Config) -> Result<AppMutex> {
    let backend = SqliteBackend::open(&config.db_path)
        .with_context(|| format!("Cannot open note database {}", config.db_path.display()))?;
    let ctx = Context::new(Arc::new(backend), Arc::new(SystemClipboard));
    Ok(AppMutex::new(AppState::load(ctx)))
}

fn report(notice: Option<Notice>) -> Result<()> {
    match notice {
        None => {
            println!("No notes in this thread.");
            Ok(())
        }
        Some(Notice::Success(message)) => {
            println!("{message}");
            Ok(())
        }
        Some(Notice::Failure(message)) => {
            eprintln!("{message}");
            Ok(())
        }
    }
}

/// Tell the user the command will keep running while it serves the copy.
async fn announce_clipboard_hold(state: &AppMutex, clipboard: &SystemClipboard) {
    if clipboard.holds_selection() && !state.lock().await.notes.is_empty() {
        eprintln!("Keeping the notes on the clipboard until something else is copied...");
    }
}

/// `restore` numbers entries from 1, newest first.
fn archive_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("Archive entries are numbered from 1"))
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let state = open_session(&config)?;

    match args.command {
        Command::Add { text } => {
            match commands::add_note(&state, text.join(" ")).await {
                Some(note) => {
                    let s = state.lock().await;
                    println!("Added note {} to {}", note.id, s.threads.active_thread_name());
                }
                None => println!("Nothing to add."),
            }
        }
        Command::Compose => compose(state, config.poll_interval).await?,
        Command::List => {
            let s = state.lock().await;
            println!("{}", view::render_input_header(s.threads.active_thread_name()));
            let notes = view::render_note_list(s.notes.notes());
            if !notes.is_empty() {
                println!("\n{notes}");
            }
        }
        Command::Copy => {
            announce_clipboard_hold(&state, &SystemClipboard).await;
            report(commands::copy_notes(&state).await)?
        }
        Command::Clear => {
            announce_clipboard_hold(&state, &SystemClipboard).await;
            report(commands::clear_notes(&state).await)?
        }
        Command::Export => print!("{}", commands::export_notes(&state).await),
        Command::Threads => {
            println!("{}", view::render_thread_selector(&state.lock().await.threads));
        }
        Command::Thread(ThreadCommand::New { name }) => {
            let id = commands::create_thread(&state, &name).await?;
            println!("Created thread {id}");
        }
        Command::Thread(ThreadCommand::Select { id }) => {
            commands::select_thread(&state, &id).await;
            println!("Active thread: {}", state.lock().await.threads.active_thread_name());
        }
        Command::Archive => {
            let s = state.lock().await;
            let listing = view::render_archive(s.archive.entries(), &s.threads);
            if listing.is_empty() {
                println!("Archive is empty.");
            } else {
                println!("{listing}");
            }
        }
        Command::Restore { index, to } => {
            let index = archive_index(index)?;
            let restored = match to {
                RestoreTarget::Original => commands::restore_to_original(&state, index).await?,
                RestoreTarget::Current => commands::restore_to_current(&state, index).await?,
            };
            let s = state.lock().await;
            println!(
                "Restored {} notes to {}",
                restored.count,
                s.threads.thread_name(&restored.thread_id).unwrap_or(restored.thread_id.as_str())
            );
        }
        Command::Watch { interval_ms } => {
            let interval = interval_ms.map(Duration::from_millis).unwrap_or(config.poll_interval);
            let state = Arc::new(state);
            {
                let s = state.lock().await;
                println!("{}", view::render_note_list(s.notes.notes()));
            }
            watcher::watch_loop(state, interval, |s| {
                println!("\n── {} ──", s.threads.active_thread_name());
                println!("{}", view::render_note_list(s.notes.notes()));
            })
            .await;
        }
    }
    Ok(())
}

/// Read notes from stdin until EOF while the watcher keeps the session in
/// step with other processes.
async fn compose(state: AppMutex, interval: Duration) -> Result<()> {
    let state = Arc::new(state);
    let watcher = watcher::start_watcher(state.clone(), interval);
    println!("{}", view::render_input_header(state.lock().await.threads.active_thread_name()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(note) = commands::handle_line(&state, &line).await {
            tracing::debug!("Stored note {}", note.id);
            println!("Added to {}", state.lock().await.threads.active_thread_name());
        }
    }

    watcher.abort();
    let pending = state.lock().await.input.text().to_string();
    if !pending.trim().is_empty() {
        commands::submit_input(&state).await;
    }
    Ok(())
}
