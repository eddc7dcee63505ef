pub mod archive;
pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod input;
pub mod markdown;
pub mod notes;
pub mod schema;
pub mod store;
pub mod threads;
pub mod types;
pub mod view;
pub mod watcher;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Mutex;

use crate::archive::Archive;
use crate::context::Context;
use crate::input::InputBuffer;
use crate::notes::{migrate_legacy_notes, prepend_to_thread, NoteList};
use crate::store::StorageChange;
use crate::threads::ThreadManager;
use crate::types::{ArchiveEntry, DEFAULT_THREAD_ID};

/// Where a restored archive entry ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub thread_id: String,
    pub count: usize,
}

/// All runtime state of one session.
pub struct AppState {
    /// Storage backend, clock, clipboard and app version.
    pub ctx: Context,
    /// Stored thread list plus the session's active thread.
    pub threads: ThreadManager,
    /// Note list of the active thread. Rebound whenever the active thread moves.
    pub notes: NoteList,
    /// Global archive of cleared batches.
    pub archive: Archive,
    /// Text typed but not yet submitted. Never persisted.
    pub input: InputBuffer,
    /// Highest backend revision this session has applied.
    /// The watcher asks the backend for changes after it.
    pub last_revision: i64,
}

impl AppState {
    /// Load threads, the active thread's notes and the archive, then run the
    /// legacy migration.
    pub fn load(ctx: Context) -> Self {
        let last_revision = ctx.backend.revision().unwrap_or_else(|e| {
            tracing::warn!("Could not read storage revision: {e:#}");
            0
        });
        let threads = ThreadManager::load(&ctx);
        let mut notes = NoteList::load(ctx.backend.clone(), threads.active_thread_id());
        let archive = Archive::load(ctx.backend.clone());
        migrate_legacy_notes(&ctx.backend, &mut notes);

        Self {
            ctx,
            threads,
            notes,
            archive,
            input: InputBuffer::default(),
            last_revision,
        }
    }

    pub fn select_thread(&mut self, thread_id: &str) {
        self.threads.select_thread(thread_id);
        self.notes.switch_thread(thread_id);
    }

    /// `name` must already be validated.
    pub fn create_thread(&mut self, name: &str) -> String {
        let id = self.threads.create_thread(name);
        self.notes.switch_thread(&id);
        id
    }

    /// Move the active list into a new archive entry. `None` if it was empty.
    pub fn archive_active_notes(&mut self) -> Option<ArchiveEntry> {
        if self.notes.is_empty() {
            return None;
        }
        let entry = ArchiveEntry {
            timestamp: self.ctx.clock.now(),
            notes: self.notes.take_all(),
            source_thread_id: self.threads.active_thread_id().to_string(),
        };
        tracing::info!(
            "Archiving {} notes from thread {}",
            entry.notes.len(),
            entry.source_thread_id
        );
        self.archive.push(entry.clone());
        Some(entry)
    }

    /// Put the entry's notes back in the thread they were cleared from. If
    /// that thread is gone they land in the active thread.
    pub fn restore_to_original(&mut self, index: usize) -> Result<Restored> {
        let entry = self.archive.remove(index)?;
        let source = if entry.source_thread_id.is_empty() {
            DEFAULT_THREAD_ID
        } else {
            entry.source_thread_id.as_str()
        };

        let target = if self.threads.contains(source) {
            source.to_string()
        } else {
            tracing::warn!("Thread {source} no longer exists, restoring into the active thread");
            self.threads.active_thread_id().to_string()
        };
        self.prepend_into(&target, &entry.notes);
        Ok(Restored {
            thread_id: target,
            count: entry.notes.len(),
        })
    }

    pub fn restore_to_current(&mut self, index: usize) -> Result<Restored> {
        let entry = self.archive.remove(index)?;
        let target = self.threads.active_thread_id().to_string();
        self.prepend_into(&target, &entry.notes);
        Ok(Restored {
            thread_id: target,
            count: entry.notes.len(),
        })
    }

    fn prepend_into(&mut self, thread_id: &str, notes: &[crate::types::Note]) {
        if thread_id == self.notes.thread_id() {
            self.notes.prepend(notes);
        } else {
            prepend_to_thread(&self.ctx.backend, thread_id, notes);
        }
    }

    /// Apply writes made by other sessions. Returns true if anything the
    /// session shows changed.
    pub fn apply_external_changes(&mut self, changes: &[StorageChange]) -> bool {
        let mut changed = false;
        for change in changes {
            changed |= self.threads.apply_change(change);
            changed |= self.notes.apply_change(change);
            changed |= self.archive.apply_change(change);
            self.last_revision = self.last_revision.max(change.revision);
        }
        changed
    }
}

/// Shared handle used by commands and the watcher task.
pub type AppMutex = Mutex<AppState>;

fn init_tracing(verbose: bool) {
    // Only log WARN and above in release builds so note content stays off the terminal
    let level = if verbose || cfg!(debug_assertions) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);
    let config = config::Config::resolve(args.db.clone());
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::execute(args, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{build_note, read_thread};
    use crate::store::LEGACY_NOTES_KEY;
    use crate::testing::test_context;

    #[test]
    fn load_migrates_legacy_notes() {
        let (ctx, _) = test_context();
        ctx.backend
            .set(
                LEGACY_NOTES_KEY,
                r#"[{"id":"1","note":"old\n","createdAt":"2023-05-01T10:00:00Z"}]"#,
            )
            .unwrap();
        let state = AppState::load(ctx.clone());
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes.notes()[0].thread_id, DEFAULT_THREAD_ID);

        let again = AppState::load(ctx);
        assert_eq!(again.notes.len(), 1);
    }

    #[test]
    fn restore_to_deleted_thread_lands_in_active() {
        let (ctx, _) = test_context();
        let mut state = AppState::load(ctx.clone());
        state.archive.push(ArchiveEntry {
            timestamp: ctx.clock.now(),
            notes: vec![build_note(&ctx, "lost\n".into(), "thread_gone")],
            source_thread_id: "thread_gone".into(),
        });

        let restored = state.restore_to_original(0).unwrap();
        assert_eq!(restored.thread_id, DEFAULT_THREAD_ID);
        assert_eq!(state.notes.notes()[0].note, "lost\n");
        assert!(state.archive.is_empty());
    }

    #[test]
    fn restore_to_inactive_thread_writes_its_key() {
        let (ctx, _) = test_context();
        let mut state = AppState::load(ctx.clone());
        state.notes.push_front(build_note(&ctx, "d\n".into(), DEFAULT_THREAD_ID));
        state.archive_active_notes();
        state.create_thread("Work");

        let restored = state.restore_to_original(0).unwrap();
        assert_eq!(restored.thread_id, DEFAULT_THREAD_ID);
        assert!(state.notes.is_empty());
        assert_eq!(read_thread(&ctx.backend, DEFAULT_THREAD_ID).len(), 1);
    }

    #[test]
    fn unknown_archive_index_is_an_error() {
        let (ctx, _) = test_context();
        let mut state = AppState::load(ctx);
        assert!(state.restore_to_current(0).is_err());
        assert!(state.restore_to_original(2).is_err());
    }
}
