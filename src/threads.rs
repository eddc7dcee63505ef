use std::sync::Arc;

use anyhow::Result;

use crate::context::Context;
use crate::store::{PersistentValue, StorageChange, THREADS_CONFIG_KEY};
use crate::types::{Thread, ThreadsConfig, DEFAULT_THREAD_ID, DEFAULT_THREAD_NAME};

/// Longest accepted thread name, in characters, after trimming.
pub const MAX_THREAD_NAME_CHARS: usize = 30;

/// Check a user-entered thread name and return it trimmed.
pub fn validate_thread_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Thread name cannot be empty");
    }
    if trimmed.chars().count() > MAX_THREAD_NAME_CHARS {
        anyhow::bail!("Thread name must be {MAX_THREAD_NAME_CHARS} characters or less");
    }
    Ok(trimmed.to_string())
}

/// Owns the stored thread list and the session's active thread.
///
/// The in-memory `active_thread_id` is authoritative for the session; the
/// stored pointer is only brought in line by `sync_active`.
pub struct ThreadManager {
    config: PersistentValue<ThreadsConfig>,
    active_thread_id: String,
    ctx: Context,
}

impl ThreadManager {
    pub fn load(ctx: &Context) -> Self {
        let initial = ThreadsConfig::initial(ctx.clock.now(), &ctx.app_version);
        let mut config = PersistentValue::load(Arc::clone(&ctx.backend), THREADS_CONFIG_KEY, initial);

        if config.get().threads.is_empty() {
            tracing::warn!("Stored thread list was empty, restoring the default thread");
            let now = ctx.clock.now();
            config.update(|c| ThreadsConfig {
                threads: vec![Thread::default_thread(now)],
                ..c.clone()
            });
        }

        let stored_active = config.get().active_thread_id.clone();
        let active_thread_id = if config.get().threads.iter().any(|t| t.id == stored_active) {
            stored_active
        } else {
            tracing::warn!("Active thread '{stored_active}' not found, falling back to default");
            DEFAULT_THREAD_ID.to_string()
        };

        let mut manager = Self {
            config,
            active_thread_id,
            ctx: ctx.clone(),
        };
        manager.sync_active();
        manager
    }

    pub fn config(&self) -> &ThreadsConfig {
        self.config.get()
    }

    pub fn active_thread_id(&self) -> &str {
        &self.active_thread_id
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.config.get().threads.iter().any(|t| t.id == thread_id)
    }

    pub fn thread_name(&self, thread_id: &str) -> Option<&str> {
        self.config
            .get()
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .map(|t| t.name.as_str())
    }

    /// Name shown for the active thread. Unknown ids display as "Note".
    pub fn active_thread_name(&self) -> &str {
        self.thread_name(&self.active_thread_id).unwrap_or("Note")
    }

    /// Name shown for an archive's source thread.
    pub fn source_thread_name(&self, thread_id: &str) -> &str {
        self.thread_name(thread_id).unwrap_or(DEFAULT_THREAD_NAME)
    }

    /// Threads in display order.
    pub fn sorted_threads(&self) -> Vec<&Thread> {
        let mut threads: Vec<&Thread> = self.config.get().threads.iter().collect();
        threads.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
        threads
    }

    /// Append a new thread and make it active. `name` must already have
    /// passed `validate_thread_name`; it is trimmed again here.
    pub fn create_thread(&mut self, name: &str) -> String {
        let now = self.ctx.clock.now();
        let thread = Thread {
            id: format!("thread_{}", now.timestamp_millis()),
            name: name.trim().to_string(),
            created_at: now,
            updated_at: None,
            order: self.config.get().threads.len() as u32,
        };
        let id = thread.id.clone();
        tracing::info!("Creating thread {id}");

        self.config.update(|c| {
            let mut threads = c.threads.clone();
            threads.push(thread);
            ThreadsConfig {
                threads,
                active_thread_id: id.clone(),
                version: c.version.clone(),
            }
        });
        self.active_thread_id = id.clone();
        id
    }

    /// Switch the session to `thread_id`. The id is not checked against the
    /// thread list.
    pub fn select_thread(&mut self, thread_id: &str) {
        self.active_thread_id = thread_id.to_string();
        self.sync_active();
    }

    /// Persist the active thread id if the stored pointer differs.
    pub fn sync_active(&mut self) {
        if self.config.get().active_thread_id != self.active_thread_id {
            let active = self.active_thread_id.clone();
            self.config.update(|c| ThreadsConfig {
                active_thread_id: active,
                ..c.clone()
            });
        }
    }

    /// Apply a config written by another session. Only the thread list is
    /// taken over; the session keeps its own active thread and writes nothing
    /// back. Returns true if the thread list changed.
    pub fn apply_change(&mut self, change: &StorageChange) -> bool {
        let before = self.config.get().threads.clone();
        if !self.config.apply_change(change) {
            return false;
        }
        self.config.get().threads != before
    }
}
