use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::{AppMutex, AppState};

/// How often to ask the backend whether another session wrote something.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Apply any writes made since the session's last seen revision.
/// Returns true if the session state changed.
pub async fn poll_once(state: &AppMutex) -> Result<bool> {
    let mut s = state.lock().await;
    let revision = s.ctx.backend.revision()?;
    if revision <= s.last_revision {
        return Ok(false);
    }
    let changes = s.ctx.backend.changes_since(s.last_revision)?;
    tracing::debug!("Applying {} storage changes up to revision {revision}", changes.len());
    let changed = s.apply_external_changes(&changes);
    s.last_revision = s.last_revision.max(revision);
    Ok(changed)
}

/// Poll forever, calling `on_change` with the locked state after each poll
/// that changed something.
pub async fn watch_loop<F>(state: Arc<AppMutex>, interval: Duration, mut on_change: F)
where
    F: FnMut(&AppState) + Send,
{
    loop {
        tokio::time::sleep(interval).await;

        match poll_once(&state).await {
            Ok(true) => on_change(&*state.lock().await),
            Ok(false) => {}
            Err(e) => tracing::warn!("Storage poll failed: {e:#}"),
        }
    }
}

/// Start the background watcher for a session.
pub fn start_watcher(state: Arc<AppMutex>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        watch_loop(state, interval, |s| {
            tracing::debug!("Session refreshed, active thread {}", s.threads.active_thread_id());
        })
        .await;
    })
}
