use anyhow::Result;

use crate::clipboard::{copy_to_clipboard, Notice};
use crate::input::{Key, KeyOutcome};
use crate::markdown::{compile_notes_to_markdown, format_markdown_async};
use crate::notes::{build_note, prepend_to_thread};
use crate::threads::validate_thread_name;
use crate::types::Note;
use crate::{AppMutex, Restored};

pub const COPIED_MESSAGE: &str = "Notes copied to clipboard!";
pub const CLEARED_MESSAGE: &str = "Notes cleared and copied to clipboard!";

// ─── Notes ─────────────────────────────────────────────────────────────────────

/// Format `text` and prepend it to the thread that was active when it was
/// submitted. Blank text is ignored. Returns the stored note.
pub async fn add_note(state: &AppMutex, text: String) -> Option<Note> {
    if text.trim().is_empty() {
        return None;
    }

    // Snapshot the target thread, then format without holding the lock.
    let thread_id = state.lock().await.threads.active_thread_id().to_string();
    let formatted = format_markdown_async(text).await;

    let mut s = state.lock().await;
    let note = build_note(&s.ctx, formatted, &thread_id);
    if s.notes.thread_id() == thread_id {
        s.notes.push_front(note.clone());
    } else {
        tracing::debug!("Active thread changed while formatting, writing to {thread_id}");
        prepend_to_thread(&s.ctx.backend, &thread_id, std::slice::from_ref(&note));
    }
    Some(note)
}

/// Submit the input buffer. It is cleared only when a note was stored.
pub async fn submit_input(state: &AppMutex) -> Option<Note> {
    let text = state.lock().await.input.text().to_string();
    let note = add_note(state, text).await?;
    state.lock().await.input.clear();
    Some(note)
}

/// Feed one key press to the input, submitting on plain Enter.
pub async fn handle_key(state: &AppMutex, key: Key) -> Option<Note> {
    let outcome = state.lock().await.input.handle_key(key);
    match outcome {
        KeyOutcome::Submit => submit_input(state).await,
        KeyOutcome::Edited => None,
    }
}

/// Terminal variant of `handle_key`: one line of input.
pub async fn handle_line(state: &AppMutex, line: &str) -> Option<Note> {
    let outcome = state.lock().await.input.handle_line(line);
    match outcome {
        KeyOutcome::Submit => submit_input(state).await,
        KeyOutcome::Edited => None,
    }
}

/// Compiled document of the active thread. Empty if it has no notes.
pub async fn export_notes(state: &AppMutex) -> String {
    let s = state.lock().await;
    compile_notes_to_markdown(s.notes.notes(), s.threads.active_thread_name())
}

/// Copy the active thread as one document. `None` when there is nothing to copy.
pub async fn copy_notes(state: &AppMutex) -> Option<Notice> {
    let (document, clipboard) = {
        let s = state.lock().await;
        if s.notes.is_empty() {
            return None;
        }
        let document = compile_notes_to_markdown(s.notes.notes(), s.threads.active_thread_name());
        (document, s.ctx.clipboard.clone())
    };
    Some(copy_to_clipboard(clipboard, document, COPIED_MESSAGE).await)
}

/// Archive and empty the active thread, then copy its document.
pub async fn clear_notes(state: &AppMutex) -> Option<Notice> {
    let (document, clipboard) = {
        let mut s = state.lock().await;
        if s.notes.is_empty() {
            return None;
        }
        let document = compile_notes_to_markdown(s.notes.notes(), s.threads.active_thread_name());
        s.archive_active_notes();
        (document, s.ctx.clipboard.clone())
    };
    Some(copy_to_clipboard(clipboard, document, CLEARED_MESSAGE).await)
}

// ─── Threads ───────────────────────────────────────────────────────────────────

/// Validate `name`, create the thread and switch to it.
pub async fn create_thread(state: &AppMutex, name: &str) -> Result<String> {
    let name = validate_thread_name(name)?;
    Ok(state.lock().await.create_thread(&name))
}

pub async fn select_thread(state: &AppMutex, thread_id: &str) {
    state.lock().await.select_thread(thread_id);
}

// ─── Archive ───────────────────────────────────────────────────────────────────

pub async fn restore_to_original(state: &AppMutex, index: usize) -> Result<Restored> {
    state.lock().await.restore_to_original(index)
}

pub async fn restore_to_current(state: &AppMutex, index: usize) -> Result<Restored> {
    state.lock().await.restore_to_current(index)
}
