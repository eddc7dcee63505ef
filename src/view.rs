//! Plain-text renderings of the session state for the terminal.

use chrono::{Local, TimeZone};

use crate::threads::ThreadManager;
use crate::types::{ArchiveEntry, Note};

pub const INPUT_PLACEHOLDER: &str = "Take a new note";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Threads in display order, the active one marked with `*`.
pub fn render_thread_selector(threads: &ThreadManager) -> String {
    threads
        .sorted_threads()
        .iter()
        .map(|t| {
            let marker = if t.id == threads.active_thread_id() { '*' } else { ' ' };
            format!("{marker} {} ({})", t.name, t.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Header above the input: the active thread's name and the placeholder.
pub fn render_input_header(thread_name: &str) -> String {
    format!("{thread_name}\n{INPUT_PLACEHOLDER}")
}

/// Notes newest first, separated by blank lines.
pub fn render_note_list(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|n| n.note.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_archive(entries: &[ArchiveEntry], threads: &ThreadManager) -> String {
    render_archive_in(entries, threads, &Local)
}

/// Archive listing with 1-based indexes. Empty archives render nothing.
pub fn render_archive_in<Tz: TimeZone>(
    entries: &[ArchiveEntry],
    threads: &ThreadManager,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if entries.is_empty() {
        return String::new();
    }
    let mut out = format!("Archived Notes ({})", entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let stamp = entry.timestamp.with_timezone(tz).format(TIMESTAMP_FORMAT);
        out.push_str(&format!(
            "\n[{}] {stamp} ({} notes from thread \"{}\")",
            i + 1,
            entry.notes.len(),
            threads.source_thread_name(&entry.source_thread_id),
        ));
    }
    out
}
