use std::sync::Arc;

use crate::context::Context;
use crate::store::{thread_notes_key, KvBackend, PersistentValue, LEGACY_NOTES_KEY};
use crate::types::{Note, NoteMeta, DEFAULT_THREAD_ID};

/// Build a note stamped with the current time and app version.
pub fn build_note(ctx: &Context, text: String, thread_id: &str) -> Note {
    let now = ctx.clock.now();
    Note {
        id: now.timestamp_millis().to_string(),
        note: text,
        created_at: now,
        meta: Some(NoteMeta {
            version: ctx.app_version.clone(),
        }),
        thread_id: thread_id.to_string(),
    }
}

/// `front` followed by `rest`, both in their original order.
fn prepended(front: &[Note], rest: &[Note]) -> Vec<Note> {
    front.iter().chain(rest.iter()).cloned().collect()
}

/// Read-modify-write a thread's stored list without loading it as the
/// active list.
pub fn prepend_to_thread(backend: &Arc<dyn KvBackend>, thread_id: &str, notes: &[Note]) {
    let mut stored = PersistentValue::load(Arc::clone(backend), thread_notes_key(thread_id), Vec::new());
    stored.update(|current| prepended(notes, current));
}

/// Read a thread's stored list.
pub fn read_thread(backend: &Arc<dyn KvBackend>, thread_id: &str) -> Vec<Note> {
    PersistentValue::load(Arc::clone(backend), thread_notes_key(thread_id), Vec::<Note>::new())
        .get()
        .clone()
}

/// The note list of the active thread, newest first.
pub struct NoteList {
    thread_id: String,
    notes: PersistentValue<Vec<Note>>,
}

impl NoteList {
    pub fn load(backend: Arc<dyn KvBackend>, thread_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            notes: PersistentValue::load(backend, thread_notes_key(thread_id), Vec::new()),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn notes(&self) -> &[Note] {
        self.notes.get()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.get().is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.get().len()
    }

    /// Point the list at another thread's storage key.
    pub fn switch_thread(&mut self, thread_id: &str) {
        self.thread_id = thread_id.to_string();
        self.notes.rebind(thread_notes_key(thread_id), Vec::new());
    }

    pub fn push_front(&mut self, note: Note) {
        self.prepend(std::slice::from_ref(&note));
    }

    /// Put `notes` ahead of the current list, preserving their order.
    pub fn prepend(&mut self, notes: &[Note]) {
        self.notes.update(|current| prepended(notes, current));
    }

    /// Replace the whole list, e.g. after a migration.
    pub fn replace(&mut self, notes: Vec<Note>) {
        self.notes.set(notes);
    }

    /// Empty the list and hand back what it held.
    pub fn take_all(&mut self) -> Vec<Note> {
        let notes = self.notes.get().clone();
        self.notes.set(Vec::new());
        notes
    }

    pub fn apply_change(&mut self, change: &crate::store::StorageChange) -> bool {
        self.notes.apply_change(change)
    }
}

/// Move pre-threading notes into the default thread.
///
/// Runs only while the legacy list is non-empty and the default thread is
/// empty, then clears the legacy key, so repeated runs never duplicate.
/// Returns the number of migrated notes.
pub fn migrate_legacy_notes(backend: &Arc<dyn KvBackend>, active: &mut NoteList) -> usize {
    let mut legacy = PersistentValue::load(Arc::clone(backend), LEGACY_NOTES_KEY, Vec::<Note>::new());
    if legacy.get().is_empty() {
        return 0;
    }

    let default_notes = if active.thread_id() == DEFAULT_THREAD_ID {
        active.notes().to_vec()
    } else {
        read_thread(backend, DEFAULT_THREAD_ID)
    };
    if !default_notes.is_empty() {
        return 0;
    }

    // Legacy records carry no thread; deserialization already assigned the
    // default thread, this makes it explicit for records that had one.
    let migrated: Vec<Note> = legacy
        .get()
        .iter()
        .cloned()
        .map(|note| Note {
            thread_id: DEFAULT_THREAD_ID.to_string(),
            ..note
        })
        .collect();
    let count = migrated.len();
    tracing::info!("Migrating {count} legacy notes to default thread");

    if active.thread_id() == DEFAULT_THREAD_ID {
        active.replace(migrated);
    } else {
        prepend_to_thread(backend, DEFAULT_THREAD_ID, &migrated);
    }
    legacy.set(Vec::new());
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Clock;
    use crate::testing::test_context;

    const LEGACY: &str = r#"[
        {"id":"2","note":"newer\n","createdAt":"2023-05-02T10:00:00.000Z"},
        {"id":"1","note":"older\n","createdAt":"2023-05-01T10:00:00.000Z","meta":{"version":"0.1.0"}}
    ]"#;

    #[test]
    fn build_note_stamps_id_version_and_thread() {
        let (ctx, clock) = test_context();
        let note = build_note(&ctx, "hi\n".into(), "thread_1");
        assert_eq!(note.id, clock.now().timestamp_millis().to_string());
        assert_eq!(note.meta.unwrap().version, "9.9.9");
        assert_eq!(note.thread_id, "thread_1");
    }

    #[test]
    fn prepend_keeps_order_and_persists() {
        let (ctx, _) = test_context();
        let mut list = NoteList::load(ctx.backend.clone(), DEFAULT_THREAD_ID);
        list.push_front(build_note(&ctx, "a".into(), DEFAULT_THREAD_ID));
        let batch = vec![
            build_note(&ctx, "b".into(), DEFAULT_THREAD_ID),
            build_note(&ctx, "c".into(), DEFAULT_THREAD_ID),
        ];
        list.prepend(&batch);

        let texts: Vec<&str> = list.notes().iter().map(|n| n.note.as_str()).collect();
        assert_eq!(texts, vec!["b", "c", "a"]);
        assert_eq!(read_thread(&ctx.backend, DEFAULT_THREAD_ID).len(), 3);
    }

    #[test]
    fn switching_threads_swaps_storage_key() {
        let (ctx, _) = test_context();
        let mut list = NoteList::load(ctx.backend.clone(), DEFAULT_THREAD_ID);
        list.push_front(build_note(&ctx, "default".into(), DEFAULT_THREAD_ID));
        list.switch_thread("thread_9");
        assert!(list.is_empty());
        list.push_front(build_note(&ctx, "work".into(), "thread_9"));
        list.switch_thread(DEFAULT_THREAD_ID);
        assert_eq!(list.len(), 1);
        assert_eq!(list.notes()[0].note, "default");
    }

    #[test]
    fn take_all_empties_list() {
        let (ctx, _) = test_context();
        let mut list = NoteList::load(ctx.backend.clone(), DEFAULT_THREAD_ID);
        list.push_front(build_note(&ctx, "x".into(), DEFAULT_THREAD_ID));
        let taken = list.take_all();
        assert_eq!(taken.len(), 1);
        assert!(list.is_empty());
        assert!(read_thread(&ctx.backend, DEFAULT_THREAD_ID).is_empty());
    }

    #[test]
    fn migration_moves_legacy_notes_once() {
        let (ctx, _) = test_context();
        ctx.backend.set(LEGACY_NOTES_KEY, LEGACY).unwrap();
        let mut list = NoteList::load(ctx.backend.clone(), DEFAULT_THREAD_ID);

        assert_eq!(migrate_legacy_notes(&ctx.backend, &mut list), 2);
        let texts: Vec<&str> = list.notes().iter().map(|n| n.note.as_str()).collect();
        assert_eq!(texts, vec!["newer\n", "older\n"]);
        assert!(list.notes().iter().all(|n| n.thread_id == DEFAULT_THREAD_ID));
        assert_eq!(ctx.backend.get(LEGACY_NOTES_KEY).unwrap().as_deref(), Some("[]"));

        assert_eq!(migrate_legacy_notes(&ctx.backend, &mut list), 0);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn migration_skips_when_default_thread_has_notes() {
        let (ctx, _) = test_context();
        let mut list = NoteList::load(ctx.backend.clone(), DEFAULT_THREAD_ID);
        list.push_front(build_note(&ctx, "existing".into(), DEFAULT_THREAD_ID));
        ctx.backend.set(LEGACY_NOTES_KEY, LEGACY).unwrap();

        assert_eq!(migrate_legacy_notes(&ctx.backend, &mut list), 0);
        assert_eq!(list.len(), 1);
        assert!(ctx.backend.get(LEGACY_NOTES_KEY).unwrap().unwrap().contains("older"));
    }

    #[test]
    fn migration_writes_default_key_when_another_thread_is_active() {
        let (ctx, _) = test_context();
        ctx.backend.set(LEGACY_NOTES_KEY, LEGACY).unwrap();
        let mut list = NoteList::load(ctx.backend.clone(), "thread_5");

        assert_eq!(migrate_legacy_notes(&ctx.backend, &mut list), 2);
        assert!(list.is_empty());
        assert_eq!(read_thread(&ctx.backend, DEFAULT_THREAD_ID).len(), 2);
    }
}
