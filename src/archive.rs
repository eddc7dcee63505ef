use std::sync::Arc;

use anyhow::Result;

use crate::store::{KvBackend, PersistentValue, StorageChange, ARCHIVE_KEY};
use crate::types::ArchiveEntry;

/// Cleared batches kept for restore, across all threads.
pub const MAX_ARCHIVE_ENTRIES: usize = 3;

/// Global archive of cleared note batches, newest first.
pub struct Archive {
    entries: PersistentValue<Vec<ArchiveEntry>>,
}

impl Archive {
    pub fn load(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            entries: PersistentValue::load(backend, ARCHIVE_KEY, Vec::new()),
        }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        self.entries.get()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.get().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.get().len()
    }

    pub fn get(&self, index: usize) -> Option<&ArchiveEntry> {
        self.entries.get().get(index)
    }

    /// Add `entry` as the newest; the oldest beyond the limit is evicted.
    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.update(|current| {
            std::iter::once(entry)
                .chain(current.iter().cloned())
                .take(MAX_ARCHIVE_ENTRIES)
                .collect()
        });
    }

    /// Drop the entry at `index` and return it.
    pub fn remove(&mut self, index: usize) -> Result<ArchiveEntry> {
        let entry = self
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No archive entry at index {index}"))?;
        self.entries.update(|current| {
            current
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, e)| e.clone())
                .collect()
        });
        Ok(entry)
    }

    pub fn apply_change(&mut self, change: &StorageChange) -> bool {
        self.entries.apply_change(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(minute: u32, source: &str) -> ArchiveEntry {
        ArchiveEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap(),
            notes: vec![],
            source_thread_id: source.to_string(),
        }
    }

    #[test]
    fn keeps_three_newest_first() {
        let (ctx, _) = test_context();
        let mut archive = Archive::load(ctx.backend.clone());
        for minute in 0..5 {
            archive.push(entry(minute, "default"));
        }
        assert_eq!(archive.len(), MAX_ARCHIVE_ENTRIES);
        let stamps: Vec<_> = archive.entries().iter().map(|e| e.timestamp).collect();
        let newest = Utc.with_ymd_and_hms(2024, 3, 1, 9, 4, 0).unwrap();
        assert_eq!(
            stamps,
            vec![newest, newest - Duration::minutes(1), newest - Duration::minutes(2)]
        );

        let reloaded = Archive::load(ctx.backend.clone());
        assert_eq!(reloaded.len(), 3);
    }

    #[test]
    fn remove_by_index() {
        let (ctx, _) = test_context();
        let mut archive = Archive::load(ctx.backend.clone());
        archive.push(entry(0, "a"));
        archive.push(entry(1, "b"));

        let removed = archive.remove(1).unwrap();
        assert_eq!(removed.source_thread_id, "a");
        assert_eq!(archive.len(), 1);
        assert!(archive.remove(5).is_err());
    }
}
