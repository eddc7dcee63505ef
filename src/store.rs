use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage key of the threads config record.
pub const THREADS_CONFIG_KEY: &str = "scratchNoteThreadsConfig";
/// Storage key of the archive (at most 3 entries).
pub const ARCHIVE_KEY: &str = "scratchNotesArchive";
/// Pre-threading flat note list. Read once by the migration.
pub const LEGACY_NOTES_KEY: &str = "scratchNotes";

/// Storage key holding the note list of `thread_id`.
pub fn thread_notes_key(thread_id: &str) -> String {
    format!("scratchNotes_thread_{thread_id}")
}

/// One write observed on a backend. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub value: Option<String>,
    pub revision: i64,
}

/// String key-value persistence. Values are JSON documents.
///
/// Every write bumps a backend-wide revision so other sessions can ask what
/// changed since the last revision they saw.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Highest revision written so far (0 for an untouched store).
    fn revision(&self) -> Result<i64>;
    /// Latest change of every key written after `revision`, oldest first.
    fn changes_since(&self, revision: i64) -> Result<Vec<StorageChange>>;
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, (Option<String>, i64)>,
    revision: i64,
}

/// Process-local backend. Sharing one instance between two sessions behaves
/// like two browser tabs on the same origin.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, key: &str, value: Option<String>) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {e}"))?;
        inner.revision += 1;
        let revision = inner.revision;
        inner.entries.insert(key.to_string(), (value, revision));
        Ok(())
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {e}"))?;
        Ok(inner.entries.get(key).and_then(|(v, _)| v.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None)
    }

    fn revision(&self) -> Result<i64> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {e}"))?;
        Ok(inner.revision)
    }

    fn changes_since(&self, revision: i64) -> Result<Vec<StorageChange>> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {e}"))?;
        let mut changes: Vec<StorageChange> = inner
            .entries
            .iter()
            .filter(|(_, (_, rev))| *rev > revision)
            .map(|(key, (value, rev))| StorageChange {
                key: key.clone(),
                value: value.clone(),
                revision: *rev,
            })
            .collect();
        changes.sort_by_key(|c| c.revision);
        Ok(changes)
    }
}

/// A typed value cached in memory and written through to a backend as JSON.
///
/// Reads and writes never fail from the caller's point of view: storage and
/// parse errors are logged, reads fall back to `fallback`, and a failed write
/// leaves the in-memory value in place.
pub struct PersistentValue<T> {
    backend: Arc<dyn KvBackend>,
    key: String,
    fallback: T,
    value: T,
}

impl<T> PersistentValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn load(backend: Arc<dyn KvBackend>, key: impl Into<String>, fallback: T) -> Self {
        let key = key.into();
        let value = read_or(&*backend, &key, &fallback);
        Self {
            backend,
            key,
            fallback,
            value,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.write_through();
    }

    /// Read-modify-write against the in-memory value.
    pub fn update(&mut self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value);
        self.set(next);
    }

    /// Point this value at another key and load it.
    pub fn rebind(&mut self, key: impl Into<String>, fallback: T) {
        self.key = key.into();
        self.value = read_or(&*self.backend, &self.key, &fallback);
        self.fallback = fallback;
    }

    fn write_through(&self) {
        let json = match serde_json::to_string(&self.value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize value for '{}': {e}", self.key);
                return;
            }
        };
        if let Err(e) = self.backend.set(&self.key, &json) {
            tracing::error!("Error writing '{}' to storage: {e:#}", self.key);
        }
    }
}

impl<T> PersistentValue<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq,
{
    /// Apply a write made by another session. Returns true if the in-memory
    /// value changed.
    pub fn apply_change(&mut self, change: &StorageChange) -> bool {
        if change.key != self.key {
            return false;
        }
        let incoming = match &change.value {
            None => self.fallback.clone(),
            Some(raw) => match serde_json::from_str::<T>(raw) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("Ignoring malformed external value for '{}': {e}", self.key);
                    return false;
                }
            },
        };
        if incoming == self.value {
            return false;
        }
        self.value = incoming;
        true
    }
}

fn read_or<T>(backend: &dyn KvBackend, key: &str, fallback: &T) -> T
where
    T: DeserializeOwned + Clone,
{
    match backend.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::error!("Error parsing stored value for '{key}': {e}");
            fallback.clone()
        }),
        Ok(None) => fallback.clone(),
        Err(e) => {
            tracing::error!("Error reading '{key}' from storage: {e:#}");
            fallback.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenBackend;

    impl KvBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            anyhow::bail!("disk on fire")
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
        fn remove(&self, _key: &str) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
        fn revision(&self) -> Result<i64> {
            Ok(0)
        }
        fn changes_since(&self, _revision: i64) -> Result<Vec<StorageChange>> {
            Ok(vec![])
        }
    }

    #[test]
    fn absent_key_uses_fallback() {
        let backend = Arc::new(MemoryBackend::new());
        let value = PersistentValue::load(backend, "missing", vec![1, 2]);
        assert_eq!(value.get(), &vec![1, 2]);
    }

    #[test]
    fn malformed_json_uses_fallback() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", "{not json").unwrap();
        let value = PersistentValue::load(backend, "k", 7u32);
        assert_eq!(*value.get(), 7);
    }

    #[test]
    fn set_writes_through_immediately() {
        let backend = Arc::new(MemoryBackend::new());
        let mut value = PersistentValue::load(backend.clone(), "k", Vec::<String>::new());
        value.set(vec!["a".to_string()]);
        assert_eq!(backend.get("k").unwrap().as_deref(), Some(r#"["a"]"#));

        value.update(|prev| {
            let mut next = vec!["b".to_string()];
            next.extend(prev.iter().cloned());
            next
        });
        assert_eq!(backend.get("k").unwrap().as_deref(), Some(r#"["b","a"]"#));
    }

    #[test]
    fn failed_storage_keeps_memory_state() {
        let mut value = PersistentValue::load(Arc::new(BrokenBackend), "k", 1u32);
        assert_eq!(*value.get(), 1);
        value.set(5);
        assert_eq!(*value.get(), 5);
    }

    #[test]
    fn rebind_reads_new_key() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("b", "[3]").unwrap();
        let mut value = PersistentValue::load(backend, "a", Vec::<u32>::new());
        value.rebind("b", Vec::new());
        assert_eq!(value.key(), "b");
        assert_eq!(value.get(), &vec![3]);
    }

    #[test]
    fn external_changes_replace_only_matching_key() {
        let backend = Arc::new(MemoryBackend::new());
        let mut value = PersistentValue::load(backend, "k", 0u32);

        let other = StorageChange { key: "other".into(), value: Some("9".into()), revision: 1 };
        assert!(!value.apply_change(&other));

        let ours = StorageChange { key: "k".into(), value: Some("4".into()), revision: 2 };
        assert!(value.apply_change(&ours));
        assert_eq!(*value.get(), 4);

        let garbage = StorageChange { key: "k".into(), value: Some("nope".into()), revision: 3 };
        assert!(!value.apply_change(&garbage));
        assert_eq!(*value.get(), 4);

        let removed = StorageChange { key: "k".into(), value: None, revision: 4 };
        assert!(value.apply_change(&removed));
        assert_eq!(*value.get(), 0);
    }

    #[test]
    fn memory_backend_reports_latest_changes_in_order() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").unwrap();
        backend.set("b", "2").unwrap();
        backend.set("a", "3").unwrap();
        assert_eq!(backend.revision().unwrap(), 3);

        let changes = backend.changes_since(1).unwrap();
        let keys: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(changes[1].value.as_deref(), Some("3"));
    }

    #[test]
    fn thread_keys_are_scoped() {
        assert_eq!(thread_notes_key("default"), "scratchNotes_thread_default");
    }
}
