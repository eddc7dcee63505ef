use anyhow::{Context as _, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::store::{KvBackend, StorageChange};

/// Default location of the note database.
/// Falls back to the working directory if no home directory is known.
pub fn default_db_path() -> PathBuf {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/share/scratch-notes/scratch.sqlite");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("scratch-notes").join("scratch.sqlite");
        }
    }

    PathBuf::from("scratch.sqlite")
}

/// Open (creating if needed) the note database.
/// WAL lets a watcher process read while another process writes.
pub fn open_store_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open '{}'", path.display()))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         CREATE TABLE IF NOT EXISTS kv (
             key      TEXT PRIMARY KEY,
             value    TEXT,
             revision INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS kv_revision ON kv(revision);",
    )?;
    Ok(conn)
}

/// `KvBackend` over a single SQLite table.
///
/// A removed key stays as a row with a NULL value so `changes_since` can
/// report the removal.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_store_db(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE kv (
                 key      TEXT PRIMARY KEY,
                 value    TEXT,
                 revision INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        conn.execute(
            "INSERT INTO kv (key, value, revision)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(revision), 0) + 1 FROM kv))
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 revision = excluded.revision",
            params![key, value],
        )?;
        Ok(())
    }
}

impl KvBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None)
    }

    fn revision(&self) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        let rev: i64 = conn.query_row("SELECT COALESCE(MAX(revision), 0) FROM kv", [], |row| {
            row.get(0)
        })?;
        Ok(rev)
    }

    fn changes_since(&self, revision: i64) -> Result<Vec<StorageChange>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        let mut stmt = conn.prepare(
            "SELECT key, value, revision
             FROM kv
             WHERE revision > ?1
             ORDER BY revision ASC",
        )?;
        let changes = stmt
            .query_map([revision], |row| {
                Ok(StorageChange {
                    key: row.get::<_, String>(0)?,
                    value: row.get::<_, Option<String>>(1)?,
                    revision: row.get::<_, i64>(2)?,
                })
            })?
            .filter_map(|r| {
                r.map_err(|e| tracing::warn!("Skipping malformed row: {e}"))
                    .ok()
            })
            .collect();
        Ok(changes)
    }
}
