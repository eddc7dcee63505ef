use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{ArchiveRecord, NoteRecord};

/// Id of the thread every install starts with. Legacy notes land here.
pub const DEFAULT_THREAD_ID: &str = "default";

/// Display name of the default thread, also used when an archive's source
/// thread can no longer be found.
pub const DEFAULT_THREAD_NAME: &str = "Default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    pub version: String,
}

/// A single scratch note. Never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NoteRecord", rename_all = "camelCase")]
pub struct Note {
    pub id: String, // creation time in Unix ms
    pub note: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<NoteMeta>,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Display position. Not necessarily contiguous.
    pub order: u32,
}

impl Thread {
    pub fn default_thread(created_at: DateTime<Utc>) -> Self {
        Self {
            id: DEFAULT_THREAD_ID.to_string(),
            name: DEFAULT_THREAD_NAME.to_string(),
            created_at,
            updated_at: None,
            order: 0,
        }
    }
}

/// The singleton thread list plus the persisted active-thread pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsConfig {
    pub threads: Vec<Thread>,
    pub active_thread_id: String,
    pub version: String,
}

impl ThreadsConfig {
    pub fn initial(created_at: DateTime<Utc>, version: &str) -> Self {
        Self {
            threads: vec![Thread::default_thread(created_at)],
            active_thread_id: DEFAULT_THREAD_ID.to_string(),
            version: version.to_string(),
        }
    }
}

/// A batch of notes removed by a clear, kept so it can be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ArchiveRecord", rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub timestamp: DateTime<Utc>,
    pub notes: Vec<Note>,
    pub source_thread_id: String,
}
