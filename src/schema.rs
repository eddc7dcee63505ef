//! Versioned on-disk records.
//!
//! Stored values written before threading existed lack `threadId` on notes and
//! `sourceThreadId` on archive entries. Each shape gets its own record type and
//! a `From` impl that migrates it to the current in-memory type, so the rest of
//! the crate never deals with the optional fields.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{ArchiveEntry, Note, NoteMeta, DEFAULT_THREAD_ID};

/// Note as stored before threads were introduced.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteV0 {
    pub id: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: Option<NoteMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteV1 {
    pub id: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: Option<NoteMeta>,
    pub thread_id: String,
}

/// Any stored note. Variants are tried newest first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NoteRecord {
    V1(NoteV1),
    V0(NoteV0),
}

impl From<NoteV0> for NoteV1 {
    fn from(v0: NoteV0) -> Self {
        Self {
            id: v0.id,
            note: v0.note,
            created_at: v0.created_at,
            meta: v0.meta,
            thread_id: DEFAULT_THREAD_ID.to_string(),
        }
    }
}

impl From<NoteRecord> for Note {
    fn from(record: NoteRecord) -> Self {
        let v1 = match record {
            NoteRecord::V1(v1) => v1,
            NoteRecord::V0(v0) => v0.into(),
        };
        Note {
            id: v1.id,
            note: v1.note,
            created_at: v1.created_at,
            meta: v1.meta,
            thread_id: v1.thread_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveV0 {
    pub timestamp: DateTime<Utc>,
    pub notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveV1 {
    pub timestamp: DateTime<Utc>,
    pub notes: Vec<Note>,
    pub source_thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ArchiveRecord {
    V1(ArchiveV1),
    V0(ArchiveV0),
}

impl From<ArchiveV0> for ArchiveV1 {
    fn from(v0: ArchiveV0) -> Self {
        Self {
            timestamp: v0.timestamp,
            notes: v0.notes,
            source_thread_id: DEFAULT_THREAD_ID.to_string(),
        }
    }
}

impl From<ArchiveRecord> for ArchiveEntry {
    fn from(record: ArchiveRecord) -> Self {
        let v1 = match record {
            ArchiveRecord::V1(v1) => v1,
            ArchiveRecord::V0(v0) => v0.into(),
        };
        ArchiveEntry {
            timestamp: v1.timestamp,
            notes: v1.notes,
            source_thread_id: v1.source_thread_id,
        }
    }
}
