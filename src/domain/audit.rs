//! Append-only audit trail of per-candidate errors.

use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;

use super::error::{ErrorKind, TraderError};

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub candidate_id: u64,
    pub kind: ErrorKind,
    pub message: String,
    /// Bar timestamp at which the error surfaced, if any bar was seen.
    pub ts: Option<NaiveDateTime>,
}

#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, candidate_id: u64, err: &TraderError, ts: Option<NaiveDateTime>) {
        self.push(AuditRecord {
            candidate_id,
            kind: err.kind(),
            message: err.to_string(),
            ts,
        });
    }

    pub fn push(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_candidate(&self, candidate_id: u64) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.candidate_id == candidate_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
