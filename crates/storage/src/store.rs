// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table/record key-value store backing the model and routine libraries.
//!
//! Tables are named maps of id → [`StoredRecord`]. Everything lives in
//! memory behind a mutex; `flush` writes the whole table set as one snapshot
//! when anything changed since the last write. Each library owns a disjoint
//! set of tables, so there is no cross-writer coordination to get wrong.

use crate::snapshot::{self, SnapshotError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from state store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("record {table}/{id} failed to serialize: {source}")]
    Encode {
        table: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A serialized record plus its write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Epoch ms of the last upsert of this record.
    pub last_updated_time: i64,
    pub value: serde_json::Value,
}

/// Extraction window already synced from the remote, persisted per table so
/// a restart resumes where the previous poll left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRange {
    /// Earliest remote `lastUpdatedTime` covered by the local view.
    pub first: i64,
    /// Latest remote `lastUpdatedTime` covered by the local view.
    pub last: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedState {
    tables: BTreeMap<String, BTreeMap<String, StoredRecord>>,
    #[serde(default)]
    ranges: BTreeMap<String, ExtractedRange>,
}

struct Inner {
    state: PersistedState,
    dirty: bool,
}

/// Embedded key-value persistence for library state.
pub struct StateStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Create a store backed by the given snapshot file. Nothing is read
    /// until [`StateStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(Inner { state: PersistedState::default(), dirty: false }),
        }
    }

    /// Load persisted tables from disk, replacing any in-memory content.
    ///
    /// A missing file yields an empty store; a corrupt file falls back to the
    /// newest readable backup generation.
    pub fn load(&self) -> Result<(), StoreError> {
        let loaded: Option<PersistedState> = snapshot::load(&self.path)?;
        let mut inner = self.inner.lock();
        inner.state = loaded.unwrap_or_default();
        inner.dirty = false;
        Ok(())
    }

    /// Insert or replace a record.
    pub fn upsert<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Encode {
            table: table.to_string(),
            id: id.to_string(),
            source,
        })?;
        let mut inner = self.inner.lock();
        inner
            .state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), StoredRecord { last_updated_time: now_ms, value });
        inner.dirty = true;
        Ok(())
    }

    /// Remove a record. Missing records are not an error.
    pub fn delete(&self, table: &str, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(t) = inner.state.tables.get_mut(table) {
            if t.remove(id).is_some() {
                inner.dirty = true;
            }
        }
    }

    /// Decode every record in a table.
    ///
    /// Records that no longer decode (schema drift) are skipped with a
    /// warning; the library rebuilds them from the remote on its next poll.
    pub fn scan<T: DeserializeOwned>(&self, table: &str) -> Vec<(String, T)> {
        let inner = self.inner.lock();
        let Some(t) = inner.state.tables.get(table) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(t.len());
        for (id, record) in t {
            match serde_json::from_value(record.value.clone()) {
                Ok(decoded) => out.push((id.clone(), decoded)),
                Err(err) => {
                    tracing::warn!(table, id, error = %err, "dropping undecodable state record");
                }
            }
        }
        out
    }

    /// Decode one record, if present and readable.
    pub fn get<T: DeserializeOwned>(&self, table: &str, id: &str) -> Option<T> {
        let inner = self.inner.lock();
        let record = inner.state.tables.get(table)?.get(id)?;
        serde_json::from_value(record.value.clone()).ok()
    }

    /// Extraction range persisted for a table, if any.
    pub fn extracted_range(&self, table: &str) -> Option<ExtractedRange> {
        self.inner.lock().state.ranges.get(table).copied()
    }

    /// Persist the extraction range for a table.
    pub fn restore_extracted_range(&self, table: &str, range: ExtractedRange) {
        let mut inner = self.inner.lock();
        inner.state.ranges.insert(table.to_string(), range);
        inner.dirty = true;
    }

    /// Write the snapshot if anything changed since the last flush.
    ///
    /// Returns the compressed byte count when a write happened. The in-memory
    /// state stays authoritative on write failure; the next flush retries.
    pub fn flush(&self) -> Result<Option<u64>, StoreError> {
        let cloned = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return Ok(None);
            }
            inner.dirty = false;
            inner.state.clone()
        };
        match snapshot::write(&self.path, &cloned) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                self.inner.lock().dirty = true;
                Err(err.into())
            }
        }
    }

    /// Number of records in a table (0 when absent).
    pub fn len(&self, table: &str) -> usize {
        self.inner.lock().state.tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
