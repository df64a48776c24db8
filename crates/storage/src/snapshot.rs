// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for the state store.
//!
//! A snapshot is the complete table set serialized to JSON and
//! zstd-compressed. Writes go to a `.tmp` sibling, fsync, then rename, so a
//! crash mid-write never destroys the previous snapshot. Up to three `.bak`
//! generations are rotated on every successful write and tried in order when
//! the primary file fails to load.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// zstd level: fast enough for a per-flush write, small enough on disk.
const COMPRESSION_LEVEL: i32 = 3;

/// Backup generations kept alongside the snapshot.
const BACKUP_GENERATIONS: u32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
    #[error("no readable snapshot at {0}")]
    Unreadable(PathBuf),
}

/// Path of one backup generation: `.bak` is the newest, `.bak.2` and
/// `.bak.3` progressively older.
fn backup_path(path: &Path, generation: u32) -> PathBuf {
    match generation {
        1 => path.with_extension("bak"),
        n => path.with_extension(format!("bak.{n}")),
    }
}

/// Age every existing backup by one generation and return the freed newest
/// slot. The generation past the retention limit falls off the end.
fn shift_backups(path: &Path) -> PathBuf {
    for generation in (1..=BACKUP_GENERATIONS).rev() {
        let current = backup_path(path, generation);
        if !current.exists() {
            continue;
        }
        if generation == BACKUP_GENERATIONS {
            let _ = fs::remove_file(&current);
        } else {
            let _ = fs::rename(&current, backup_path(path, generation + 1));
        }
    }
    backup_path(path, 1)
}

/// Candidate paths to try on load: primary first, then backups newest-first.
fn read_candidates(path: &Path) -> Vec<PathBuf> {
    std::iter::once(path.to_path_buf())
        .chain((1..=BACKUP_GENERATIONS).map(|generation| backup_path(path, generation)))
        .collect()
}

/// Versioned envelope around the serialized table set.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(rename = "v")]
    pub version: u32,
    pub state: T,
}

/// Write `state` durably to `path`.
///
/// The previous snapshot (if any) is rotated into the backup chain before
/// the rename lands.
pub(crate) fn write<T: Serialize>(path: &Path, state: &T) -> Result<u64, SnapshotError> {
    let envelope = Envelope { version: CURRENT_SNAPSHOT_VERSION, state };
    let json = serde_json::to_vec(&envelope)?;
    let compressed = zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&compressed)?;
        file.sync_all()?;
    }

    if path.exists() {
        let _ = fs::copy(path, shift_backups(path));
    }
    fs::rename(&tmp, path)?;

    // Make the rename durable
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(compressed.len() as u64)
}

/// Load the most recent readable snapshot at `path`.
///
/// Returns `Ok(None)` when neither the primary file nor any backup exists;
/// corrupt files fall through to the next backup generation.
pub(crate) fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    let mut any_existed = false;
    for candidate in read_candidates(path) {
        if !candidate.exists() {
            continue;
        }
        any_existed = true;
        match try_load(&candidate) {
            Ok(state) => return Ok(Some(state)),
            Err(err) => {
                tracing::warn!(path = %candidate.display(), error = %err, "snapshot unreadable, trying backup");
            }
        }
    }
    if any_existed {
        Err(SnapshotError::Unreadable(path.to_path_buf()))
    } else {
        Ok(None)
    }
}

fn try_load<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let compressed = fs::read(path)?;
    let json = zstd::decode_all(compressed.as_slice())?;
    let envelope: Envelope<T> = serde_json::from_slice(&json)?;
    if envelope.version > CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(envelope.version));
    }
    Ok(envelope.state)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
