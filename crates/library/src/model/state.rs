// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local, persisted view of one model revision.

use serde::{Deserialize, Serialize};
use sim_core::{DependencyFile, ModelRevision, ParsingStatus};
use sim_driver::{ModelFileRef, ModelFiles};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// Local parsing record paired with a revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsingInfo {
    pub parsed: bool,
    pub status: ParsingStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// A dependency file with its materialization result.
///
/// `file_path` is non-null iff the file existed on disk when the state was
/// written; `init` re-validates and clears stale paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDependencyFile {
    pub file_id: i64,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl From<&DependencyFile> for LocalDependencyFile {
    fn from(dep: &DependencyFile) -> Self {
        Self { file_id: dep.file_id, arguments: dep.arguments.clone(), file_path: None }
    }
}

/// Everything the connector knows locally about one model revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalModelState {
    pub revision: ModelRevision,
    /// Primary model file, once materialized.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub download_attempts: u32,
    /// True when the primary file and every dependency materialized.
    #[serde(default)]
    pub downloaded: bool,
    /// True once the revision passed through parsing (either outcome).
    #[serde(default)]
    pub processed: bool,
    /// False when the revision is permanently unreadable (hard size cap,
    /// parse failure). Excluded from convergence until the remote resets it.
    #[serde(default = "default_true")]
    pub can_read: bool,
    #[serde(default)]
    pub parsing_info: ParsingInfo,
    #[serde(default)]
    pub dependency_files: Vec<LocalDependencyFile>,
}

impl LocalModelState {
    pub fn new(revision: ModelRevision) -> Self {
        let dependency_files =
            revision.external_dependencies.iter().map(LocalDependencyFile::from).collect();
        Self {
            revision,
            file_path: None,
            extension: None,
            download_attempts: 0,
            downloaded: false,
            processed: false,
            can_read: true,
            parsing_info: ParsingInfo::default(),
            dependency_files,
        }
    }

    /// Whether the convergence sweep should try to materialize this state.
    pub fn needs_processing(&self, max_download_attempts: u32) -> bool {
        self.can_read && !self.processed && self.download_attempts < max_download_attempts
    }

    /// Merge a freshly-listed remote record into this state.
    ///
    /// A remote status reset to `unknown` (after a local terminal outcome)
    /// or a changed primary file re-opens the revision for processing.
    /// Returns whether anything changed.
    pub fn apply_remote(&mut self, remote: ModelRevision) -> bool {
        let reparse_requested =
            remote.status == ParsingStatus::Unknown && self.parsing_info.status != ParsingStatus::Unknown;
        let file_changed = remote.file_id != self.revision.file_id;
        let unchanged = remote.last_updated_time == self.revision.last_updated_time
            && !reparse_requested
            && !file_changed;
        if unchanged {
            return false;
        }

        if file_changed {
            self.file_path = None;
            self.extension = None;
            self.downloaded = false;
        }
        if reparse_requested || file_changed {
            self.processed = false;
            self.can_read = true;
            self.download_attempts = 0;
            self.parsing_info = ParsingInfo::default();
        }

        // Re-key dependencies, keeping paths for file ids that survived.
        let existing: HashMap<i64, Option<PathBuf>> =
            self.dependency_files.iter().map(|d| (d.file_id, d.file_path.clone())).collect();
        self.dependency_files = remote
            .external_dependencies
            .iter()
            .map(|dep| {
                let mut local = LocalDependencyFile::from(dep);
                if let Some(path) = existing.get(&dep.file_id).cloned().flatten() {
                    local.file_path = Some(path);
                }
                local
            })
            .collect();

        self.revision = remote;
        true
    }

    /// Validate recorded paths against the filesystem, demoting the state
    /// when the primary file went missing. Returns whether anything changed.
    pub fn validate_files(&mut self) -> bool {
        let mut changed = false;
        if let Some(path) = &self.file_path {
            if !path.exists() {
                self.file_path = None;
                self.downloaded = false;
                self.processed = false;
                changed = true;
            }
        }
        for dep in &mut self.dependency_files {
            if let Some(path) = &dep.file_path {
                if !path.exists() {
                    dep.file_path = None;
                    self.downloaded = false;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Whether the primary file is materialized at its recorded path.
    pub fn primary_on_disk(&self) -> bool {
        self.file_path.as_ref().is_some_and(|p| p.exists())
    }

    /// The driver-facing shape, available once the primary file exists.
    pub fn model_files(&self) -> Option<ModelFiles> {
        let primary_path = self.file_path.clone()?;
        Some(ModelFiles {
            revision_external_id: self.revision.external_id.clone(),
            primary_path,
            extension: self.extension.clone(),
            dependencies: self
                .dependency_files
                .iter()
                .map(|d| ModelFileRef {
                    file_id: d.file_id,
                    path: d.file_path.clone(),
                    arguments: d.arguments.clone(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
