// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local on-disk cache of model revisions and their dependency files.
//!
//! The library keeps one [`LocalModelState`] per revision known to the
//! control plane, materializes files under `<files>/<fileId>/<fileId>.<ext>`,
//! parses through the simulator driver, and writes parsing status back.
//! All per-revision work funnels through a [`TaskHolder`] keyed on revision
//! id, so the scheduler, the runner, and the poll sweep can all trigger the
//! same revision without duplicating downloads or parses.

mod state;

pub use state::{LocalDependencyFile, LocalModelState, ParsingInfo};

use crate::fetcher::FileFetcher;
use crate::task_holder::TaskHolder;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use sim_client::ControlPlane;
use sim_client::ModelRevisionFilter;
use sim_core::{Clock, ConnectorError, ErrorKind, ModelRevision, ParsingState, ParsingStatus};
use sim_driver::SimulatorDriver;
use sim_storage::StateStore;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Store table owned by this library.
const STATE_TABLE: &str = "model_revisions";

/// Subdirectory for revisions materialized outside the main state map.
const TEMP_DIR: &str = "temp";

/// Timings and limits for the model library.
#[derive(Debug, Clone)]
pub struct ModelLibraryConfig {
    /// Root of the local file cache (`./files` by default).
    pub files_directory: PathBuf,
    pub library_update_interval: Duration,
    pub state_flush_interval: Duration,
    pub pagination_limit: usize,
    /// Deferred downloads stop retrying after this many attempts until the
    /// remote record changes again.
    pub max_download_attempts: u32,
}

impl Default for ModelLibraryConfig {
    fn default() -> Self {
        Self {
            files_directory: PathBuf::from("./files"),
            library_update_interval: Duration::from_secs(10),
            state_flush_interval: Duration::from_secs(10),
            pagination_limit: 100,
            max_download_attempts: 3,
        }
    }
}

/// Result of materializing one file.
enum FileOutcome {
    Present { path: PathBuf, extension: Option<String> },
    /// Over the soft cap; retried on a later tick.
    Deferred,
    /// Over the hard cap; the revision is permanently unreadable.
    Unreadable,
    /// Hard download error this pass (bad link, HTTP failure).
    Failed,
}

/// Authoritative local view of model revisions.
pub struct ModelLibrary<C: Clock> {
    client: Arc<dyn ControlPlane>,
    driver: Arc<dyn SimulatorDriver>,
    fetcher: Arc<dyn FileFetcher>,
    store: Arc<StateStore>,
    clock: C,
    config: ModelLibraryConfig,
    simulator_external_id: String,
    /// Main state map, keyed by revision external id.
    state: Mutex<HashMap<String, LocalModelState>>,
    /// Revisions materialized on demand that do not belong to this
    /// connector's simulator; cleaned by [`ModelLibrary::wipe_temporary_files`].
    temp_state: Mutex<HashMap<String, LocalModelState>>,
    /// Serializes materialization per revision id.
    revision_tasks: TaskHolder<i64, LocalModelState>,
    /// Collapses concurrent downloads of the same file id.
    file_tasks: TaskHolder<i64, PathBuf>,
    /// Deduplicates on-demand discovery per revision external id.
    discovery_tasks: TaskHolder<String, LocalModelState>,
}

impl<C: Clock> ModelLibrary<C> {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        driver: Arc<dyn SimulatorDriver>,
        fetcher: Arc<dyn FileFetcher>,
        store: Arc<StateStore>,
        clock: C,
        simulator_external_id: impl Into<String>,
        config: ModelLibraryConfig,
    ) -> Self {
        Self {
            client,
            driver,
            fetcher,
            store,
            clock,
            config,
            simulator_external_id: simulator_external_id.into(),
            state: Mutex::new(HashMap::new()),
            temp_state: Mutex::new(HashMap::new()),
            revision_tasks: TaskHolder::new(),
            file_tasks: TaskHolder::new(),
            discovery_tasks: TaskHolder::new(),
        }
    }

    /// Load persisted state and validate it against the filesystem.
    ///
    /// Starts no background work; [`ModelLibrary::run_tasks`] does that.
    pub fn init(&self) -> Result<(), ConnectorError> {
        let now_ms = self.clock.epoch_ms() as i64;
        let mut seeded = 0usize;
        for (external_id, mut state) in self.store.scan::<LocalModelState>(STATE_TABLE) {
            if state.validate_files() {
                debug!(revision = %external_id, "local files missing, state demoted");
                if let Err(err) = self.store.upsert(STATE_TABLE, &external_id, &state, now_ms) {
                    warn!(error = %err, "failed to persist demoted state");
                }
            }
            self.state.lock().insert(external_id, state);
            seeded += 1;
        }
        info!(revisions = seeded, "model library initialized");
        Ok(())
    }

    /// Long-running activities keeping the library converged: the remote
    /// poll (which also sweeps pending materializations) and the periodic
    /// state flush.
    pub fn run_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let poll = {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            async move { this.poll_loop(cancel).await }.boxed()
        };
        let flush = {
            let this = Arc::clone(self);
            async move { this.flush_loop(cancel).await }.boxed()
        };
        vec![poll, flush]
    }

    async fn poll_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.poll_once(&cancel).await {
                Ok(()) => {}
                Err(err) if err.kind().restarts_group() => {
                    error!(error = %err, "model library poll failed fatally");
                    return Err(err);
                }
                Err(err) if err.is_cancelled() => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "model library poll failed, will retry");
                }
            }
            tokio::select! {
                _ = self.clock.sleep(self.config.library_update_interval) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    async fn flush_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            tokio::select! {
                _ = self.clock.sleep(self.config.state_flush_interval) => {}
                _ = cancel.cancelled() => {
                    // Final flush on the way out.
                    if let Err(err) = self.store.flush() {
                        warn!(error = %err, "state flush on shutdown failed");
                    }
                    return Ok(());
                }
            }
            match self.store.flush() {
                Ok(Some(bytes)) => debug!(bytes, "state store flushed"),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "state flush failed, will retry"),
            }
        }
    }

    /// One convergence pass: list the remote catalog, merge, evict deleted
    /// revisions, then materialize everything pending.
    pub async fn poll_once(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), ConnectorError> {
        let mut cursor = None;
        let mut remote_ids: HashSet<String> = HashSet::new();
        loop {
            let filter = ModelRevisionFilter {
                simulator_external_id: Some(self.simulator_external_id.clone()),
                last_updated_after: None,
            };
            let page = self
                .client
                .list_model_revisions(filter, cursor, self.config.pagination_limit)
                .await
                .map_err(ConnectorError::from)?;

            let now_ms = self.clock.epoch_ms() as i64;
            for revision in page.items {
                remote_ids.insert(revision.external_id.clone());
                let changed = {
                    let mut map = self.state.lock();
                    match map.entry(revision.external_id.clone()) {
                        std::collections::hash_map::Entry::Occupied(mut occupied) => {
                            let state = occupied.get_mut();
                            state.apply_remote(revision).then(|| state.clone())
                        }
                        std::collections::hash_map::Entry::Vacant(vacant) => {
                            debug!(revision = %revision.external_id, "discovered model revision");
                            Some(vacant.insert(LocalModelState::new(revision)).clone())
                        }
                    }
                };
                if let Some(state) = changed {
                    if let Err(err) =
                        self.store.upsert(STATE_TABLE, &state.revision.external_id, &state, now_ms)
                    {
                        warn!(error = %err, "failed to persist merged revision state");
                    }
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        self.evict_deleted(&remote_ids);

        // Materialization sweep: every revision that still needs work, in
        // parallel; the per-revision holder serializes duplicates.
        let pending: Vec<ModelRevision> = {
            let map = self.state.lock();
            map.values()
                .filter(|s| s.needs_processing(self.config.max_download_attempts))
                .map(|s| s.revision.clone())
                .collect()
        };
        let sweeps = pending.into_iter().map(|revision| {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            async move {
                let external_id = revision.external_id.clone();
                if let Err(err) = this.ensure_materialized(revision, false, &cancel).await {
                    if err.is_cancelled() {
                        return;
                    }
                    warn!(revision = %external_id, error = %err, "materialization failed");
                }
            }
        });
        futures_util::future::join_all(sweeps).await;

        Ok(())
    }

    /// Drop local state for revisions deleted remotely, files included.
    fn evict_deleted(&self, remote_ids: &HashSet<String>) {
        let evicted: Vec<LocalModelState> = {
            let mut map = self.state.lock();
            let gone: Vec<String> =
                map.keys().filter(|id| !remote_ids.contains(*id)).cloned().collect();
            gone.into_iter().filter_map(|id| map.remove(&id)).collect()
        };
        for state in evicted {
            info!(revision = %state.revision.external_id, "evicting deleted model revision");
            self.store.delete(STATE_TABLE, &state.revision.external_id);
            let dir = self.config.files_directory.join(state.revision.file_id.to_string());
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(path = %dir.display(), error = %err, "failed to remove evicted files");
                }
            }
        }
    }

    /// The fully-materialized state for a revision external id.
    ///
    /// Known revisions go straight to materialization; unknown ones are
    /// discovered with a single remote retrieve shared by concurrent
    /// callers. A revision that belongs to a different simulator is held in
    /// the temporary map under `files/temp/`.
    pub async fn model_revision(
        self: &Arc<Self>,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<LocalModelState, ConnectorError> {
        let known = self.state.lock().get(external_id).map(|s| s.revision.clone());
        if let Some(revision) = known {
            return self.ensure_materialized(revision, false, cancel).await;
        }

        let this = Arc::clone(self);
        let eid = external_id.to_string();
        self.discovery_tasks
            .execute(
                external_id.to_string(),
                move |token| async move {
                    let revision = this
                        .client
                        .model_revision_by_external_id(&eid)
                        .await
                        .map_err(ConnectorError::from)?;
                    let temp = revision.simulator_external_id != this.simulator_external_id;
                    if temp {
                        debug!(revision = %eid, "materializing foreign revision into temp state");
                    }
                    this.ensure_materialized(revision, temp, &token).await
                },
                cancel,
            )
            .await
    }

    /// Remove the ephemeral `temp/` subtree and clear the temporary map.
    pub fn wipe_temporary_files(&self) {
        self.temp_state.lock().clear();
        let dir = self.config.files_directory.join(TEMP_DIR);
        if dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %err, "failed to wipe temporary model files");
            }
        }
    }

    /// Snapshot of the current state map (test and status visibility).
    pub fn states(&self) -> Vec<LocalModelState> {
        self.state.lock().values().cloned().collect()
    }

    /// Materialize through the per-revision holder.
    async fn ensure_materialized(
        self: &Arc<Self>,
        revision: ModelRevision,
        temp: bool,
        cancel: &CancellationToken,
    ) -> Result<LocalModelState, ConnectorError> {
        let this = Arc::clone(self);
        let key = revision.id;
        self.revision_tasks
            .execute(key, move |token| async move { this.materialize(revision, temp, token).await }, cancel)
            .await
    }

    /// The materialization protocol for one revision. Runs with the
    /// per-revision task slot held.
    async fn materialize(
        self: Arc<Self>,
        revision: ModelRevision,
        temp: bool,
        cancel: CancellationToken,
    ) -> Result<LocalModelState, ConnectorError> {
        let external_id = revision.external_id.clone();
        let mut state = {
            let map = if temp { &self.temp_state } else { &self.state };
            let mut guard = map.lock();
            guard
                .entry(external_id.clone())
                .or_insert_with(|| LocalModelState::new(revision))
                .clone()
        };

        state.validate_files();
        if state.processed && state.primary_on_disk() {
            return Ok(state);
        }
        if !state.can_read {
            return Ok(state);
        }

        let base = if temp {
            self.config.files_directory.join(TEMP_DIR)
        } else {
            self.config.files_directory.clone()
        };
        let mut hard_failure = false;

        // Primary file.
        if !state.primary_on_disk() {
            let file_id = state.revision.file_id;
            let dir = base.join(file_id.to_string());
            match self.fetch_file(file_id, dir, state.extension.clone(), &cancel).await? {
                FileOutcome::Present { path, extension } => {
                    state.extension = extension.or(state.extension.take());
                    state.file_path = Some(path);
                }
                FileOutcome::Deferred => state.download_attempts += 1,
                FileOutcome::Unreadable => state.can_read = false,
                FileOutcome::Failed => {
                    state.download_attempts += 1;
                    hard_failure = true;
                }
            }
        }

        // Dependency files; failures here never stop the remaining files.
        for index in 0..state.dependency_files.len() {
            let (file_id, have) = {
                let dep = &state.dependency_files[index];
                (dep.file_id, dep.file_path.as_ref().is_some_and(|p| p.exists()))
            };
            if have {
                continue;
            }
            let dir = base.join(file_id.to_string());
            match self.fetch_file(file_id, dir, None, &cancel).await? {
                FileOutcome::Present { path, .. } => {
                    state.dependency_files[index].file_path = Some(path);
                }
                FileOutcome::Deferred => state.download_attempts += 1,
                FileOutcome::Unreadable => state.can_read = false,
                FileOutcome::Failed => {
                    state.download_attempts += 1;
                    hard_failure = true;
                }
            }
        }

        state.downloaded = state.primary_on_disk()
            && state.dependency_files.iter().all(|d| d.file_path.is_some());

        // Parse when the primary landed and nothing failed hard this pass;
        // deferred (too-large) dependencies do not block parsing.
        if state.can_read && !hard_failure && state.primary_on_disk() {
            self.parse(&mut state).await?;
        }

        if !temp {
            let now_ms = self.clock.epoch_ms() as i64;
            if let Err(err) = self.store.upsert(STATE_TABLE, &external_id, &state, now_ms) {
                warn!(revision = %external_id, error = %err, "failed to persist model state");
            }
        }
        let map = if temp { &self.temp_state } else { &self.state };
        map.lock().insert(external_id, state.clone());
        Ok(state)
    }

    /// Run the driver's model parser and record both local and remote status.
    async fn parse(&self, state: &mut LocalModelState) -> Result<(), ConnectorError> {
        let Some(files) = state.model_files() else {
            return Ok(());
        };
        let revision_id = state.revision.id;
        let external_id = state.revision.external_id.clone();

        let parsed = match self.driver.extract_model_information(&files).await {
            Ok(info) => {
                info!(revision = %external_id, addresses = info.addresses.len(), "model parsed");
                state.parsing_info =
                    ParsingInfo { parsed: true, status: ParsingStatus::Success, message: None };
                state.processed = true;
                ParsingState { status: ParsingStatus::Success, status_message: None }
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                return Err(ConnectorError::cancelled())
            }
            Err(err) if err.kind() == ErrorKind::ParseFailure => {
                warn!(revision = %external_id, error = %err, "model parse failed");
                let message = err.to_string();
                state.parsing_info = ParsingInfo {
                    parsed: false,
                    status: ParsingStatus::Failure,
                    message: Some(message.clone()),
                };
                state.processed = true;
                state.can_read = false;
                ParsingState { status: ParsingStatus::Failure, status_message: Some(message) }
            }
            Err(err) => {
                // Engine unavailable or similar: leave the revision pending
                // so the next convergence tick retries.
                warn!(revision = %external_id, error = %err, "model parse did not run");
                return Ok(());
            }
        };

        if let Err(err) = self.client.update_parsing_status(revision_id, parsed).await {
            warn!(revision = %external_id, error = %err, "failed to report parsing status");
        }
        Ok(())
    }

    /// Materialize one file, deduplicating concurrent downloads by file id.
    ///
    /// Only cancellation propagates as `Err`; every other failure becomes a
    /// [`FileOutcome`] so callers record it in the state instead of
    /// unwinding.
    async fn fetch_file(
        self: &Arc<Self>,
        file_id: i64,
        dir: PathBuf,
        ext_hint: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, ConnectorError> {
        if let Some(existing) = existing_local_file(&dir, file_id, ext_hint.as_deref()) {
            debug!(file_id, path = %existing.display(), "file already exists locally");
            let extension = file_extension(&existing);
            return Ok(FileOutcome::Present { path: existing, extension });
        }

        let this = Arc::clone(self);
        let target_dir = dir.clone();
        let result = self
            .file_tasks
            .execute(
                file_id,
                move |_token| async move {
                    let url = this
                        .client
                        .file_download_link(file_id)
                        .await
                        .map_err(ConnectorError::from)?;
                    let ext = url_extension(&url).unwrap_or_else(|| "bin".to_string());
                    let path = target_dir.join(format!("{file_id}.{ext}"));
                    this.fetcher.download(&url, &path).await.map_err(ConnectorError::from)?;
                    Ok(path)
                },
                cancel,
            )
            .await;

        match result {
            Ok(path) => {
                let extension = file_extension(&path);
                Ok(FileOutcome::Present { path, extension })
            }
            Err(err) => match err.kind() {
                ErrorKind::Cancelled => Err(err),
                ErrorKind::TooLargeToDownloadNow => {
                    warn!(file_id, "file too large to download now, deferring");
                    Ok(FileOutcome::Deferred)
                }
                ErrorKind::SizeExceeded => {
                    error!(file_id, error = %err, "file over the download cap, marking unreadable");
                    Ok(FileOutcome::Unreadable)
                }
                _ => {
                    warn!(file_id, error = %err, "file download failed");
                    Ok(FileOutcome::Failed)
                }
            },
        }
    }
}

/// Look for an already-materialized `<file_id>.<ext>` in `dir`.
fn existing_local_file(dir: &Path, file_id: i64, ext_hint: Option<&str>) -> Option<PathBuf> {
    if let Some(ext) = ext_hint {
        let expected = dir.join(format!("{file_id}.{ext}"));
        if expected.exists() {
            return Some(expected);
        }
    }
    let stem = file_id.to_string();
    std::fs::read_dir(dir).ok()?.flatten().map(|entry| entry.path()).find(|path| {
        path.is_file()
            && path.file_stem().is_some_and(|s| s.to_string_lossy() == stem)
            && path.extension().is_some_and(|e| e != "part" && e != "tmp")
    })
}

fn file_extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_string())
}

/// Derive the file extension from a download URL's path segment.
fn url_extension(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 8).then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
