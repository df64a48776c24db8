// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary artifact downloads with size thresholds.
//!
//! Two caps apply before any bytes are written: above
//! `max_file_download_size` the download is refused outright, above
//! `large_file_size` it is deferred so a convergence tick can retry when the
//! connector is less busy. Bodies stream to a `.part` sibling and rename
//! into place, so a partially-written file never shadows a complete one.

use async_trait::async_trait;
use futures_util::StreamExt;
use sim_core::{ConnectorError, ErrorKind};
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from file fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("file is {size} bytes, over the {limit} byte download cap")]
    SizeExceeded { size: u64, limit: u64 },
    #[error("file is {size} bytes, deferring download until a later tick")]
    TooLargeToDownloadNow { size: u64, threshold: u64 },
    #[error("download failed{}: {message}", fmt_status(.status))]
    Http { status: Option<u16>, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" with code {s}")).unwrap_or_default()
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            FetchError::TooLargeToDownloadNow { .. } => ErrorKind::TooLargeToDownloadNow,
            FetchError::Http { .. } => ErrorKind::NetworkTransient,
            FetchError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<FetchError> for ConnectorError {
    fn from(err: FetchError) -> Self {
        ConnectorError::new(err.kind(), err.to_string())
    }
}

/// Download size thresholds, bytes.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Hard cap: larger downloads are refused permanently.
    pub max_file_download_size: u64,
    /// Soft cap: larger downloads are deferred and retried later.
    pub large_file_size: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_file_download_size: 8 * 1024 * 1024 * 1024,
            large_file_size: 1024 * 1024 * 1024,
        }
    }
}

impl FetchLimits {
    /// Apply both caps to an announced content length.
    pub fn check(&self, size: u64) -> Result<(), FetchError> {
        if size > self.max_file_download_size {
            return Err(FetchError::SizeExceeded { size, limit: self.max_file_download_size });
        }
        if size > self.large_file_size {
            return Err(FetchError::TooLargeToDownloadNow {
                size,
                threshold: self.large_file_size,
            });
        }
        Ok(())
    }
}

/// Downloads one artifact to a local path.
///
/// Implementations are idempotent on path: re-downloading an existing file
/// replaces it atomically. Returns whether a download happened.
#[async_trait]
pub trait FileFetcher: Send + Sync + 'static {
    async fn download(&self, url: &str, local_path: &Path) -> Result<bool, FetchError>;
}

/// Production fetcher over reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    limits: FetchLimits,
}

impl HttpFetcher {
    pub fn new(limits: FetchLimits) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FetchError::Http { status: None, message: e.to_string() })?;
        Ok(Self { client, limits })
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn download(&self, url: &str, local_path: &Path) -> Result<bool, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http { status: None, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: Some(status.as_u16()),
                message: format!("GET {url}"),
            });
        }

        if let Some(announced) = response.content_length() {
            self.limits.check(announced)?;
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = local_path.with_extension("part");
        let mut file = tokio::fs::File::create(&part).await?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| FetchError::Http { status: None, message: e.to_string() })?;
            written += chunk.len() as u64;
            // Servers may omit or lie about Content-Length; re-check as
            // bytes arrive.
            if let Err(err) = self.limits.check(written) {
                drop(file);
                let _ = tokio::fs::remove_file(&part).await;
                return Err(err);
            }
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part, local_path).await?;

        tracing::debug!(url, path = %local_path.display(), bytes = written, "downloaded file");
        Ok(true)
    }
}

// ── Test support ────────────────────────────────────────────────────────

/// Scripted outcome for one fake download.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Write these bytes and succeed.
    Content(Vec<u8>),
    /// Fail with an HTTP status.
    Status(u16),
    /// Defer as too-large-to-download-now.
    TooLarge,
    /// Refuse as over the hard cap.
    SizeExceeded,
}

/// Fake fetcher for deterministic testing.
///
/// Outcomes queue per URL; when a queue is empty the download succeeds with
/// placeholder bytes. Calls are recorded.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeFetcher {
    inner: std::sync::Arc<parking_lot::Mutex<FakeFetcherState>>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
struct FakeFetcherState {
    scripts: std::collections::HashMap<String, std::collections::VecDeque<FakeOutcome>>,
    calls: Vec<(String, std::path::PathBuf)>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next download of `url`.
    pub fn script(&self, url: impl Into<String>, outcome: FakeOutcome) {
        self.inner.lock().scripts.entry(url.into()).or_default().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<(String, std::path::PathBuf)> {
        self.inner.lock().calls.clone()
    }

    pub fn download_count(&self, url: &str) -> usize {
        self.inner.lock().calls.iter().filter(|(u, _)| u == url).count()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl FileFetcher for FakeFetcher {
    async fn download(&self, url: &str, local_path: &Path) -> Result<bool, FetchError> {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.calls.push((url.to_string(), local_path.to_path_buf()));
            inner.scripts.get_mut(url).and_then(|q| q.pop_front())
        };
        let content = match outcome {
            None => format!("fake-content for {url}").into_bytes(),
            Some(FakeOutcome::Content(bytes)) => bytes,
            Some(FakeOutcome::Status(status)) => {
                return Err(FetchError::Http { status: Some(status), message: format!("GET {url}") })
            }
            Some(FakeOutcome::TooLarge) => {
                return Err(FetchError::TooLargeToDownloadNow { size: 0, threshold: 0 })
            }
            Some(FakeOutcome::SizeExceeded) => {
                return Err(FetchError::SizeExceeded { size: 0, limit: 0 })
            }
        };
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, content).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
