// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector-wide error taxonomy.
//!
//! Component boundaries translate their module errors into a
//! [`ConnectorError`] carrying one of the [`ErrorKind`] variants. The kind
//! decides the recovery path: transient kinds are retried by the next
//! convergence tick, auth/gone kinds restart the supervised group, per-run
//! kinds mark the run failed with a user-visible message.

use thiserror::Error;

/// Classification of a connector error, driving recovery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Cooperative cancellation; propagated, never retried.
    Cancelled,
    /// Caller bug; fatal to the caller, never retried.
    InvalidArgument,
    /// Use after dispose; fatal to the caller.
    Disposed,
    /// Download refused permanently (above the hard size cap).
    SizeExceeded,
    /// Download deferred (above the soft size cap); retried on a later tick.
    TooLargeToDownloadNow,
    /// HTTP 5xx / connection reset; retried implicitly by the next tick.
    NetworkTransient,
    /// HTTP 401/403; restarts the supervised group.
    NetworkAuth,
    /// HTTP 410; restarts the supervised group.
    ControlPlaneGone,
    /// Model could not be parsed; recorded remotely, no local retry.
    ParseFailure,
    /// Simulator rejected or failed the run; run goes to `failure`.
    SimulatorFailure,
    /// Anything unclassified; supervisor catches and restarts.
    Internal,
}

impl ErrorKind {
    /// Kinds that the next convergence tick retries without escalation.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NetworkTransient | ErrorKind::TooLargeToDownloadNow)
    }

    /// Kinds that force a supervised restart of the whole component group.
    pub fn restarts_group(self) -> bool {
        matches!(self, ErrorKind::NetworkAuth | ErrorKind::ControlPlaneGone)
    }
}

crate::simple_display! {
    ErrorKind {
        Cancelled => "cancelled",
        InvalidArgument => "invalid argument",
        Disposed => "disposed",
        SizeExceeded => "size exceeded",
        TooLargeToDownloadNow => "too large to download now",
        NetworkTransient => "network transient",
        NetworkAuth => "network auth",
        ControlPlaneGone => "control plane gone",
        ParseFailure => "parse failure",
        SimulatorFailure => "simulator failure",
        Internal => "internal",
    }
}

/// Boundary error type shared across the connector.
///
/// Cloneable so deduplicated task waiters can all observe the same failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ConnectorError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status when the error originated from the control plane.
    pub status: Option<u16>,
}

impl ConnectorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), status: None }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn simulator(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SimulatorFailure, message)
    }

    /// Classify a control-plane HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::NetworkAuth,
            410 => ErrorKind::ControlPlaneGone,
            408 | 429 => ErrorKind::NetworkTransient,
            s if s >= 500 => ErrorKind::NetworkTransient,
            _ => ErrorKind::Internal,
        };
        Self { kind, message: message.into(), status: Some(status) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
