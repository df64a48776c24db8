// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log severity shared between local tracing and the remote log sink.

use serde::{Deserialize, Serialize};

/// Severity of a forwarded log entry.
///
/// Ordering matters: the remote sink drops entries below a run's minimum
/// severity, so `Debug < Information < Warning < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum LogSeverity {
    Debug,
    #[default]
    Information,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogSeverity::Debug),
            "information" | "info" => Some(LogSeverity::Information),
            "warning" | "warn" => Some(LogSeverity::Warning),
            "error" => Some(LogSeverity::Error),
            _ => None,
        }
    }
}

crate::simple_display! {
    LogSeverity {
        Debug => "Debug",
        Information => "Information",
        Warning => "Warning",
        Error => "Error",
    }
}

#[cfg(test)]
#[path = "severity_tests.rs"]
mod tests;
