// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sampling-window selection for time-series-backed inputs.
//!
//! The window is `[start, end]` with the calculation time at its midpoint.
//! Without any check the window simply ends at the validation end time. A
//! logical check restricts candidate calculation times to datapoints where
//! the condition holds; steady-state detection additionally requires a flat,
//! low-variance run of points. Both searches prefer the latest admissible
//! time.

use sim_client::{ApiError, ControlPlane};
use sim_core::{Datapoint, LogicalCheck, RoutineConfig, SteadyStateDetection};
use thiserror::Error;

/// Errors from sampling-window selection
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("data sampling is not enabled on this routine")]
    NotEnabled,
    #[error("logical check series {0} has no passing datapoint in the search window")]
    LogicalCheckFailed(String),
    #[error("no steady state found in series {0}")]
    SteadyStateNotFound(String),
    #[error("{kind} is enabled but no time series is configured")]
    MissingSeries { kind: &'static str },
    #[error("unknown logical check operator: {0}")]
    UnknownOperator(String),
    #[error("time series read failed: {0}")]
    Api(#[from] ApiError),
}

/// A selected sampling window; `calculation_time` is the midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingWindow {
    pub start: i64,
    pub end: i64,
    pub calculation_time: i64,
}

impl SamplingWindow {
    fn around(calculation_time: i64, window_ms: i64) -> Self {
        Self {
            start: calculation_time - window_ms / 2,
            end: calculation_time + window_ms / 2,
            calculation_time,
        }
    }
}

/// How far back the checks search for an admissible calculation time, in
/// multiples of the sampling window.
const SEARCH_FACTOR: i64 = 4;

/// Compute the sampling window for a routine, ending no later than
/// `validation_end_ms`.
pub async fn sampling_window(
    client: &dyn ControlPlane,
    config: &RoutineConfig,
    validation_end_ms: i64,
) -> Result<SamplingWindow, SamplingError> {
    let sampling = match &config.data_sampling {
        Some(s) if s.enabled => s,
        _ => return Err(SamplingError::NotEnabled),
    };
    let window_ms = sampling.sampling_window * 60_000;

    let logical = config.logical_check.as_ref().filter(|c| c.enabled);
    let steady = config.steady_state_detection.as_ref().filter(|c| c.enabled);

    if logical.is_none() && steady.is_none() {
        // No checks: the window ends at the validation end time.
        return Ok(SamplingWindow {
            start: validation_end_ms - window_ms,
            end: validation_end_ms,
            calculation_time: validation_end_ms - window_ms / 2,
        });
    }

    // A candidate calculation time must leave half a window of data before
    // the validation end.
    let latest_candidate = validation_end_ms - window_ms / 2;
    let search_start = validation_end_ms - SEARCH_FACTOR * window_ms;

    let mut admissible: Option<Vec<Datapoint>> = None;

    if let Some(check) = logical {
        let series = check
            .timeseries_external_id
            .as_deref()
            .ok_or(SamplingError::MissingSeries { kind: "logical check" })?;
        let points = client.datapoints_window(series, search_start, validation_end_ms).await?;
        let passing: Vec<Datapoint> = points
            .into_iter()
            .filter(|p| p.timestamp <= latest_candidate)
            .filter(|p| logical_check_passes(check, p.value).unwrap_or(false))
            .collect();
        if passing.is_empty() {
            return Err(SamplingError::LogicalCheckFailed(series.to_string()));
        }
        admissible = Some(passing);
    }

    if let Some(detection) = steady {
        let series = detection
            .timeseries_external_id
            .as_deref()
            .ok_or(SamplingError::MissingSeries { kind: "steady state detection" })?;
        let points = client.datapoints_window(series, search_start, validation_end_ms).await?;
        let candidate = steady_section_midpoint(detection, &points, latest_candidate, &admissible)
            .ok_or_else(|| SamplingError::SteadyStateNotFound(series.to_string()))?;
        return Ok(SamplingWindow::around(candidate, window_ms));
    }

    // Logical check only: latest passing datapoint is the calculation time.
    let passing = admissible.unwrap_or_default();
    let calculation_time =
        passing.iter().map(|p| p.timestamp).max().unwrap_or(latest_candidate);
    Ok(SamplingWindow::around(calculation_time, window_ms))
}

/// Evaluate one logical-check comparison.
pub fn logical_check_passes(check: &LogicalCheck, value: f64) -> Result<bool, SamplingError> {
    let target = check.value.unwrap_or(0.0);
    let op = check.operator.as_deref().unwrap_or("eq");
    let passed = match op {
        "eq" => (value - target).abs() < f64::EPSILON,
        "ne" => (value - target).abs() >= f64::EPSILON,
        "gt" => value > target,
        "ge" => value >= target,
        "lt" => value < target,
        "le" => value <= target,
        other => return Err(SamplingError::UnknownOperator(other.to_string())),
    };
    Ok(passed)
}

/// Find the midpoint timestamp of the latest steady section no later than
/// `latest_candidate`, optionally restricted to timestamps admitted by the
/// logical check.
fn steady_section_midpoint(
    detection: &SteadyStateDetection,
    points: &[Datapoint],
    latest_candidate: i64,
    admissible: &Option<Vec<Datapoint>>,
) -> Option<i64> {
    let min_size = detection.min_section_size.max(2) as usize;
    let usable: Vec<&Datapoint> = points
        .iter()
        .filter(|p| p.timestamp <= latest_candidate)
        .filter(|p| match admissible {
            Some(passing) => passing.iter().any(|a| a.timestamp == p.timestamp),
            None => true,
        })
        .collect();
    if usable.len() < min_size {
        return None;
    }

    // Slide a section of min_size over the points, latest first.
    for start in (0..=usable.len() - min_size).rev() {
        let section = &usable[start..start + min_size];
        let values: Vec<f64> = section.iter().map(|p| p.value).collect();
        let times: Vec<f64> = section.iter().map(|p| p.timestamp as f64).collect();
        if variance(&values) <= detection.var_threshold
            && slope(&times, &values).abs() <= detection.slope_threshold
        {
            let mid = (section[0].timestamp + section[section.len() - 1].timestamp) / 2;
            return Some(mid);
        }
    }
    None
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Least-squares slope of `values` over `times`.
pub fn slope(times: &[f64], values: &[f64]) -> f64 {
    let n = times.len().min(values.len());
    if n < 2 {
        return 0.0;
    }
    let mean_t = times[..n].iter().sum::<f64>() / n as f64;
    let mean_v = values[..n].iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        num += (times[i] - mean_t) * (values[i] - mean_v);
        den += (times[i] - mean_t).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
#[path = "sampling_tests.rs"]
mod tests;
