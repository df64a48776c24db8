// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sim-core: shared types for the simulator connector.
//!
//! Holds the clock abstraction, the connector-wide error taxonomy, log
//! severities, and the control-plane resource records that every other crate
//! consumes. No I/O lives here.

pub mod macros;

pub mod clock;
pub mod error;
pub mod resources;
pub mod severity;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ConnectorError, ErrorKind};
pub use resources::{
    Datapoint, DependencyFile, InputValue, Integration, IntegrationUpdate, LogEntry, LogicalCheck,
    ModelRevision, ParsingState, ParsingStatus, RoutineConfig, RoutineInput, RoutineOutput,
    RoutineRevision, RoutineSchedule, RunCallback, RunCreate, RunInputOverride, RunStatus, RunType,
    RunValueItem, SamplingConfig, SimulationRun, Simulator, SimulatorCreate, SteadyStateDetection,
};
pub use severity::LogSeverity;
