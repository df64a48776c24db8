// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sim-driver: the simulator automation boundary.
//!
//! The connector core drives an external simulation engine only through the
//! [`SimulatorDriver`] trait: parse a materialized model, execute a routine
//! against it, and a pair of lifecycle hooks. Everything protocol-specific
//! (COM program ids, process control, command stages) stays behind the
//! trait; the core passes the `automation` configuration through opaquely.

mod driver;
mod empty;

pub use driver::{
    AutomationConfig, DriverError, ModelFileRef, ModelFiles, ModelInfo, SimulatorDriver,
};
pub use empty::EmptySimulator;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DriverCall, FakeSimulator};
