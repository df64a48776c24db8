// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sim-client: typed client for the CDF control plane.
//!
//! The connector core consumes the [`ControlPlane`] trait and never sees
//! HTTP. [`HttpControlPlane`] is the production implementation;
//! `MockControlPlane` (feature `test-support`) records calls and serves
//! programmable responses for tests.

pub mod api;
pub mod http;

pub use api::{
    ApiError, ApiResult, ControlPlane, ExtractionPipelineCreate, ExtractionRunCreate,
    ExtractionRunStatus, IntegrationCreate, ModelRevisionFilter, Page, RoutineRevisionFilter,
    RunData, RunFilter, TokenInfo,
};
pub use http::{HttpConfig, HttpControlPlane, OidcCredentials};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod mock;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockControlPlane, Op};
