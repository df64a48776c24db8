// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sim-storage: file-backed table/record state persistence.
//!
//! The [`StateStore`] holds serialized library records grouped into named
//! tables, mirrored to disk as a zstd-compressed JSON snapshot. Durability is
//! across restarts, not across concurrent writers; each library owns a
//! disjoint set of tables and re-validates its invariants on load.

mod snapshot;
mod store;

pub use snapshot::{SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use store::{ExtractedRange, StateStore, StoreError, StoredRecord};
