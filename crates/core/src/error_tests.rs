// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    unauthorized = { 401, ErrorKind::NetworkAuth },
    forbidden = { 403, ErrorKind::NetworkAuth },
    gone = { 410, ErrorKind::ControlPlaneGone },
    timeout = { 408, ErrorKind::NetworkTransient },
    throttled = { 429, ErrorKind::NetworkTransient },
    server = { 500, ErrorKind::NetworkTransient },
    bad_gateway = { 502, ErrorKind::NetworkTransient },
    conflict = { 409, ErrorKind::Internal },
)]
fn status_classification(status: u16, expected: ErrorKind) {
    let err = ConnectorError::from_status(status, "x");
    assert_eq!(err.kind(), expected);
    assert_eq!(err.status, Some(status));
}

#[test]
fn restart_kinds() {
    assert!(ErrorKind::NetworkAuth.restarts_group());
    assert!(ErrorKind::ControlPlaneGone.restarts_group());
    assert!(!ErrorKind::NetworkTransient.restarts_group());
    assert!(!ErrorKind::Cancelled.restarts_group());
}

#[test]
fn transient_kinds() {
    assert!(ErrorKind::NetworkTransient.is_transient());
    assert!(ErrorKind::TooLargeToDownloadNow.is_transient());
    assert!(!ErrorKind::SizeExceeded.is_transient());
}
