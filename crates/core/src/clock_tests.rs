// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_returns_increasing_time() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    let t2 = clock.now();
    assert!(t2 > t1);
}

#[test]
fn fake_clock_can_be_advanced() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    clock.advance(Duration::from_secs(60));
    let t2 = clock.now();
    assert!(t2.duration_since(t1) >= Duration::from_secs(60));
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let e1 = clock1.epoch_ms();
    clock2.advance(Duration::from_secs(30));
    assert_eq!(clock1.epoch_ms(), e1 + 30_000);
}

#[tokio::test]
async fn fake_clock_sleep_advances_epoch() {
    let clock = FakeClock::new();
    let before = clock.epoch_ms();
    clock.sleep(Duration::from_secs(3600)).await;
    assert_eq!(clock.epoch_ms(), before + 3_600_000);
}

#[tokio::test]
async fn accelerated_sleep_is_bounded_in_real_time() {
    let clock = FakeClock::accelerated(Duration::from_millis(10));
    let start = Instant::now();
    clock.sleep(Duration::from_secs(86_400)).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(clock.epoch_ms() >= 1_000_000 + 86_400_000);
}

#[test]
fn now_local_tracks_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    assert_eq!(clock.now_local().timestamp_millis(), 1_700_000_000_000);
}
