//! InterruptFlag and Watchdog tests.

use std::{
    thread,
    time::{Duration, Instant},
};

use rtsp_timeout_probe::{InterruptFlag, Watchdog};

#[test]
fn flag_starts_lowered() {
    let flag = InterruptFlag::new();
    assert!(!flag.is_raised());
    assert_eq!(flag.polls(), 0);
}

#[test]
fn clones_share_state() {
    let flag = InterruptFlag::new();
    let clone = flag.clone();

    clone.raise();
    assert!(flag.is_raised());
}

#[test]
fn raise_is_visible_across_threads() {
    let flag = InterruptFlag::default();
    let remote = flag.clone();

    thread::spawn(move || remote.raise())
        .join()
        .expect("raising thread panicked");
    assert!(flag.is_raised());
}

#[test]
fn watchdog_raises_after_delay() {
    let flag = InterruptFlag::new();
    let started = Instant::now();

    let watchdog = Watchdog::arm(flag.clone(), Duration::from_millis(50));
    watchdog.join();

    assert!(flag.is_raised());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn disarmed_watchdog_never_raises() {
    let flag = InterruptFlag::new();
    let started = Instant::now();

    let watchdog = Watchdog::arm(flag.clone(), Duration::from_secs(30));
    watchdog.disarm();

    assert!(!flag.is_raised());
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn dropping_watchdog_disarms_it() {
    let flag = InterruptFlag::new();
    {
        let _watchdog = Watchdog::arm(flag.clone(), Duration::from_secs(30));
    }
    assert!(!flag.is_raised());
}

#[test]
fn zero_delay_raises_before_returning() {
    let flag = InterruptFlag::new();
    let watchdog = Watchdog::arm(flag.clone(), Duration::ZERO);

    assert!(flag.is_raised());
    watchdog.disarm();
    assert!(flag.is_raised());
}
