//! Watchdog tests.

use std::thread;
use std::time::Duration;

use frameseek::Watchdog;

#[test]
fn disarmed_watchdog_never_fires() {
    let watchdog = Watchdog::new();
    assert_eq!(watchdog.budget_ms(), 0);
    thread::sleep(Duration::from_millis(5));
    assert!(!watchdog.check());
    assert!(!watchdog.has_fired());
}

#[test]
fn generous_budget_does_not_fire() {
    let watchdog = Watchdog::new();
    watchdog.arm(Duration::from_secs(60));
    assert_eq!(watchdog.budget_ms(), 60_000);
    assert!(!watchdog.check());
    assert!(!watchdog.has_fired());
}

#[test]
fn exceeded_budget_fires_and_latches() {
    let watchdog = Watchdog::new();
    watchdog.arm(Duration::from_millis(1));
    thread::sleep(Duration::from_millis(20));
    assert!(watchdog.check());
    assert!(watchdog.has_fired());

    watchdog.disarm();
    assert_eq!(watchdog.budget_ms(), 0);
    assert!(!watchdog.check());
    assert!(watchdog.has_fired(), "fired flag survives disarm");

    watchdog.arm(Duration::from_secs(60));
    assert!(!watchdog.has_fired(), "re-arming clears the flag");
}

#[test]
fn zero_budget_disarms() {
    let watchdog = Watchdog::new();
    watchdog.arm(Duration::ZERO);
    thread::sleep(Duration::from_millis(5));
    assert!(!watchdog.check());
}
