use std::sync::Arc;
use std::time::Duration;

use grip_core::pid::Pid;
use grip_traits::clock::test_clock::TestClock;
use proptest::prelude::*;

fn pid(kp: f64, ki: f64, kd: f64, limit: f64) -> (Pid, TestClock) {
    let clock = TestClock::new();
    let p = Pid::with_clock(kp, ki, kd, limit, Arc::new(clock.clone()));
    (p, clock)
}

#[test]
fn proportional_only() {
    let (mut p, clock) = pid(2.0, 0.0, 0.0, 10.0);
    clock.advance(Duration::from_millis(10));
    assert!((p.compute(1.0, 0.25) - 1.5).abs() < 1e-12);
}

#[test]
fn integral_accumulates_error_times_dt() {
    let (mut p, clock) = pid(0.0, 1.0, 0.0, 10.0);
    for _ in 0..4 {
        clock.advance(Duration::from_millis(500));
        p.compute(1.0, 0.0);
    }
    assert!((p.integral() - 2.0).abs() < 1e-12);
    clock.advance(Duration::from_millis(500));
    assert!((p.compute(1.0, 0.0) - 2.5).abs() < 1e-12);
}

#[test]
fn derivative_uses_previous_error() {
    let (mut p, clock) = pid(0.0, 0.0, 1.0, 100.0);
    clock.advance(Duration::from_millis(100));
    // First error 1.0 against a zeroed previous error over 0.1 s.
    assert!((p.compute(1.0, 0.0) - 10.0).abs() < 1e-9);
    clock.advance(Duration::from_millis(100));
    assert!(p.compute(1.0, 0.0).abs() < 1e-9);
}

#[test]
fn zero_dt_drops_derivative() {
    let (mut p, _clock) = pid(0.0, 0.0, 5.0, 100.0);
    // No time has passed since construction.
    assert_eq!(p.compute(3.0, 0.0), 0.0);
}

#[test]
fn output_is_clamped_symmetrically() {
    let (mut p, clock) = pid(100.0, 0.0, 0.0, 0.5);
    clock.advance(Duration::from_millis(10));
    assert_eq!(p.compute(1.0, 0.0), 0.5);
    clock.advance(Duration::from_millis(10));
    assert_eq!(p.compute(0.0, 1.0), -0.5);
}

#[test]
fn integral_is_not_clamped() {
    let (mut p, clock) = pid(0.0, 1.0, 0.0, 0.5);
    for _ in 0..100 {
        clock.advance(Duration::from_millis(100));
        assert!(p.compute(1.0, 0.0) <= 0.5);
    }
    // Wound up well past what the output clamp allows.
    assert!((p.integral() - 10.0).abs() < 1e-9);
}

#[test]
fn reset_clears_state_and_time_base() {
    let (mut p, clock) = pid(1.0, 1.0, 1.0, 100.0);
    clock.advance(Duration::from_secs(1));
    p.compute(2.0, 0.0);
    assert!(p.integral() > 0.0);
    clock.advance(Duration::from_secs(5));
    p.reset();
    assert_eq!(p.integral(), 0.0);
    // dt measured from the reset, not from the earlier call.
    clock.advance(Duration::from_millis(100));
    let out = p.compute(1.0, 0.0);
    let expected = 1.0 + 1.0 * 0.1 + (1.0 / 0.1);
    assert!((out - expected).abs() < 1e-9, "{out} vs {expected}");
}

#[test]
fn set_gains_resets() {
    let (mut p, clock) = pid(0.0, 1.0, 0.0, 100.0);
    clock.advance(Duration::from_secs(1));
    p.compute(1.0, 0.0);
    p.set_gains(2.0, 0.1, 0.0);
    assert_eq!(p.integral(), 0.0);
    assert_eq!(p.gains(), (2.0, 0.1, 0.0));
}

proptest! {
    #[test]
    fn zero_error_is_a_fixed_point(
        target in -10.0f64..10.0,
        steps in proptest::collection::vec(0u64..50_000, 1..50),
        kp in 0.0f64..10.0,
        ki in 0.0f64..10.0,
        kd in 0.0f64..10.0,
    ) {
        let (mut p, clock) = pid(kp, ki, kd, 0.5);
        for us in steps {
            clock.advance(Duration::from_micros(us));
            prop_assert_eq!(p.compute(target, target), 0.0);
        }
        prop_assert_eq!(p.integral(), 0.0);
    }
}
