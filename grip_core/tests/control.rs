use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use grip_config::{RowOrder, default_slopes};
use grip_core::calibration::{CalibrationModel, SensorFrame, SensorGrid};
use grip_core::cancel::{CancelToken, StopReason};
use grip_core::control::{Controller, zero_and_disable};
use grip_core::frame::{FrameCodec, FrameLayout, encode};
use grip_core::jog::{JogDirection, JogParams, run_jog};
use grip_core::mocks::{Call, CallLog, RecordingActuator};
use grip_core::pid::Pid;
use grip_core::scheduler::Scheduler;
use grip_traits::clock::test_clock::TestClock;
use grip_traits::{Actuator, BoxError};
use rstest::rstest;

fn sensor_frame(seq: u64, v: u16) -> SensorFrame {
    let layout = FrameLayout::default();
    let raw = FrameCodec::new(layout)
        .decode(&encode(&layout, 0, &[v; 36]).unwrap())
        .unwrap();
    let model = CalibrationModel::new(
        &default_slopes(),
        SensorGrid::new(36, RowOrder::BottomUp).unwrap(),
        6.25,
    );
    model.convert_frame(seq, Instant::now(), raw)
}

fn controller(log: &CallLog, clock: &TestClock) -> Controller<RecordingActuator> {
    let pid = Pid::with_clock(2.0, 0.1, 0.0, 0.5, Arc::new(clock.clone()));
    Controller::new(RecordingActuator::new(log.clone()), 1, pid, 0.15)
}

#[test]
fn zero_torque_until_first_frame() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut c = controller(&log, &clock);
    c.begin().unwrap();
    assert_eq!(c.cycle(1, None).unwrap(), 0.0);
    assert_eq!(log.commands(), vec![Call::Enable(1), Call::Torque(1, 0.0)]);
}

#[test]
fn unloaded_sensor_pushes_toward_target() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut c = controller(&log, &clock);
    c.begin().unwrap();
    clock.advance(Duration::from_millis(10));
    let f = sensor_frame(1, 0);
    assert_eq!(f.total_n, 0.0);
    let out = c.cycle(1, Some(&f)).unwrap();
    // 2.0 * 0.15 + 0.1 * 0.15 * 0.01
    assert!((out - 0.300_15).abs() < 1e-9, "{out}");
}

#[test]
fn stale_frames_still_command_torque() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let (tx, rx) = xch::unbounded();
    let mut c = controller(&log, &clock).with_telemetry(tx);
    c.begin().unwrap();
    let f = sensor_frame(7, 0);
    for cycle in 1..=3 {
        clock.advance(Duration::from_millis(10));
        c.cycle(cycle, Some(&f)).unwrap();
    }
    let t: Vec<_> = rx.try_iter().collect();
    assert_eq!(t.len(), 3);
    assert!(!t[0].stale);
    assert!(t[1].stale && t[2].stale);
    assert!(t.iter().all(|x| x.frame_seq == Some(7)));
    let torques = log
        .commands()
        .into_iter()
        .filter(|c| matches!(c, Call::Torque(..)))
        .count();
    assert_eq!(torques, 3);
}

#[test]
fn set_target_resets_integral() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut c = controller(&log, &clock);
    c.begin().unwrap();
    clock.advance(Duration::from_secs(1));
    let f = sensor_frame(1, 0);
    c.cycle(1, Some(&f)).unwrap();
    c.set_target(0.0);
    clock.advance(Duration::from_millis(10));
    assert_eq!(c.cycle(2, Some(&f)).unwrap(), 0.0);
    assert_eq!(c.target_n(), 0.0);
}

#[test]
fn safe_shutdown_zeroes_then_disables() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut c = controller(&log, &clock);
    c.begin().unwrap();
    c.safe_shutdown().unwrap();
    assert_eq!(c.last_output(), 0.0);
    let cmds = log.commands();
    assert_eq!(&cmds[cmds.len() - 2..], &[Call::Torque(1, 0.0), Call::Disable(1)]);
}

struct BrokenActuator {
    log: CallLog,
}

impl Actuator for BrokenActuator {
    fn enable(&mut self, _id: u16) -> Result<(), BoxError> {
        Err("bus off".into())
    }
    fn disable(&mut self, id: u16) -> Result<(), BoxError> {
        self.log.push(Call::Disable(id));
        Ok(())
    }
    fn set_torque(&mut self, _id: u16, _torque_nm: f32) -> Result<(), BoxError> {
        Err("bus off".into())
    }
}

#[test]
fn zero_and_disable_runs_both_steps_on_failure() {
    let log = CallLog::new();
    let mut a = BrokenActuator { log: log.clone() };
    let err = zero_and_disable(&mut a, 3).unwrap_err();
    assert!(err.to_string().contains("bus off"));
    assert_eq!(log.commands(), vec![Call::Disable(3)]);
}

fn jog_sched(clock: &TestClock) -> Scheduler {
    Scheduler::new(
        Duration::from_millis(10),
        Duration::from_micros(50),
        Duration::from_millis(1),
    )
    .with_clock(Arc::new(clock.clone()))
}

#[rstest]
#[case(JogDirection::Open, -0.25)]
#[case(JogDirection::Close, 0.15)]
fn jog_sends_fixed_torque_then_stops(#[case] direction: JogDirection, #[case] torque: f32) {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut a = RecordingActuator::new(log.clone());
    let cancel = CancelToken::new();
    let report = run_jog(
        &mut a,
        JogParams {
            actuator_id: 1,
            direction,
            torque_nm: torque,
            limit_nm: 0.5,
            duration_ms: 50,
        },
        &mut jog_sched(&clock),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.stop, StopReason::Completed);
    assert_eq!(report.cycles.cycles, 5);
    let mut expected = vec![Call::Enable(1)];
    expected.extend(std::iter::repeat_n(Call::Torque(1, torque), 5));
    expected.extend([Call::Torque(1, 0.0), Call::Disable(1)]);
    assert_eq!(log.commands(), expected);
}

#[test]
fn jog_torque_is_clamped_to_limit() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut a = RecordingActuator::new(log.clone());
    let report = run_jog(
        &mut a,
        JogParams {
            actuator_id: 1,
            direction: JogDirection::Close,
            torque_nm: 2.0,
            limit_nm: 0.5,
            duration_ms: 10,
        },
        &mut jog_sched(&clock),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(report.torque_nm, 0.5);
    assert!(log.commands().contains(&Call::Torque(1, 0.5)));
}

#[test]
fn jog_rejects_wrong_sign_without_touching_actuator() {
    let log = CallLog::new();
    let clock = TestClock::new();
    let mut a = RecordingActuator::new(log.clone());
    let err = run_jog(
        &mut a,
        JogParams {
            actuator_id: 1,
            direction: JogDirection::Open,
            torque_nm: 0.2,
            limit_nm: 0.5,
            duration_ms: 10,
        },
        &mut jog_sched(&clock),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("open torque"));
    assert!(log.calls().is_empty());
}
