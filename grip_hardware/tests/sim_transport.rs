use std::time::{Duration, Instant};

use grip_config::{RowOrder, default_slopes};
use grip_core::calibration::{CalibrationModel, SensorGrid};
use grip_core::frame::FrameLayout;
use grip_core::sync::StreamSync;
use grip_hardware::{SimOptions, SimPlant, SimulatedActuator, SimulatedTransport};
use grip_traits::{Actuator, Transport};
use rstest::rstest;

fn transport(plant: &SimPlant, opts: SimOptions) -> SimulatedTransport {
    SimulatedTransport::new(
        plant.clone(),
        FrameLayout::default(),
        &default_slopes(),
        6.25,
        opts,
    )
}

fn collect_frames(t: &mut SimulatedTransport, sync: &mut StreamSync, want: usize) -> Vec<grip_core::frame::RawFrame> {
    let t0 = Instant::now();
    let mut out = Vec::new();
    while out.len() < want {
        assert!(t0.elapsed() < Duration::from_secs(5), "too slow");
        let bytes = t.read(156, Duration::from_millis(20)).unwrap();
        sync.push(&bytes);
        while let Some(f) = sync.next_valid() {
            out.push(f);
        }
    }
    out
}

#[test]
fn unloaded_array_reads_baseline() {
    let plant = SimPlant::default();
    let mut t = transport(&plant, SimOptions::default());
    let mut sync = StreamSync::new(FrameLayout::default());
    let frames = collect_frames(&mut t, &mut sync, 5);
    assert!(frames.iter().all(|f| f.readings().iter().all(|&r| r == 300)));
    assert_eq!(sync.stats().sync_errors, 0);
}

#[test]
fn contact_force_round_trips_through_calibration() {
    let plant = SimPlant::default();
    // 0.1 past contact at 20 N per unit of closure
    plant.set_closure(0.5);
    let mut t = transport(&plant, SimOptions::default());
    let mut sync = StreamSync::new(FrameLayout::default());
    let f = collect_frames(&mut t, &mut sync, 1).remove(0);

    let mut model = CalibrationModel::new(
        &default_slopes(),
        SensorGrid::new(36, RowOrder::BottomUp).unwrap(),
        6.25,
    );
    model.set_offsets((1..=36).map(|i| (i, 300.0)).collect());
    let frame = model.convert_frame(1, Instant::now(), f);
    // ADC rounding costs a little precision per pad.
    assert!((frame.total_n - 2.0).abs() < 0.2, "total {}", frame.total_n);
    // Centre pads carry more than corners.
    let centre = frame.reading(15).unwrap().newtons;
    let corner = frame.reading(1).unwrap().newtons;
    assert!(centre > corner);
}

#[rstest]
#[case(1)]
#[case(3)]
fn noise_is_skipped_by_the_synchronizer(#[case] every: u64) {
    let plant = SimPlant::default();
    let opts = SimOptions {
        noise_every: every,
        ..SimOptions::default()
    };
    let mut t = transport(&plant, opts);
    let mut sync = StreamSync::new(FrameLayout::default());
    let frames = collect_frames(&mut t, &mut sync, 6);
    assert!(frames.len() >= 6);
    assert!(sync.stats().discarded_bytes > 0);
    assert_eq!(sync.stats().sync_errors, 0);
}

#[test]
fn silent_link_blocks_for_timeout() {
    let opts = SimOptions {
        silent: true,
        ..SimOptions::default()
    };
    let mut t = transport(&SimPlant::default(), opts);
    let t0 = Instant::now();
    assert!(t.read(156, Duration::from_millis(15)).unwrap().is_empty());
    assert!(t0.elapsed() >= Duration::from_millis(15));
}

#[test]
fn fail_after_breaks_the_link() {
    let opts = SimOptions {
        fail_after: Some(2),
        ..SimOptions::default()
    };
    let mut t = transport(&SimPlant::default(), opts);
    assert!(t.read(156, Duration::from_millis(10)).is_ok());
    assert!(t.read(156, Duration::from_millis(10)).is_ok());
    let err = t.read(156, Duration::from_millis(10)).unwrap_err();
    assert!(err.to_string().contains("link lost"));
}

#[test]
fn closed_transport_refuses_reads() {
    let mut t = transport(&SimPlant::default(), SimOptions::default());
    t.close().unwrap();
    assert!(t.read(156, Duration::from_millis(1)).is_err());
}

#[test]
fn reads_respect_max_bytes() {
    let mut t = transport(&SimPlant::default(), SimOptions::default());
    std::thread::sleep(Duration::from_millis(20));
    let b = t.read(10, Duration::from_millis(10)).unwrap();
    assert!(b.len() <= 10);
}

#[test]
fn closing_torque_builds_force() {
    let plant = SimPlant::default();
    plant.set_closure(0.39);
    let mut a = SimulatedActuator::new(plant.clone(), 1);
    a.enable(1).unwrap();
    a.set_torque(1, 0.5).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    assert!(plant.force_n() > 0.0);
    a.set_torque(1, 0.0).unwrap();
    a.disable(1).unwrap();
    assert!(!plant.is_enabled());
}
