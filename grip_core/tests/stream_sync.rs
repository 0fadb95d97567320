use grip_core::frame::{FrameLayout, encode};
use grip_core::sync::{StreamSync, SyncEvent};
use proptest::prelude::*;

fn frame(seed: u16) -> Vec<u8> {
    let readings: Vec<u16> = (0..36).map(|i| seed.wrapping_mul(31).wrapping_add(i)).collect();
    encode(&FrameLayout::default(), 0, &readings).unwrap()
}

fn drain(sync: &mut StreamSync) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    loop {
        match sync.next_frame() {
            SyncEvent::NeedMoreData => return out,
            ev => out.push(ev),
        }
    }
}

#[test]
fn three_back_to_back_frames() {
    let mut sync = StreamSync::new(FrameLayout::default());
    let mut stream = Vec::new();
    for s in 1..=3 {
        stream.extend(frame(s));
    }
    sync.push(&stream);

    let frames: Vec<_> = drain(&mut sync)
        .into_iter()
        .map(|ev| match ev {
            SyncEvent::Frame(f) => f,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(frames.len(), 3);
    for (i, f) in frames.iter().enumerate() {
        let seed = u16::try_from(i + 1).unwrap();
        assert_eq!(f.reading(1), Some(seed.wrapping_mul(31)));
    }
    let stats = sync.stats();
    assert_eq!(stats.sync_errors, 0);
    assert_eq!(stats.total_frames, 3);
    assert_eq!(stats.resyncs, 0);
}

#[test]
fn partial_frame_waits_for_more_bytes() {
    let mut sync = StreamSync::new(FrameLayout::default());
    let f = frame(9);
    sync.push(&f[..40]);
    assert_eq!(sync.next_frame(), SyncEvent::NeedMoreData);
    assert_eq!(sync.buffered(), 40);
    sync.push(&f[40..]);
    assert!(matches!(sync.next_frame(), SyncEvent::Frame(_)));
    assert_eq!(sync.buffered(), 0);
}

#[test]
fn byte_at_a_time_delivery() {
    let mut sync = StreamSync::new(FrameLayout::default());
    let mut got = 0;
    let stream: Vec<u8> = [frame(1), frame(2)].concat();
    for b in stream {
        sync.push(&[b]);
        if sync.next_valid().is_some() {
            got += 1;
        }
    }
    assert_eq!(got, 2);
    assert_eq!(sync.stats().total_frames, 2);
}

#[test]
fn corrupt_frame_is_consumed_and_next_one_decodes() {
    let mut sync = StreamSync::new(FrameLayout::default());
    let mut bad = frame(1);
    bad[10] ^= 0x40;
    sync.push(&bad);
    sync.push(&frame(2));

    let events = drain(&mut sync);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], SyncEvent::Corrupt(_)));
    assert!(matches!(events[1], SyncEvent::Frame(_)));
    let stats = sync.stats();
    assert_eq!(stats.total_frames, 2);
    assert_eq!(stats.sync_errors, 1);
    assert!((stats.error_rate_percent() - 50.0).abs() < 1e-9);
}

#[test]
fn garbage_between_frames_is_skipped() {
    let mut sync = StreamSync::new(FrameLayout::default());
    sync.push(&frame(1));
    sync.push(&[0x01, 0x02, 0x03]);
    sync.push(&frame(2));

    let events = drain(&mut sync);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], SyncEvent::Frame(_)));
    assert_eq!(events[1], SyncEvent::Resynced { discarded: 3 });
    assert!(matches!(events[2], SyncEvent::Frame(_)));
    assert_eq!(sync.stats().resyncs, 1);
    assert_eq!(sync.stats().discarded_bytes, 3);
}

#[test]
fn buffer_without_marker_is_dropped() {
    let mut sync = StreamSync::new(FrameLayout::default());
    sync.push(&[0x10; 200]);
    assert_eq!(sync.next_frame(), SyncEvent::Resynced { discarded: 200 });
    assert_eq!(sync.buffered(), 0);
    assert_eq!(sync.next_frame(), SyncEvent::NeedMoreData);
    assert_eq!(sync.stats().resyncs, 0);
}

#[test]
fn marker_split_across_pushes_survives() {
    let mut sync = StreamSync::new(FrameLayout::default());
    let f = frame(4);
    sync.push(&[0x00, 0x00, f[0]]);
    assert_eq!(sync.next_frame(), SyncEvent::Resynced { discarded: 2 });
    sync.push(&f[1..]);
    assert!(matches!(sync.next_frame(), SyncEvent::Frame(_)));
}

fn has_marker(bytes: &[u8]) -> bool {
    bytes.windows(2).any(|w| w == [0xFF, 0x66])
}

proptest! {
    #[test]
    fn resync_discards_exactly_the_garbage(
        garbage in proptest::collection::vec(any::<u8>(), 0..300)
            .prop_filter("no header marker", |g| !has_marker(g)),
        seed in any::<u16>(),
    ) {
        let valid = frame(seed);
        let mut sync = StreamSync::new(FrameLayout::default());
        sync.push(&garbage);
        sync.push(&valid);

        let events = drain(&mut sync);
        let expected_frame = grip_core::frame::FrameCodec::new(FrameLayout::default())
            .decode(&valid)
            .unwrap();
        if garbage.is_empty() {
            prop_assert_eq!(events, vec![SyncEvent::Frame(expected_frame)]);
        } else {
            prop_assert_eq!(
                events,
                vec![
                    SyncEvent::Resynced { discarded: garbage.len() },
                    SyncEvent::Frame(expected_frame),
                ]
            );
        }
        prop_assert_eq!(sync.stats().discarded_bytes, garbage.len() as u64);
        prop_assert_eq!(sync.stats().sync_errors, 0);
    }
}
