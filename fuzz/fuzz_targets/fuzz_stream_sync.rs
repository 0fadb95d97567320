#![no_main]
use grip_core::frame::FrameLayout;
use grip_core::sync::{StreamSync, SyncEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, Vec<u8>)| {
    let (split, bytes) = input;
    let layout = FrameLayout::default();
    let mut sync = StreamSync::new(layout);

    // Feed in two pieces so a frame can straddle the boundary.
    let at = usize::from(split).min(bytes.len());
    let mut frames = 0u64;
    for part in [&bytes[..at], &bytes[at..]] {
        sync.push(part);
        loop {
            match sync.next_frame() {
                SyncEvent::Frame(f) => {
                    assert_eq!(f.len(), layout.sensor_count);
                    frames += 1;
                }
                SyncEvent::NeedMoreData => break,
                _ => {}
            }
        }
        assert!(sync.buffered() < layout.frame_size());
    }
    let stats = sync.stats();
    assert_eq!(stats.total_frames, frames + stats.sync_errors);
});
