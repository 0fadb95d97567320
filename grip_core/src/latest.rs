//! Single-slot handoff of the most recent calibrated frame.
use std::sync::{Arc, Mutex};

use crate::calibration::SensorFrame;

/// One writer publishes whole frames; any number of readers take the newest.
///
/// Frames are built outside the lock and swapped in as an `Arc`, so the
/// critical section is a pointer swap or clone and readers never see a
/// partially written frame.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Arc<SensorFrame>>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: SensorFrame) {
        let frame = Arc::new(frame);
        match self.slot.lock() {
            Ok(mut g) => *g = Some(frame),
            // A panicked reader cannot leave a torn Arc behind; keep going.
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    pub fn latest(&self) -> Option<Arc<SensorFrame>> {
        match self.slot.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
