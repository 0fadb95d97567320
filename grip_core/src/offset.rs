//! One-shot zero-load offset estimation.
//!
//! Averages the raw value of every sensor over a fixed number of valid frames.
//! Runs before control starts; its table is frozen into the calibration model.
use std::sync::Arc;
use std::time::Duration;

use grip_traits::{BoxError, Clock, MonotonicClock, Transport};

use crate::calibration::OffsetTable;
use crate::cancel::CancelToken;
use crate::error::EstimateError;
use crate::frame::RawFrame;
use crate::sync::StreamSync;

/// Anything that yields decoded frames with a bounded wait.
pub trait FrameSource {
    /// Next valid frame, or `None` if none arrived within `timeout`.
    fn next_raw(&mut self, timeout: Duration) -> Result<Option<RawFrame>, BoxError>;
}

/// Drives a [`StreamSync`] directly from a transport.
pub struct SyncedTransport<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    sync: &'a mut StreamSync,
    chunk: usize,
}

impl<'a, T: Transport + ?Sized> SyncedTransport<'a, T> {
    pub fn new(transport: &'a mut T, sync: &'a mut StreamSync, chunk: usize) -> Self {
        Self {
            transport,
            sync,
            chunk: chunk.max(1),
        }
    }
}

impl<T: Transport + ?Sized> FrameSource for SyncedTransport<'_, T> {
    fn next_raw(&mut self, timeout: Duration) -> Result<Option<RawFrame>, BoxError> {
        if let Some(f) = self.sync.next_valid() {
            return Ok(Some(f));
        }
        let bytes = self.transport.read(self.chunk, timeout)?;
        self.sync.push(&bytes);
        Ok(self.sync.next_valid())
    }
}

pub struct OffsetEstimator {
    frames: usize,
    timeout: Duration,
    poll: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl OffsetEstimator {
    pub fn new(frames: usize, timeout: Duration) -> Self {
        Self {
            frames: frames.max(1),
            timeout,
            poll: Duration::from_millis(100),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Longest single wait on the source, which bounds cancellation latency.
    #[must_use]
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    pub const fn poll(&self) -> Duration {
        self.poll
    }

    pub fn estimate<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<OffsetTable, EstimateError> {
        let start = self.clock.now();
        let mut sums: Vec<u64> = Vec::new();
        let mut collected = 0usize;

        tracing::info!(frames = self.frames, timeout_ms = crate::util::duration_ms(self.timeout), "offset estimation start");
        loop {
            if cancel.is_cancelled() {
                tracing::info!(collected, "offset estimation interrupted");
                return Err(EstimateError::Interrupted { collected });
            }
            if collected >= self.frames {
                break;
            }
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= self.timeout {
                if collected == 0 {
                    tracing::warn!("offset estimation saw no valid frames");
                    return Err(EstimateError::InsufficientData);
                }
                tracing::warn!(collected, wanted = self.frames, "offset estimation timed out");
                return Err(EstimateError::Timeout {
                    collected,
                    wanted: self.frames,
                    partial: means(&sums, collected),
                });
            }

            let wait = (self.timeout - elapsed).min(self.poll);
            match source.next_raw(wait) {
                Ok(Some(frame)) => {
                    if sums.len() < frame.len() {
                        sums.resize(frame.len(), 0);
                    }
                    for (i, v) in frame.readings().iter().enumerate() {
                        sums[i] += u64::from(*v);
                    }
                    collected += 1;
                    tracing::trace!(collected, "offset frame");
                }
                Ok(None) => {}
                Err(e) => return Err(EstimateError::Transport(e.to_string())),
            }
        }

        let table = means(&sums, collected);
        tracing::info!(
            frames = collected,
            elapsed_ms = self.clock.ms_since(start),
            "offset estimation complete"
        );
        Ok(table)
    }
}

#[allow(clippy::cast_precision_loss)]
fn means(sums: &[u64], n: usize) -> OffsetTable {
    if n == 0 {
        return OffsetTable::new();
    }
    sums.iter()
        .enumerate()
        .map(|(i, s)| (i + 1, *s as f64 / n as f64))
        .collect()
}
