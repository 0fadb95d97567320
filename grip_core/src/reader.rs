//! Background frame reader.
//!
//! Spawns a thread that owns the transport, the synchronizer and the
//! calibration model. Every valid frame is converted and published to the
//! [`LatestFrame`] slot; the last-ok timestamp feeds the control watchdog.
//!
//! Each `FrameReader` owns exactly one thread. [`FrameReader::join`] hands the
//! transport back so the caller decides when to close it; dropping the reader
//! without joining stops and joins the thread and drops the transport.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use grip_traits::{Clock, Transport};

use crate::calibration::CalibrationModel;
use crate::cancel::{CancelToken, StopReason};
use crate::error::GripError;
use crate::hw_error::map_transport_error;
use crate::latest::LatestFrame;
use crate::sync::{StreamSync, SyncStats};

/// How the reader reads from its transport.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub read_chunk: usize,
    pub read_timeout: Duration,
}

/// What the reader thread leaves behind.
pub struct ReaderExit<T> {
    pub transport: T,
    pub stats: SyncStats,
    /// Set when the thread stopped on a transport failure.
    pub error: Option<GripError>,
}

pub struct FrameReader<T> {
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    stats: Arc<Mutex<SyncStats>>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<ReaderExit<T>>>,
}

impl<T: Transport + Send + 'static> FrameReader<T> {
    pub fn spawn(
        mut transport: T,
        mut sync: StreamSync,
        model: CalibrationModel,
        latest: LatestFrame,
        cancel: CancelToken,
        opts: ReaderOptions,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let stats = Arc::new(Mutex::new(sync.stats()));
        let stats_clone = stats.clone();
        let epoch = clock.now();
        let thread_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            let clock = thread_clock;
            let mut seq = 0u64;
            let mut error = None;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) || cancel.is_cancelled() {
                    tracing::debug!("frame reader received shutdown signal");
                    break;
                }

                match transport.read(opts.read_chunk, opts.read_timeout) {
                    Ok(bytes) => {
                        sync.push(&bytes);
                        while let Some(raw) = sync.next_valid() {
                            seq += 1;
                            latest.publish(model.convert_frame(seq, clock.now(), raw));
                            last_ok_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                        }
                        if let Ok(mut s) = stats_clone.lock() {
                            *s = sync.stats();
                        }
                    }
                    Err(e) => match map_transport_error(e.as_ref()) {
                        // Quiet link; the control watchdog decides when that is fatal.
                        GripError::TransportTimeout => {}
                        other => {
                            tracing::error!(error = %other, "frame reader stopping on transport error");
                            cancel.cancel(StopReason::Fault);
                            error = Some(other);
                            break;
                        }
                    },
                }
            }
            tracing::trace!(frames = seq, "frame reader exiting cleanly");
            ReaderExit {
                transport,
                stats: sync.stats(),
                error,
            }
        });

        Self {
            last_ok,
            epoch,
            clock,
            stats,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Milliseconds since the last valid frame (or since spawn if none yet).
    pub fn stalled_for_ms(&self) -> u64 {
        self.clock
            .ms_since(self.epoch)
            .saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Link statistics as of the reader's last read.
    pub fn sync_stats(&self) -> SyncStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Stop the thread and take back the transport.
    ///
    /// Blocks for at most one transport read timeout.
    pub fn join(mut self) -> Result<ReaderExit<T>, GripError> {
        self.shutdown.store(true, Ordering::Relaxed);
        let handle = self
            .join_handle
            .take()
            .ok_or_else(|| GripError::State("frame reader already joined".into()))?;
        handle
            .join()
            .map_err(|_| GripError::State("frame reader thread panicked".into()))
    }
}

impl<T> Drop for FrameReader<T> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(_) => tracing::trace!("frame reader joined on drop"),
                Err(e) => tracing::warn!(?e, "frame reader panicked during shutdown"),
            }
        }
    }
}
