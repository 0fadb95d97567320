//! Byte-stream synchronizer: finds frame boundaries in an unframed stream.
//!
//! Bytes are appended with [`StreamSync::push`] and frames pulled with
//! [`StreamSync::next_frame`] until it reports [`SyncEvent::NeedMoreData`].
use crate::frame::{DecodeError, FrameCodec, FrameLayout, RawFrame};

/// Result of one pull from the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Frame(RawFrame),
    /// Not enough buffered bytes for a full frame. Nothing was consumed.
    NeedMoreData,
    /// Bytes ahead of the next marker (or with no marker at all) were dropped.
    Resynced { discarded: usize },
    /// A frame-sized block at a marker failed to decode and was consumed.
    Corrupt(DecodeError),
}

/// Counters for link quality reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frames that reached checksum validation.
    pub total_frames: u64,
    /// Checksum failures.
    pub sync_errors: u64,
    /// Times a marker was found past the start of the buffer.
    pub resyncs: u64,
    /// Bytes dropped while hunting for a marker.
    pub discarded_bytes: u64,
}

impl SyncStats {
    /// Checksum failures as a percentage of decoded frames.
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate_percent(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.sync_errors as f64 / self.total_frames as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct StreamSync {
    codec: FrameCodec,
    buf: Vec<u8>,
    resyncs: u64,
    discarded_bytes: u64,
}

impl StreamSync {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            codec: FrameCodec::new(layout),
            buf: Vec::with_capacity(layout.frame_size() * 2),
            resyncs: 0,
            discarded_bytes: 0,
        }
    }

    pub const fn layout(&self) -> &FrameLayout {
        self.codec.layout()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently held waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn next_frame(&mut self) -> SyncEvent {
        let header = self.codec.layout().header;
        let frame_size = self.codec.layout().frame_size();

        match self.buf.windows(2).position(|w| w == header) {
            None => {
                // A lone first marker byte at the tail may be the start of the next frame.
                let keep = usize::from(self.buf.last() == Some(&header[0]));
                let discarded = self.buf.len() - keep;
                if discarded == 0 {
                    return SyncEvent::NeedMoreData;
                }
                self.buf.drain(..discarded);
                self.discarded_bytes += discarded as u64;
                tracing::debug!(discarded, "no frame marker in buffer, dropped");
                SyncEvent::Resynced { discarded }
            }
            Some(0) => {
                if self.buf.len() < frame_size {
                    return SyncEvent::NeedMoreData;
                }
                let block: Vec<u8> = self.buf.drain(..frame_size).collect();
                match self.codec.decode(&block) {
                    Ok(frame) => {
                        tracing::trace!(total = self.codec.total_frames(), "frame decoded");
                        SyncEvent::Frame(frame)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, sync_errors = self.codec.sync_errors(), "frame rejected");
                        SyncEvent::Corrupt(e)
                    }
                }
            }
            Some(offset) => {
                self.buf.drain(..offset);
                self.resyncs += 1;
                self.discarded_bytes += offset as u64;
                tracing::debug!(discarded = offset, resyncs = self.resyncs, "resynced to frame marker");
                SyncEvent::Resynced { discarded: offset }
            }
        }
    }

    /// Pull until a valid frame or until more bytes are needed.
    pub fn next_valid(&mut self) -> Option<RawFrame> {
        loop {
            match self.next_frame() {
                SyncEvent::Frame(f) => return Some(f),
                SyncEvent::NeedMoreData => return None,
                SyncEvent::Resynced { .. } | SyncEvent::Corrupt(_) => {}
            }
        }
    }

    pub const fn stats(&self) -> SyncStats {
        SyncStats {
            total_frames: self.codec.total_frames(),
            sync_errors: self.codec.sync_errors(),
            resyncs: self.resyncs,
            discarded_bytes: self.discarded_bytes,
        }
    }
}
