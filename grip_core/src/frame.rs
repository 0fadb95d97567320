//! Fixed-size sensor frame codec.
//!
//! Wire layout for `n` sensors (n = 36 on the stock array, 78 bytes total):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 2 | header marker |
//! | 2 | 2 | reserved |
//! | 4 | 2n | big-endian u16 readings, sensor 1..=n |
//! | 4+2n | 2 | big-endian u16 checksum |
//!
//! The checksum is the byte sum of everything between the header and the
//! checksum field (reserved bytes included), truncated to 16 bits.
use thiserror::Error;

/// Decode failures. These are ordinary values, never process-level errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("wrong frame size: expected {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },
    #[error("bad header marker {found:02X?}")]
    BadHeader { found: [u8; 2] },
    #[error("bad checksum: computed {computed:#06x}, received {received:#06x}")]
    BadChecksum { computed: u16, received: u16 },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("expected {expected} readings, got {actual}")]
pub struct EncodeError {
    pub expected: usize,
    pub actual: usize,
}

/// Header marker and sensor count; everything else follows from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub header: [u8; 2],
    pub sensor_count: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            header: grip_config::DEFAULT_HEADER,
            sensor_count: grip_config::DEFAULT_SENSOR_COUNT,
        }
    }
}

impl FrameLayout {
    pub const fn new(header: [u8; 2], sensor_count: usize) -> Self {
        Self {
            header,
            sensor_count,
        }
    }

    #[inline]
    pub const fn frame_size(&self) -> usize {
        grip_config::frame_size(self.sensor_count)
    }

    #[inline]
    const fn checksum_at(&self) -> usize {
        self.frame_size() - 2
    }
}

/// One decoded frame: `sensor_count` raw readings in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub reserved: u16,
    readings: Vec<u16>,
}

impl RawFrame {
    /// Raw value for a 1-based sensor index.
    pub fn reading(&self, sensor: usize) -> Option<u16> {
        sensor
            .checked_sub(1)
            .and_then(|i| self.readings.get(i))
            .copied()
    }

    pub fn readings(&self) -> &[u16] {
        &self.readings
    }

    /// `(sensor index, raw)` pairs, indices starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u16)> + '_ {
        self.readings.iter().enumerate().map(|(i, v)| (i + 1, *v))
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// 16-bit byte sum over `bytes`.
#[inline]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Build a correctly checksummed frame.
pub fn encode(layout: &FrameLayout, reserved: u16, readings: &[u16]) -> Result<Vec<u8>, EncodeError> {
    if readings.len() != layout.sensor_count {
        return Err(EncodeError {
            expected: layout.sensor_count,
            actual: readings.len(),
        });
    }
    let mut out = Vec::with_capacity(layout.frame_size());
    out.extend_from_slice(&layout.header);
    out.extend_from_slice(&reserved.to_be_bytes());
    for v in readings {
        out.extend_from_slice(&v.to_be_bytes());
    }
    let sum = checksum(&out[2..]);
    out.extend_from_slice(&sum.to_be_bytes());
    Ok(out)
}

/// Stateless decode plus the frame/error counters.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    layout: FrameLayout,
    total_frames: u64,
    sync_errors: u64,
}

impl FrameCodec {
    pub const fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            total_frames: 0,
            sync_errors: 0,
        }
    }

    pub const fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Decode exactly one frame-sized block.
    ///
    /// Size and header failures leave the counters untouched. A block that
    /// gets as far as the checksum counts towards `total_frames`; a checksum
    /// mismatch also counts towards `sync_errors`.
    pub fn decode(&mut self, block: &[u8]) -> Result<RawFrame, DecodeError> {
        let expected = self.layout.frame_size();
        if block.len() != expected {
            return Err(DecodeError::WrongSize {
                expected,
                actual: block.len(),
            });
        }
        let found = [block[0], block[1]];
        if found != self.layout.header {
            return Err(DecodeError::BadHeader { found });
        }

        self.total_frames += 1;
        let at = self.layout.checksum_at();
        let computed = checksum(&block[2..at]);
        let received = u16::from_be_bytes([block[at], block[at + 1]]);
        if computed != received {
            self.sync_errors += 1;
            return Err(DecodeError::BadChecksum { computed, received });
        }

        let reserved = u16::from_be_bytes([block[2], block[3]]);
        let readings = block[4..at]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        Ok(RawFrame { reserved, readings })
    }

    pub const fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub const fn sync_errors(&self) -> u64 {
        self.sync_errors
    }
}
