//! Raw → physical conversion and the sensor grid geometry.
use std::collections::BTreeMap;
use std::time::Instant;

use grip_config::{RowOrder, SlopeTable};
use thiserror::Error;

use crate::frame::RawFrame;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("sensor index {index} outside 1..={count}")]
    InvalidIndex { index: usize, count: usize },
    #[error("grid coordinate ({x}, {y}) outside a {side}x{side} grid")]
    InvalidCoordinate { x: usize, y: usize, side: usize },
    #[error("sensor count {count} is not a non-zero perfect square")]
    NotSquare { count: usize },
}

/// Bijection between sensor index `1..=side²` and `(x, y)` on a square grid.
///
/// Indices run row-major along x. With [`RowOrder::BottomUp`] sensor 1 sits at
/// `(0, side - 1)` and each following row is one step lower in y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorGrid {
    side: usize,
    order: RowOrder,
}

impl SensorGrid {
    pub fn new(sensor_count: usize, order: RowOrder) -> Result<Self, GridError> {
        let side = grip_config::grid_side(sensor_count).ok_or(GridError::NotSquare {
            count: sensor_count,
        })?;
        Ok(Self { side, order })
    }

    pub const fn side(&self) -> usize {
        self.side
    }

    pub const fn sensor_count(&self) -> usize {
        self.side * self.side
    }

    pub fn position(&self, index: usize) -> Result<(usize, usize), GridError> {
        let count = self.sensor_count();
        if index == 0 || index > count {
            return Err(GridError::InvalidIndex { index, count });
        }
        let i = index - 1;
        let x = i % self.side;
        let row = i / self.side;
        let y = match self.order {
            RowOrder::BottomUp => self.side - 1 - row,
            RowOrder::TopDown => row,
        };
        Ok((x, y))
    }

    pub fn sensor_at(&self, x: usize, y: usize) -> Result<usize, GridError> {
        if x >= self.side || y >= self.side {
            return Err(GridError::InvalidCoordinate {
                x,
                y,
                side: self.side,
            });
        }
        let row = match self.order {
            RowOrder::BottomUp => self.side - 1 - y,
            RowOrder::TopDown => y,
        };
        Ok(row * self.side + x + 1)
    }
}

/// Mean zero-load raw value per sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetTable {
    means: BTreeMap<usize, f64>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sensor: usize, mean: f64) {
        self.means.insert(sensor, mean);
    }

    pub fn get(&self, sensor: usize) -> Option<f64> {
        self.means.get(&sensor).copied()
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.means.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(usize, f64)> for OffsetTable {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        Self {
            means: iter.into_iter().collect(),
        }
    }
}

/// One sensor's converted value. Both fields are >= 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub kpa: f64,
    pub newtons: f64,
}

impl Reading {
    pub const ZERO: Self = Self {
        kpa: 0.0,
        newtons: 0.0,
    };
}

/// A decoded frame with every sensor converted, ready to publish.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    /// Monotonic counter assigned by the reader.
    pub seq: u64,
    pub captured_at: Instant,
    pub raw: RawFrame,
    pub readings: Vec<Reading>,
    pub total_n: f64,
    pub total_kpa: f64,
    pub max_kpa: f64,
}

impl SensorFrame {
    /// Converted value for a 1-based sensor index.
    pub fn reading(&self, sensor: usize) -> Option<Reading> {
        sensor
            .checked_sub(1)
            .and_then(|i| self.readings.get(i))
            .copied()
    }
}

/// Per-sensor linear model `kPa = slope × (raw − offset)`, floored at 0.
///
/// Only the slope is used; tabulated intercepts are ignored because offsets are
/// measured per session.
#[derive(Debug, Clone)]
pub struct CalibrationModel {
    slopes: Vec<Option<f64>>,
    offsets: OffsetTable,
    offset_calibrated: bool,
    area_m2: f64,
    grid: SensorGrid,
}

impl CalibrationModel {
    pub fn new(slopes: &SlopeTable, grid: SensorGrid, area_mm2: f64) -> Self {
        let table = (1..=grid.sensor_count()).map(|i| slopes.get(i)).collect();
        Self {
            slopes: table,
            offsets: OffsetTable::new(),
            offset_calibrated: false,
            area_m2: area_mm2 * 1e-6,
            grid,
        }
    }

    pub fn convert(&self, sensor: usize, raw: u16) -> Reading {
        let Some(slope) = sensor
            .checked_sub(1)
            .and_then(|i| self.slopes.get(i))
            .copied()
            .flatten()
        else {
            return Reading::ZERO;
        };

        let offset = if self.offset_calibrated {
            self.offsets.get(sensor).unwrap_or(0.0)
        } else {
            0.0
        };
        let kpa = (slope * (f64::from(raw) - offset)).max(0.0);
        let newtons = (kpa * 1000.0 * self.area_m2).max(0.0);
        Reading { kpa, newtons }
    }

    /// Install a zero-load offset table, replacing any previous one.
    pub fn set_offsets(&mut self, table: OffsetTable) {
        tracing::debug!(sensors = table.len(), "offsets installed");
        self.offsets = table;
        self.offset_calibrated = true;
    }

    pub const fn is_offset_calibrated(&self) -> bool {
        self.offset_calibrated
    }

    pub const fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn grid_position(&self, sensor: usize) -> Result<(usize, usize), GridError> {
        self.grid.position(sensor)
    }

    pub const fn grid(&self) -> &SensorGrid {
        &self.grid
    }

    pub fn sensor_count(&self) -> usize {
        self.slopes.len()
    }

    pub fn convert_frame(&self, seq: u64, captured_at: Instant, raw: RawFrame) -> SensorFrame {
        let readings: Vec<Reading> = raw.iter().map(|(i, v)| self.convert(i, v)).collect();
        let total_n = readings.iter().map(|r| r.newtons).sum();
        let total_kpa = readings.iter().map(|r| r.kpa).sum();
        let max_kpa = readings.iter().map(|r| r.kpa).fold(0.0, f64::max);
        SensorFrame {
            seq,
            captured_at,
            raw,
            readings,
            total_n,
            total_kpa,
            max_kpa,
        }
    }
}
