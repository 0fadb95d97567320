//! Per-sensor slope table.
//!
//! The CSV carries `sensor,slope,intercept`, or the bench tool's headers
//! `传感器点位,斜率(k),截距(b)`. The intercept column is kept for compatibility
//! with bench fits but ignored at runtime: zero-load offsets are re-estimated
//! each session, so only the slope survives.
use std::collections::BTreeMap;

use serde::Deserialize;

/// Row schema for calibration CSV.
/// Expected headers:
///   sensor,slope,intercept
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    #[serde(alias = "传感器点位")]
    pub sensor: usize,
    #[serde(alias = "斜率(k)")]
    pub slope: f64,
    #[serde(alias = "截距(b)")]
    pub intercept: f64,
}

const HEADERS: [&str; 3] = ["sensor", "slope", "intercept"];
/// Headers written by the bench calibration tool.
const BENCH_HEADERS: [&str; 3] = ["传感器点位", "斜率(k)", "截距(b)"];

/// Validated slope per sensor index (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeTable {
    slopes: BTreeMap<usize, f64>,
}

impl SlopeTable {
    /// Build a table for an array of `sensor_count` cells.
    ///
    /// Rejects out-of-range indices, duplicates and non-finite or non-positive
    /// slopes. Missing sensors are allowed; they read zero downstream.
    pub fn from_rows(rows: &[CalibrationRow], sensor_count: usize) -> eyre::Result<Self> {
        if rows.is_empty() {
            eyre::bail!("calibration table is empty");
        }
        let mut slopes = BTreeMap::new();
        for row in rows {
            if row.sensor == 0 || row.sensor > sensor_count {
                eyre::bail!(
                    "calibration sensor index {} out of range 1..={sensor_count}",
                    row.sensor
                );
            }
            if !(row.slope.is_finite() && row.slope > 0.0) {
                eyre::bail!(
                    "calibration slope for sensor {} must be finite and > 0, got {}",
                    row.sensor,
                    row.slope
                );
            }
            if slopes.insert(row.sensor, row.slope).is_some() {
                eyre::bail!("calibration sensor {} listed twice", row.sensor);
            }
        }
        Ok(Self { slopes })
    }

    pub fn get(&self, sensor: usize) -> Option<f64> {
        self.slopes.get(&sensor).copied()
    }

    pub fn len(&self) -> usize {
        self.slopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.slopes.iter().map(|(k, v)| (*k, *v))
    }

    /// Sensors in `1..=sensor_count` with no slope entry.
    pub fn missing(&self, sensor_count: usize) -> Vec<usize> {
        (1..=sensor_count)
            .filter(|i| !self.slopes.contains_key(i))
            .collect()
    }
}

impl TryFrom<&[CalibrationRow]> for SlopeTable {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows, crate::DEFAULT_SENSOR_COUNT)
    }
}

pub fn load_calibration_csv(
    path: &std::path::Path,
    sensor_count: usize,
) -> eyre::Result<SlopeTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if actual != HEADERS && actual != BENCH_HEADERS {
        eyre::bail!(
            "calibration CSV must have headers 'sensor,slope,intercept', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    // Deserialize against the canonical names so a BOM on the first header
    // does not hide the `sensor` field.
    let canonical = csv::StringRecord::from(HEADERS.to_vec());
    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.and_then(|r| r.deserialize::<CalibrationRow>(Some(&canonical)));
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    SlopeTable::from_rows(&rows, sensor_count)
}

/// Bench-fitted (sensor, slope, intercept) triples for the stock 6x6 array.
const FACTORY: [(usize, f64, f64); 36] = [
    (1, 0.562_714, -14.79),
    (2, 0.395_393, 10.1),
    (3, 0.418_163, -23.95),
    (4, 0.446_264, -2.56),
    (5, 0.320_379, -5.81),
    (6, 0.339_545, -0.79),
    (7, 0.880_961, -79.67),
    (8, 0.511_704, -2.75),
    (9, 0.532_828, -48.19),
    (10, 0.579_626, -38.1),
    (11, 0.459_192, -66.58),
    (12, 0.457_822, -28.08),
    (13, 0.554_179, -49.81),
    (14, 0.408_191, -1.81),
    (15, 0.517_851, -48.86),
    (16, 0.613_271, -21.8),
    (17, 0.451_063, -67.59),
    (18, 0.390_688, -62.41),
    (19, 0.647_005, -82.75),
    (20, 0.414_492, -20.47),
    (21, 0.499_72, -78.84),
    (22, 0.510_365, -32.84),
    (23, 0.454_021, -60.85),
    (24, 0.565_351, -38.52),
    (25, 0.773_406, -53.7),
    (26, 0.418_644, -3.49),
    (27, 0.437_578, -42.11),
    (28, 0.528_323, -15.28),
    (29, 0.356_723, -34.61),
    (30, 0.502_185, -32.73),
    (31, 0.710_866, -77.16),
    (32, 0.616_831, -22.65),
    (33, 0.672_263, -60.23),
    (34, 0.673_123, 3.31),
    (35, 0.455_24, -11.36),
    (36, 0.471_449, 5.94),
];

/// Factory rows, usable when no CSV is supplied.
pub fn default_rows() -> Vec<CalibrationRow> {
    FACTORY
        .iter()
        .map(|&(sensor, slope, intercept)| CalibrationRow {
            sensor,
            slope,
            intercept,
        })
        .collect()
}

/// Factory slope table for the 36-cell array.
pub fn default_slopes() -> SlopeTable {
    SlopeTable {
        slopes: FACTORY.iter().map(|&(s, k, _)| (s, k)).collect(),
    }
}
