//! Console rendering of the pressure grid.

use grip_core::calibration::{SensorFrame, SensorGrid};
use grip_core::sync::SyncStats;
use std::fmt::Write as _;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unit {
    Kpa,
    Newtons,
}

/// One grid of readings, top row first (highest `y`).
pub fn render_grid(frame: &SensorFrame, grid: &SensorGrid, unit: Unit) -> String {
    let side = grid.side();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} (frame {})",
        match unit {
            Unit::Kpa => "Pressure [kPa]",
            Unit::Newtons => "Force [N]",
        },
        frame.seq
    );
    for y in (0..side).rev() {
        for x in 0..side {
            let value = grid
                .sensor_at(x, y)
                .ok()
                .and_then(|s| frame.reading(s))
                .map(|r| match unit {
                    Unit::Kpa => r.kpa,
                    Unit::Newtons => r.newtons,
                });
            match (value, unit) {
                (Some(v), Unit::Kpa) => {
                    let _ = write!(out, "{v:8.1}");
                }
                (Some(v), Unit::Newtons) => {
                    let _ = write!(out, "{v:8.3}");
                }
                (None, _) => out.push_str("       -"),
            }
        }
        out.push('\n');
    }
    out
}

/// Totals, peak, and link health on one line.
pub fn render_summary(frame: &SensorFrame, stats: &SyncStats) -> String {
    format!(
        "total {:.3} N | sum {:.1} kPa | max {:.1} kPa | frames {} | sync errors {} ({:.2}%)",
        frame.total_n,
        frame.total_kpa,
        frame.max_kpa,
        stats.total_frames,
        stats.sync_errors,
        stats.error_rate_percent()
    )
}
