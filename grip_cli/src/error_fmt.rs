//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_SAFETY;
use grip_core::error::{BuildError, EstimateError, GripError};

/// Stable name of the failure, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    match err.downcast_ref::<GripError>() {
        Some(GripError::Transport(_)) => "Transport",
        Some(GripError::TransportTimeout) => "TransportTimeout",
        Some(GripError::Actuator(_)) => "Actuator",
        Some(GripError::Config(_)) => "Config",
        Some(GripError::Estimate(EstimateError::Interrupted { .. })) => "Interrupted",
        Some(GripError::Estimate(EstimateError::Timeout { .. })) => "EstimateTimeout",
        Some(GripError::Estimate(EstimateError::InsufficientData)) => "InsufficientData",
        Some(GripError::Estimate(EstimateError::Transport(_))) => "Transport",
        Some(GripError::Watchdog { .. }) => "Watchdog",
        Some(GripError::State(_)) => "State",
        Some(GripError::Io(_)) => "Io",
        None => "Error",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/grip_config.toml for a sample."
        );
    }

    if let Some(ge) = err.downcast_ref::<GripError>() {
        return match ge {
            GripError::TransportTimeout => "What happened: The sensor link timed out.\nLikely causes: Wrong serial port, baud rate mismatch, or the array is unpowered.\nHow to fix: Check serial.port and serial.baud_rate (460800 for the stock array) and the USB cable.".to_string(),
            GripError::Transport(msg) => format!(
                "What happened: The sensor link failed ({msg}).\nLikely causes: Cable unplugged, device reset, or another process holding the port.\nHow to fix: Reconnect the array and rerun; run `grip self-check` to test the link alone."
            ),
            GripError::Actuator(msg) => format!(
                "What happened: The actuator rejected a command ({msg}).\nLikely causes: Motor unpowered, wrong actuator.id, or a bus fault.\nHow to fix: Check motor power and the [actuator] section, then rerun."
            ),
            GripError::Watchdog {
                stalled_ms,
                threshold_ms,
            } => format!(
                "What happened: No valid sensor frame for {stalled_ms} ms (watchdog {threshold_ms} ms); the actuator was zeroed and disabled.\nLikely causes: Sensor link stalled or flooded with corrupt data.\nHow to fix: Check the cable and baud rate; raise safety.watchdog_ms only if the link is known to be bursty."
            ),
            GripError::Estimate(EstimateError::InsufficientData) => "What happened: No valid frame arrived during zero-load offset estimation.\nLikely causes: Sensor array silent, wrong port, or baud rate mismatch.\nHow to fix: Run `grip self-check`, then check serial.port and serial.baud_rate.".to_string(),
            GripError::Estimate(EstimateError::Timeout {
                collected, wanted, ..
            }) => format!(
                "What happened: Offset estimation timed out after {collected} of {wanted} frames.\nLikely causes: Heavy frame corruption or a very slow link.\nHow to fix: Raise offset.timeout_ms or lower offset.frames, and check the link with `grip monitor`."
            ),
            GripError::Estimate(e) => format!(
                "What happened: Offset estimation failed ({e}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for details."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'sensor,slope,intercept' (or the bench tool's '传感器点位,斜率(k),截距(b)').".to_string();
    }

    if lower.contains("serial error") && lower.contains("open") {
        return format!(
            "What happened: Failed to open the serial port ({msg}).\nLikely causes: Wrong serial.port, missing permissions (dialout group), or the device is in use.\nHow to fix: Fix serial.port in the config and check permissions."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: Could not load the configuration ({msg}).\nLikely causes: Wrong --config path or a TOML syntax error.\nHow to fix: Pass --config <FILE>; see etc/grip_config.toml for a sample."
        );
    }

    if lower.contains(" must be ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range value in the TOML or a command-line override.\nHow to fix: Edit the config file or the override and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure class; anything unclassified is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<GripError>() {
        Some(GripError::Watchdog { .. }) => 3,
        Some(
            GripError::Transport(_)
            | GripError::TransportTimeout
            | GripError::Estimate(EstimateError::Transport(_)),
        ) => 4,
        Some(GripError::Actuator(_)) => 5,
        Some(GripError::Estimate(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let details = match err.downcast_ref::<GripError>() {
        Some(GripError::Watchdog {
            stalled_ms,
            threshold_ms,
        }) => Some(json!({
            "stalled_ms": stalled_ms,
            "threshold_ms": threshold_ms,
            "configured_watchdog_ms": LAST_SAFETY.get().map(|s| s.watchdog_ms),
            "max_run_ms": LAST_SAFETY.get().map(|s| s.max_run_ms),
        })),
        Some(GripError::Estimate(EstimateError::Timeout {
            collected, wanted, ..
        })) => Some(json!({ "collected": collected, "wanted": wanted })),
        _ => None,
    };

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(d) = details {
        obj["details"] = d;
    }
    obj.to_string()
}
