use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[serial]
port = "/dev/null"
read_timeout_ms = 20

[offset]
timeout_ms = 300
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect()
}

/// The last stdout line of a successful run is the session summary.
#[rstest]
fn run_summary_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("grip")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--duration-ms", "300", "--print-every", "5"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    let summary = lines.last().expect("summary line");
    for key in [
        "timestamp",
        "command",
        "stop",
        "target_n",
        "duration_ms",
        "cycles",
        "overruns",
        "total_frames",
        "sync_errors",
        "error_rate_percent",
        "last_output_nm",
        "dropped_telemetry",
    ] {
        assert!(summary.get(key).is_some(), "missing {key} in {summary}");
    }
    assert_eq!(summary["command"], "run");
    assert_eq!(summary["stop"], "completed");
    assert!(summary["cycles"].as_u64().unwrap() > 0);

    // Telemetry samples precede the summary.
    let samples: Vec<_> = lines.iter().filter(|v| v.get("cycle").is_some()).collect();
    assert!(!samples.is_empty());
    for s in samples {
        assert_eq!(s["cycle"].as_u64().unwrap() % 5, 0);
        assert!(s["output_nm"].as_f64().unwrap().abs() <= 0.5 + 1e-6);
        assert!(s.get("stale").is_some());
    }
}

#[rstest]
#[case("1", 6, "InsufficientData")]
fn error_schema(#[case] silent: &str, #[case] code: i32, #[case] reason: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("grip")
        .unwrap()
        .env("GRIP_TEST_SIM_SILENT", silent)
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--duration-ms", "1000"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(code));

    let lines = json_lines(&out.stdout);
    let err = lines.last().expect("error line");
    assert_eq!(err["reason"], reason);
    assert_eq!(err["exit_code"], code);
    assert!(err["message"].as_str().unwrap().contains("What happened"));
}

#[test]
fn self_check_json() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("grip")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .output()
        .unwrap();
    assert!(out.status.success());
    let lines = json_lines(&out.stdout);
    let v = lines.last().unwrap();
    assert_eq!(v["ok"], true);
    assert_eq!(v["sensors"], 36);
}
