use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal config for the simulated backend with short budgets
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[serial]
# unused by the simulator but required
port = "/dev/null"
read_timeout_ms = 20

[offset]
frames = 10
# a silent link should fail fast
timeout_ms = 300

[safety]
watchdog_ms = 200
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn grip(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("grip").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("warn");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--duration-ms", "300", "--print-every", "0"], 0, "actuator zeroed and disabled", "stdout")]
#[case(&["jog", "--open", "--duration-ms", "100"], 0, "Jog open", "stdout")]
#[case(&["jog"], 2, "required", "stderr")]
#[case(&["jog", "--open", "--close"], 2, "cannot be used with", "stderr")]
#[case(&["jog", "--close", "--torque", "-0.1"], 1, "close torque must be >= 0", "stderr")]
#[case(&["self-check"], 0, "OK: valid frame", "stdout")]
#[case(&["monitor", "--every-ms", "50", "--duration-ms", "200"], 0, "Pressure [kPa]", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = grip(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn silent_array_fails_offset_estimation() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    grip(&cfg)
        .env("GRIP_TEST_SIM_SILENT", "1")
        .args(["run", "--duration-ms", "1000"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("offset estimation"));
}

#[test]
fn silent_array_fails_self_check_with_link_timeout() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    grip(&cfg)
        .env("GRIP_TEST_SIM_SILENT", "1")
        .arg("self-check")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("sensor link timed out"));
}

#[test]
fn lost_link_during_run_is_a_transport_failure() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    grip(&cfg)
        .env("GRIP_TEST_SIM_FAIL_AFTER", "20")
        .args(["run", "--duration-ms", "5000", "--print-every", "0"])
        .assert()
        .code(4);
}

#[test]
fn noisy_link_still_completes() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    grip(&cfg)
        .env("GRIP_TEST_SIM_NOISE", "3")
        .args(["run", "--duration-ms", "300", "--print-every", "0", "--stats"])
        .assert()
        .success()
        .stderr(predicate::str::contains("--- Grip Stats ---"))
        .stderr(predicate::str::contains("bytes skipped"));
}

#[test]
fn bad_calibration_header_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "id,gain,offset\n1,0.5,0\n").unwrap();

    grip(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[test]
fn custom_calibration_is_accepted() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = dir.path().join("cal.csv");
    let mut text = String::from("sensor,slope,intercept\n");
    for i in 1..=36 {
        text.push_str(&format!("{i},0.5,0\n"));
    }
    fs::write(&csv, text).unwrap();

    grip(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("self-check")
        .assert()
        .success();
}

#[test]
fn invalid_config_value_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[serial]\nport = \"/dev/null\"\n\n[pid]\noutput_limit_nm = 0.0\n").unwrap();

    grip(&path)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("must be"));
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");

    grip(&path)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not load the configuration"));
}

#[test]
fn override_is_validated_like_config() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    grip(&cfg)
        .args(["run", "--kp", "-1", "--duration-ms", "100"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("pid.kp must be"));
}
