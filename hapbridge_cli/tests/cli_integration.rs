use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const VALID: &str = r#"
[feedback]
tick_ms = 10
hardware_timeout_ms = 5

[[patterns]]
pattern = "Linear"
strength_min = 0
strength_max = 100
speed = 1

[[patterns]]
pattern = "None"
strength_min = 40
strength_max = 80
speed = 16

[trackers."LHR-SIM1"]
enabled = true
routing_key = "/avatar/parameters/Near"
multiplier_override = 1.0
pattern_override = "None"
battery_threshold = 20

[simulator]
devices = [
    { handle = 1, model = "VIVE Tracker 3.0 MV", serial = "LHR-SIM1", battery = 0.9 },
    { handle = 2, model = "Knuckles Left", serial = "LHR-SIM2", battery = 0.9 },
]
"#;

fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("hapbridge.toml");
    fs::write(&path, text).unwrap();
    path
}

fn hapbridge(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("hapbridge").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["list"], 0, "LHR-SIM1", "stdout")]
#[case(&["pulse"], 2, "--serial", "stderr")]
#[case(&["pulse", "--serial", "LHR-NOPE"], 1, "No attached device", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let mut cmd = hapbridge(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case::unknown_pattern("pattern = \"Linear\"", "pattern = \"Wobble\"", "Wobble")]
#[case::bad_band("strength_min = 0", "strength_min = 101", "patterns[0]")]
#[case::zero_tick("tick_ms = 10", "tick_ms = 0", "feedback.tick_ms")]
fn invalid_config_exits_with_2(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &VALID.replacen(from, to, 1));
    hapbridge(&cfg)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");
    hapbridge(&cfg)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope.toml"));
}

#[rstest]
fn cli_reports_bad_routing_header() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let bad_csv = dir.path().join("routing.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "serial,address").unwrap();
    writeln!(f, "LHR-SIM1,/avatar/parameters/Chest").unwrap();

    hapbridge(&cfg)
        .arg("--routing-csv")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid headers in routing CSV"));
}

#[rstest]
fn routing_csv_is_merged_before_listing() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);
    let csv = dir.path().join("routing.csv");
    fs::write(&csv, "serial,routing_key\nLHR-SIM2,/avatar/parameters/Hand\n").unwrap();

    hapbridge(&cfg)
        .arg("--routing-csv")
        .arg(&csv)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("/avatar/parameters/Hand"));
}

#[rstest]
fn list_json_marks_filtered_models() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        &VALID.replacen(
            "hardware_timeout_ms = 5",
            "hardware_timeout_ms = 5\nmodel_filter = [\"VIVE Tracker\"]",
            1,
        ),
    );
    let out = hapbridge(&cfg)
        .arg("--json")
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    let arr = v.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    let sim2 = arr.iter().find(|d| d["serial"] == "LHR-SIM2").unwrap();
    assert_eq!(sim2["attached"], false);
    assert!(sim2["routing_key"].is_null());
}

#[rstest]
fn pulse_reports_emitted_pulses() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);
    let out = hapbridge(&cfg)
        .arg("--json")
        .arg("pulse")
        .arg("--serial")
        .arg("LHR-SIM1")
        .arg("--ms")
        .arg("50")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(v["serial"], "LHR-SIM1");
    assert!(v["pulses"].as_u64().unwrap() >= 1);
    // Tracker family: microseconds, at most 4000 per pulse.
    let units = v["native_units"].as_u64().unwrap();
    assert!(units > 0 && units <= 4000 * v["pulses"].as_u64().unwrap());
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &VALID.replacen("speed = 1", "speed = 0", 1));
    let out = hapbridge(&cfg)
        .arg("--json")
        .arg("self-check")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 2);
    assert!(v["message"].as_str().unwrap().contains("speed"));
}
