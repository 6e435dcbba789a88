use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const OVERRIDE_KEYS: [&str; 12] = [
    "PRIMER_TIMEZONE",
    "PRIMER_START_TIME",
    "PRIMER_SLEEP_TIME",
    "PRIMER_WEEKDAYS",
    "PRIMER_KICKOFF_PROMPT",
    "PRIMER_MODEL",
    "PRIMER_USE_WAKE_LOCK",
    "PRIMER_FORCE_SLEEP",
    "PRIMER_PRE_WAKE_MINUTES",
    "PRIMER_RESTART_POLICY",
    "PRIMER_ASSISTANT_BIN",
    "PRIMER_MONITOR_BIN",
];

fn primer(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("primer");
    cmd.current_dir(root)
        .env("HOME", root)
        .env("PRIMER_HOME", root.join("home"))
        .env("PRIMER_LOGS_DIR", root.join("logs"))
        .env("PRIMER_CONFIG_PATH", root.join("primer.toml"));
    for key in OVERRIDE_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

fn details(stdout: &[u8]) -> Vec<String> {
    let report: Value = serde_json::from_slice(stdout).expect("json report");
    report["details"]
        .as_array()
        .expect("details")
        .iter()
        .map(|v| v.as_str().expect("detail").to_string())
        .collect()
}

#[test]
fn config_without_file_reports_defaults() {
    let tmp = tempdir().expect("tempdir");
    let output = primer(tmp.path())
        .arg("config")
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let details = details(&output);
    assert!(details.iter().any(|d| d.ends_with("missing (defaults)")));
    assert!(details.contains(&"timezone=Europe/London".to_string()));
    assert!(details.contains(&"start_time=06:00".to_string()));
    assert!(details.contains(&"weekdays=MTWRFSU".to_string()));
    assert!(details.contains(&"restart_policy=catch-up".to_string()));
    assert!(details.contains(&"retry.retry_budget=6".to_string()));
}

#[test]
fn env_overrides_win_over_file() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("primer.toml"),
        "start_time = \"07:00\"\nweekdays = \"WEEKDAYS\"\n",
    )
    .expect("write config");

    primer(tmp.path())
        .env("PRIMER_START_TIME", "08:15")
        .arg("config")
        .assert()
        .success()
        .stdout(contains("start_time=08:15"))
        .stdout(contains("weekdays=MTWRF"))
        .stdout(contains("source.env=PRIMER_START_TIME"));
}

#[test]
fn invalid_config_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("primer.toml"),
        "start_time = \"23:00\"\nsleep_time = \"06:00\"\n",
    )
    .expect("write config");

    primer(tmp.path())
        .arg("config")
        .assert()
        .code(1)
        .stderr(contains("config invalid"));
}

#[test]
fn unknown_weekday_code_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    primer(tmp.path())
        .env("PRIMER_WEEKDAYS", "MXF")
        .arg("schedule")
        .assert()
        .code(1)
        .stderr(contains("invalid weekday code"));
}

#[test]
fn unknown_restart_policy_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    primer(tmp.path())
        .env("PRIMER_RESTART_POLICY", "whenever")
        .arg("config")
        .assert()
        .code(1)
        .stderr(contains("invalid restart policy"));
}

#[test]
fn schedule_for_inactive_saturday_points_at_monday() {
    let tmp = tempdir().expect("tempdir");
    primer(tmp.path())
        .env("PRIMER_WEEKDAYS", "MTWRF")
        .arg("schedule")
        .arg("--date")
        .arg("2026-10-17")
        .assert()
        .success()
        .stdout(contains("weekday=Sat"))
        .stdout(contains("active=false"))
        .stdout(contains("next_start_at=2026-10-19T06:00:00+01:00"));
}

#[test]
fn schedule_reports_pre_wake_before_start() {
    let tmp = tempdir().expect("tempdir");
    let output = primer(tmp.path())
        .env("PRIMER_START_TIME", "00:01")
        .arg("schedule")
        .arg("--date")
        .arg("2026-10-19")
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let details = details(&output);
    assert!(details.contains(&"active=true".to_string()));
    assert!(details.contains(&"pre_wake_at=2026-10-18T23:59:00+01:00".to_string()));
    assert!(details.contains(&"start_at=2026-10-19T00:01:00+01:00".to_string()));
    assert!(details.contains(&"sleep_at=2026-10-19T23:00:00+01:00".to_string()));
}

#[test]
fn idle_schedule_exits_with_issue() {
    let tmp = tempdir().expect("tempdir");
    primer(tmp.path())
        .env("PRIMER_START_TIME", "09:00")
        .env("PRIMER_SLEEP_TIME", "09:00")
        .arg("schedule")
        .arg("--date")
        .arg("2026-10-19")
        .assert()
        .code(2)
        .stdout(contains("active=false"))
        .stdout(contains("no active day"));
}

#[test]
fn malformed_date_is_rejected_by_the_parser() {
    let tmp = tempdir().expect("tempdir");
    primer(tmp.path())
        .arg("schedule")
        .arg("--date")
        .arg("19/10/2026")
        .assert()
        .failure()
        .stderr(contains("--date"));
}
