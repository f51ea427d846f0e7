//! CLI surface checks for the `seisloc` binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_pipeline_stages() {
    Command::cargo_bin("seisloc")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("download")
                .and(predicate::str::contains("associate"))
                .and(predicate::str::contains("locate")),
        );
}

#[test]
fn test_missing_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("seisloc")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "absent.yml", "run"])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_malformed_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yml"), "start_time: [not, a, time]\n").unwrap();
    Command::cargo_bin("seisloc")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "config.yml", "download"])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_reversed_time_range_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "\
start_time: 2024-01-04T00:00:00
end_time: 2024-01-01T00:00:00
center: { longitude: 52.0, latitude: 36.0 }
region:
  min_longitude: 50.0
  max_longitude: 54.0
  min_latitude: 34.0
  max_latitude: 38.0
  max_depth_km: 30.0
networks: [IR]
picker: { command: phasepick, min_p_probability: 0.3, min_s_probability: 0.3 }
associator: { command: associate, method: gamma_bgmm }
velocity_model: { depths_km: [0.0], vp_km_s: [6.0], vp_vs_ratio: 1.75 }
solver: { command: hyp }
";
    std::fs::write(dir.path().join("config.yml"), yaml).unwrap();
    Command::cargo_bin("seisloc")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "config.yml", "run"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("precede").or(predicate::str::contains("time")));
}
