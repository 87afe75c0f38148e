use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn config_show_prints_defaults() {
    Command::cargo_bin("icn")
        .unwrap()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pit_timeout_ms\": 10000"))
        .stdout(predicate::str::contains("\"interest_to_app\": false"));
}

#[test]
fn config_show_reads_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"{{ "pit_retransmits": 7, "routes": [{{ "prefix": "/a", "faces": [1, 2] }}] }}"#
    )
    .unwrap();

    Command::cargo_bin("icn")
        .unwrap()
        .args(["config", "show", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pit_retransmits\": 7"))
        .stdout(predicate::str::contains("\"prefix\": \"/a\""));
}

#[test]
fn config_show_rejects_invalid_values() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    write!(file, r#"{{ "ageing_interval_ms": 0 }}"#).unwrap();

    Command::cargo_bin("icn")
        .unwrap()
        .args(["config", "show", "--file"])
        .arg(file.path())
        .assert()
        .failure();
}

#[test]
fn simulate_reports_results() {
    Command::cargo_bin("icn")
        .unwrap()
        .args(["simulate", "--interests", "2", "--producer-delay-ms", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("x..y"))
        .stdout(predicate::str::contains("Served by producer"))
        .stdout(predicate::str::contains("nfn2"));
}
