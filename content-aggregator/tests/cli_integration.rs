// content-aggregator/tests/cli_integration.rs
//
// Black-box tests of the binary. None of them touch the network: every URL
// used here is rejected by the fetcher before a request is sent.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::{NamedTempFile, TempDir};

/// Command isolated from the caller's CA_* variables and config files.
fn aggregator(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("content-aggregator").unwrap();
    for key in [
        "CA_WORKERS",
        "CA_RATE",
        "CA_BURST",
        "CA_TIMEOUT",
        "CA_FETCH_TIMEOUT",
        "CA_USER_AGENT",
        "CA_PRETTY",
        "CA_JSON",
        "CA_CSV",
        "CA_FILE",
        "CA_CONFIG",
        "CA_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .current_dir(home.path());
    cmd
}

/// Helper to create a test item file
fn create_items_file(items: &[&str]) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    fs::write(file.path(), items.join("\n")).expect("Failed to write to temp file");
    file
}

#[test]
fn test_help_lists_flags() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--rate"))
        .stdout(predicate::str::contains("--burst"))
        .stdout(predicate::str::contains("--fetch-timeout"))
        .stdout(predicate::str::contains("--strict"));
}

#[test]
fn test_no_inputs_is_an_error() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("You must specify URLs"));
}

#[test]
fn test_json_and_csv_conflict() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["example.org", "--json", "--csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Cannot specify both --json and --csv",
        ));
}

#[test]
fn test_zero_workers_rejected() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["example.org", "--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--workers must be at least 1"));
}

#[test]
fn test_invalid_timeout_rejected() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["example.org", "--timeout", "eventually"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --timeout"));
}

#[test]
fn test_zero_durations_rejected() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["example.org", "--timeout", "0s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --timeout '0s'"));

    aggregator(&home)
        .args(["example.org", "--fetch-timeout", "0ms"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --fetch-timeout '0ms'"));
}

#[test]
fn test_missing_config_file() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["example.org", "--config", "/no/such/config.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}

#[test]
fn test_invalid_config_values() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.toml");
    fs::write(&config, "[defaults]\nworkers = 0\n").unwrap();

    aggregator(&home)
        .arg("example.org")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Workers must be between 1 and 100"));
}

#[test]
fn test_unsupported_scheme_is_a_fetch_failure() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .arg("ftp://files.example")
        .assert()
        .success()
        .stdout(predicate::str::contains("ftp://files.example - FAILED (fetch)"))
        .stdout(predicate::str::contains("unsupported scheme 'ftp'"));
}

#[test]
fn test_json_output_shape() {
    let home = TempDir::new().unwrap();
    let output = aggregator(&home)
        .args(["ftp://a.example", "http://[", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["results"].as_array().unwrap().is_empty());

    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    for error in errors {
        assert_eq!(error["stage"], "fetch");
        assert!(error["cause"].as_str().unwrap().starts_with("Fetch failed"));
    }
    let mut sources: Vec<&str> = errors
        .iter()
        .map(|e| e["source"].as_str().unwrap())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["ftp://a.example", "http://["]);
}

#[test]
fn test_json_from_environment() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .env("CA_JSON", "true")
        .arg("ftp://a.example")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"errors\""))
        .stdout(predicate::str::contains("\"results\""));
}

#[test]
fn test_strict_fails_on_item_failure() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["ftp://a.example", "--strict"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1 item failed (--strict)"));
}

#[test]
fn test_items_from_file_as_csv() {
    let home = TempDir::new().unwrap();
    let file = create_items_file(&[
        "# items for the csv test",
        "ftp://one.example",
        "",
        "ftp://two.example   # inline comment",
    ]);

    aggregator(&home)
        .arg("--file")
        .arg(file.path())
        .arg("--csv")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "source,status,stage,title,description,keywords,timestamp,error",
        ))
        .stdout(predicate::str::contains("ftp://one.example,failed,fetch"))
        .stdout(predicate::str::contains("ftp://two.example,failed,fetch"))
        .stdout(predicate::str::contains("inline comment").not());
}

#[test]
fn test_empty_items_file() {
    let home = TempDir::new().unwrap();
    let file = create_items_file(&["# nothing here"]);

    aggregator(&home)
        .arg("-f")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No items found in file"));
}

#[test]
fn test_failure_summary_in_text_mode() {
    let home = TempDir::new().unwrap();
    aggregator(&home)
        .args(["ftp://a.example", "ftp://b.example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary: 0 fetched, 2 failed"))
        .stdout(predicate::str::contains("• 2 fetch failures: ftp://"));
}
