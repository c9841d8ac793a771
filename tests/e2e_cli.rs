use std::{io::Write, process::Command};

use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use tempfile::NamedTempFile;

const EXPORT: &str = concat!(
    r#"{"Airline": "IndiGo", "Source": "Banglore", "Destination": "New Delhi", "Total_Stops": "non-stop", "Duration": "2h 50m", "Price": 3897}"#,
    "\n",
    r#"{"Airline": "Air India", "Source": "Kolkata", "Destination": "Banglore", "Total_Stops": "2 stops", "Duration": "7h 25m", "Price": 7662}"#,
    "\n",
    r#"{"Airline": "SpiceJet", "Source": "Mumbai", "Destination": "Hyderabad", "Total_Stops": "non-stop", "Duration": "45m", "Price": 3873}"#,
    "\n",
);

fn mongo_enabled() -> bool {
    std::env::var("FARESCOPE_E2E").as_deref() == Ok("1")
        && std::env::var("FARESCOPE_URI").is_ok_and(|uri| !uri.is_empty())
}

fn run_farescope(args: &[&str]) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_farescope"));
    cmd.args(args);
    cmd.env_remove("RUST_LOG");
    cmd.output().expect("farescope command must run")
}

fn export_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file must be created");
    file.write_all(EXPORT.as_bytes()).expect("export must be written");
    file
}

#[test]
fn e2e_table_summary_from_export() {
    let file = export_file();
    let path = file.path().to_str().expect("temp path must be UTF-8");

    let output = run_farescope(&["--input", path, "summary"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).expect("stdout must be valid UTF-8");
    assert!(stdout.contains("count"));
    assert!(stdout.contains("7662"));
    assert!(stdout.contains("measure: Price"));
}

#[test]
fn e2e_json_by_airline_from_export() {
    let file = export_file();
    let path = file.path().to_str().expect("temp path must be UTF-8");

    let output = run_farescope(&["--input", path, "by-airline", "-o", "json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let result: JsonValue = serde_json::from_slice(&output.stdout).expect("stdout must be valid JSON");
    let keys: Vec<&str> = result["groups"]
        .as_array()
        .expect("groups must be an array")
        .iter()
        .filter_map(|group| group["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["Air India", "IndiGo", "SpiceJet"]);
}

#[test]
fn e2e_yaml_unique_from_export() {
    let file = export_file();
    let path = file.path().to_str().expect("temp path must be UTF-8");

    let output = run_farescope(&["--input", path, "-o", "yaml", "unique", "Total_Stops"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let values: YamlValue = serde_yaml::from_slice(&output.stdout).expect("stdout must be valid YAML");
    let values = values.as_sequence().expect("yaml output must be a sequence");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].as_str(), Some("2 stops"));
}

#[test]
fn e2e_missing_export_reports_tip() {
    let output = run_farescope(&["--input", "/nonexistent/farescope.json", "summary"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("export unreadable"));
    assert!(stderr.contains("--input path"));
}

#[test]
fn e2e_mongo_summary() {
    if !mongo_enabled() {
        return;
    }

    let output = run_farescope(&["--timeout-secs", "20", "summary", "-o", "json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let summary: JsonValue = serde_json::from_slice(&output.stdout).expect("stdout must be valid JSON");
    assert!(summary["count"].as_u64().is_some_and(|count| count > 0));
    assert!(summary["max"].as_f64().is_some());
}

#[test]
fn e2e_mongo_rows_carry_derived_columns() {
    if !mongo_enabled() {
        return;
    }

    let output = run_farescope(&["rows", "--limit", "3", "-o", "json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let rows: JsonValue = serde_json::from_slice(&output.stdout).expect("stdout must be valid JSON");
    let first = rows
        .as_array()
        .and_then(|items| items.first())
        .expect("at least one row must be returned");
    assert!(first.get("Price_with_Tax").is_some());
    assert!(first.get("Duration_Minutes").is_some());
    assert!(first.get("_id").is_none());
}
