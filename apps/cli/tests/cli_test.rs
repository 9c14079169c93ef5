//! Integration tests for the `molopt` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn molopt() -> Command {
    let mut cmd = Command::cargo_bin("molopt").unwrap();
    cmd.env("RUST_LOG", "error").env("MOLOPT__GAUGE__BACKEND", "none");
    cmd
}

fn write_water(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("water.xyz");
    std::fs::write(&path, "3\nwater\nO 0.0 0.0 0.0\nH 0.96 0.0 0.0\nH -0.24 0.93 0.0\n").unwrap();
    path
}

#[test]
fn test_select_prefers_broadest_model() {
    molopt()
        .args(["select", "C,H,Cl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ANI2x"));
}

#[test]
fn test_select_json_without_supporting_model() {
    let output = molopt().args(["--json", "select", "92"]).assert().success().get_output().clone();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["model"].is_null());
    assert_eq!(json["elements"], serde_json::json!([92]));
}

#[test]
fn test_status_json_lists_every_model() {
    let output = molopt().args(["status", "--json"]).assert().success().get_output().clone();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(json["service"], "molopt");
    assert_eq!(json["readiness"]["status"], "ready");
    for model in ["ANI1ccx", "ANI2x", "ANI1x"] {
        assert_eq!(json["models"][model]["available"], true, "{model} should be listed");
    }
    assert_eq!(json["device"]["device"], "cpu");
}

#[test]
fn test_load_and_unknown_model() {
    molopt()
        .args(["load", "ani1x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded"));

    molopt().args(["load", "ANI9x"]).assert().failure();
}

#[test]
fn test_unload_non_resident_model() {
    molopt()
        .args(["unload", "ANI2x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("was not resident"));
}

#[test]
fn test_energy_from_xyz_file() {
    let dir = TempDir::new().unwrap();
    let path = write_water(&dir);

    let output = molopt()
        .args(["--json", "energy", path.to_str().unwrap(), "--model", "ANI1ccx"])
        .assert()
        .success()
        .get_output()
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["model_used"], "ANI1ccx");
    assert_eq!(json["forces"].as_array().unwrap().len(), 3);
}

#[test]
fn test_optimize_writes_output_file() {
    let dir = TempDir::new().unwrap();
    let input = write_water(&dir);
    let output = dir.path().join("relaxed.xyz");

    molopt()
        .args(["optimize", input.to_str().unwrap(), "--max-steps", "50", "--fmax", "0.01"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Converged"));

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("3\n"));
}

#[test]
fn test_smiles_json_report() {
    let output = molopt()
        .args(["--json", "smiles", "CCO", "--max-steps", "20", "--algorithm", "fire"])
        .assert()
        .success()
        .get_output()
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["identifier"], "CCO");
    assert_eq!(json["algorithm"], "FIRE");
    assert_eq!(json["model_used"], "ANI2x");
}

#[test]
fn test_malformed_smiles_fails() {
    molopt()
        .args(["smiles", "C1CC"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Embedding"));
}

#[test]
fn test_batch_through_job_queue() {
    let output = molopt()
        .args(["--json", "batch", "--job", "--max-steps", "20", "CC", "C(", "O"])
        .assert()
        .success()
        .get_output()
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["total"], 3);
    assert_eq!(json["successful"], 2);
    assert_eq!(json["failed"], 1);
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("molopt.toml");
    std::fs::write(&path, "[cache]\nmemory_threshold = 1.5\n").unwrap();

    molopt()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("memory_threshold").or(predicate::str::contains("threshold")));
}
