//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Run catree against a store directory and return (stdout, stderr, success)
fn run_catree(args: &[&str], dir: &Path) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_catree"))
        .arg("-d")
        .arg(dir)
        .args(["-f", "json", "--threads", "2"])
        .args(args)
        .output()
        .expect("Failed to execute catree");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn run_json(args: &[&str], dir: &Path) -> serde_json::Value {
    let (stdout, stderr, success) = run_catree(args, dir);
    assert!(success, "catree {args:?} failed: {stderr}");
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

fn leaf_hex(n: u8) -> String {
    format!("{}{:02x}", "0".repeat(62), n)
}

// ============================================================================
// Initialization
// ============================================================================

#[test]
fn test_cli_init_creates_store() {
    let dir = tempdir().unwrap();

    let value = run_json(&["init", "--depth", "4"], dir.path());
    assert_eq!(value["status"], "ok");
    assert_eq!(value["depth"], 4);
    assert_eq!(value["policy"], "blake3");
    assert!(dir.path().join("tree").exists());
}

#[test]
fn test_cli_init_twice_fails() {
    let dir = tempdir().unwrap();
    run_json(&["init"], dir.path());

    let (_stdout, stderr, success) = run_catree(&["init"], dir.path());
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_cli_requires_init() {
    let dir = tempdir().unwrap();
    let (_stdout, stderr, success) = run_catree(&["status"], dir.path());
    assert!(!success);
    assert!(stderr.contains("catree init"));
}

// ============================================================================
// Leaves and paths
// ============================================================================

#[test]
fn test_cli_add_then_read_back() {
    let dir = tempdir().unwrap();
    run_json(&["init", "--depth", "4"], dir.path());

    let added = run_json(&["add", &leaf_hex(1), &leaf_hex(2), &leaf_hex(3)], dir.path());
    assert_eq!(added["start_index"], 0);
    assert_eq!(added["end_index"], 3);
    assert_eq!(added["size"], 3);

    let leaf = run_json(&["leaf", "1"], dir.path());
    assert_eq!(leaf["value"], leaf_hex(2));

    let status = run_json(&["status"], dir.path());
    assert_eq!(status["size"], 3);
    assert_eq!(status["root"], added["root"]);
}

#[test]
fn test_cli_path_verifies() {
    let dir = tempdir().unwrap();
    run_json(&["init", "--depth", "6"], dir.path());
    run_json(&["add", "--random", "20"], dir.path());

    let path = run_json(&["path", "13"], dir.path());
    assert_eq!(path["verified"], true);
    assert_eq!(path["path"].as_array().unwrap().len(), 6);

    let siblings = path["siblings"].as_array().unwrap();
    assert_eq!(siblings.len(), 6);
    let neighbour = run_json(&["leaf", "12"], dir.path());
    assert_eq!(siblings[0], neighbour["value"]);
}

#[test]
fn test_cli_random_batches_differ() {
    let dir = tempdir().unwrap();
    run_json(&["init", "--depth", "6"], dir.path());
    run_json(&["add", "--random", "2"], dir.path());
    run_json(&["add", "--random", "2"], dir.path());

    let values: Vec<_> = (0..4)
        .map(|i| run_json(&["leaf", &i.to_string()], dir.path())["value"].clone())
        .collect();
    for (i, value) in values.iter().enumerate() {
        assert_ne!(value, &serde_json::json!("0".repeat(64)));
        assert!(!values[i + 1..].contains(value));
    }
}

#[test]
fn test_cli_leaf_out_of_range_fails() {
    let dir = tempdir().unwrap();
    run_json(&["init", "--depth", "4"], dir.path());
    run_json(&["add", &leaf_hex(9)], dir.path());

    let (_stdout, _stderr, success) = run_catree(&["leaf", "5"], dir.path());
    assert!(!success);
}

#[test]
fn test_cli_update_replaces_leaf() {
    let dir = tempdir().unwrap();
    run_json(&["init", "--depth", "4"], dir.path());
    let added = run_json(&["add", &leaf_hex(1), &leaf_hex(2)], dir.path());

    let updated = run_json(&["update", "0", &leaf_hex(7)], dir.path());
    assert_eq!(updated["previous_value"], leaf_hex(1));
    assert_eq!(updated["previous_root"], added["root"]);
    assert_ne!(updated["root"], added["root"]);

    let leaf = run_json(&["leaf", "0"], dir.path());
    assert_eq!(leaf["value"], leaf_hex(7));
}

#[test]
fn test_cli_sha256_policy_is_remembered() {
    let dir = tempdir().unwrap();
    run_json(&["--policy", "sha256", "init", "--depth", "4"], dir.path());
    run_json(&["add", &leaf_hex(1)], dir.path());

    // The flag default is blake3, but the store decides
    let status = run_json(&["status"], dir.path());
    assert_eq!(status["policy"], "sha256");
}

#[test]
fn test_cli_invalid_hex_fails() {
    let dir = tempdir().unwrap();
    run_json(&["init"], dir.path());

    let (_stdout, stderr, success) = run_catree(&["add", "not-hex"], dir.path());
    assert!(!success);
    assert!(stderr.contains("Invalid leaf value"));
}

// ============================================================================
// Benchmark
// ============================================================================

#[test]
fn test_cli_bench_cleans_up() {
    let dir = tempdir().unwrap();

    let value = run_json(
        &["bench", "--batch-size", "8", "--batches", "3", "--depth", "10"],
        dir.path(),
    );
    assert_eq!(value["leaves"], 24);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
