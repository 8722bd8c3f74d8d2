//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REPORT: &str = "[PAGE 1]\nThe reactor cooling loop was inspected in March. \
Engineers found corrosion on two valves.\n[PAGE 2]\nBoth valves were replaced. \
The loop returned to service after a pressure test.";

/// Helper to get CLI command with an isolated environment
fn cli(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("passage-rag").unwrap();
    cmd.env_remove("PASSAGE_RAG_LOG")
        .env("RAG_EMBEDDING_DIMENSION", "512")
        .arg("--quiet")
        .arg("--store")
        .arg(store);
    cmd
}

fn write_report(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("report.txt");
    fs::write(&path, REPORT).unwrap();
    path
}

fn ingest(store: &Path, path: &Path, id: &str) {
    cli(store)
        .args(["ingest", "--document-id", id, "--path"])
        .arg(path)
        .assert()
        .success();
}

// ============================================================================
// INFO COMMAND TESTS
// ============================================================================

#[test]
fn test_info_shows_version() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("passage-rag"))
        .stdout(predicate::str::contains("Version:"))
        .stdout(predicate::str::contains("Quality filter"));
}

#[test]
fn test_help() {
    Command::cargo_bin("passage-rag")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("reindex"));
}

// ============================================================================
// INGEST COMMAND TESTS
// ============================================================================

#[test]
fn test_ingest_reports_chunks() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");

    cli(&store)
        .args(["ingest", "--document-id", "report", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 2 chunks for document report"));

    assert!(store.join("vectors.bin").exists());
    assert!(store.join("mapping.json").exists());
}

#[test]
fn test_ingest_generates_document_id() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");

    cli(&store)
        .arg("ingest")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("for document report_"));
}

#[test]
fn test_ingest_missing_file() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["ingest", "--path", "does/not/exist.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_ingest_rejects_bad_overlap() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    cli(&dir.path().join("store"))
        .args(["ingest", "--chunk-size", "50", "--chunk-overlap", "60", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk_overlap"));
}

#[test]
fn test_ingest_char_mode() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    cli(&dir.path().join("store"))
        .args([
            "ingest",
            "--char-mode",
            "--chunk-size",
            "40",
            "--chunk-overlap",
            "10",
            "--document-id",
            "windows",
            "--path",
        ])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("document windows"));
}

// ============================================================================
// QUERY COMMAND TESTS
// ============================================================================

#[test]
fn test_query_text_output() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");
    ingest(&store, &path, "report");

    cli(&store)
        .args(["query", "valves replaced", "--threshold", "0.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Query: \"valves replaced\""))
        .stdout(predicate::str::contains("report_chunk_"))
        .stdout(predicate::str::contains("Context:"));
}

#[test]
fn test_query_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");
    ingest(&store, &path, "report");

    let output = cli(&store)
        .args([
            "query",
            "pressure test",
            "--threshold",
            "0.1",
            "--format",
            "json",
            "--document-id",
            "report",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["stats"]["query"], "pressure test");
    assert!(json["stats"]["results_found"].as_u64().unwrap() >= 1);
    assert_eq!(json["sources"][0]["document_id"], "report");
    assert_eq!(json["sources"][0]["page"], 2);
}

#[test]
fn test_query_empty_store() {
    let dir = TempDir::new().unwrap();
    cli(&dir.path().join("store"))
        .args(["query", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No relevant passages found."));
}

// ============================================================================
// DOCUMENT MANAGEMENT TESTS
// ============================================================================

#[test]
fn test_documents_and_remove() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");
    ingest(&store, &path, "report");
    ingest(&store, &path, "copy");

    cli(&store)
        .arg("documents")
        .assert()
        .success()
        .stdout(predicate::str::contains("report\t2 chunks"))
        .stdout(predicate::str::contains("copy\t2 chunks"));

    cli(&store)
        .args(["remove", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 vectors for document report"));

    cli(&store)
        .arg("documents")
        .assert()
        .success()
        .stdout(predicate::str::contains("report\t").not())
        .stdout(predicate::str::contains("copy\t2 chunks"));
}

#[test]
fn test_reindex() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");
    ingest(&store, &path, "report");

    let replacement = dir.path().join("replacement.txt");
    fs::write(&replacement, "Only one sentence remains in this revision.").unwrap();

    cli(&store)
        .args(["reindex", "report", "--path"])
        .arg(&replacement)
        .assert()
        .success()
        .stdout(predicate::str::contains("removed 2 vectors, added 1 chunks"));
}

#[test]
fn test_stats_json_and_clear() {
    let dir = TempDir::new().unwrap();
    let path = write_report(&dir);
    let store = dir.path().join("store");
    ingest(&store, &path, "report");

    let output = cli(&store).args(["stats", "--format", "json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["index"]["total_vectors"], 2);
    assert_eq!(json["index"]["embedding_dimension"], 512);
    assert_eq!(json["top_k_results"], 5);

    cli(&store)
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Index cleared"));

    cli(&store)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total vectors: 0"));
}

#[test]
fn test_config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rag.toml");
    fs::write(&config, "top_k_results = 9\nsimilarity_threshold = 0.2\n").unwrap();

    let output = cli(&dir.path().join("store"))
        .arg("--config")
        .arg(&config)
        .args(["stats", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["top_k_results"], 9);
}
