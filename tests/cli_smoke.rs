// tests/cli_smoke.rs

//! End-to-end CLI checks against the built binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

const VALID_GRAPH: &str = r#"{
  "schema_version": "1.0.0",
  "graph": {
    "nodes": [
      {"id": "hello", "type": "shell", "inputs": {"run": "printf hi > out.txt"}, "outputs": ["out.txt"]}
    ],
    "edges": []
  },
  "metadata": {}
}"#;

fn bin() -> Command {
    Command::cargo_bin("taskweave").unwrap()
}

#[test]
fn hash_prints_stable_hex_independent_of_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.json");
    fs::write(&graph_path, VALID_GRAPH).unwrap();

    let first = bin()
        .args(["hash", "--graph", graph_path.to_str().unwrap()])
        .assert()
        .success();
    let stdout = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let hash = stdout.trim().to_string();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let elsewhere = tempfile::tempdir().unwrap();
    bin()
        .current_dir(elsewhere.path())
        .args(["hash", "--graph", graph_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(hash));
}

#[test]
fn validate_rejects_cycle_with_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.json");
    fs::write(
        &graph_path,
        r#"{
          "schema_version": "1.0.0",
          "graph": {
            "nodes": [
              {"id": "a", "type": "shell", "inputs": {}, "outputs": []},
              {"id": "b", "type": "shell", "inputs": {}, "outputs": []}
            ],
            "edges": [{"from": "a", "to": "b"}, {"from": "b", "to": "a"}]
          },
          "metadata": {}
        }"#,
    )
    .unwrap();

    bin()
        .args(["validate", "--graph", graph_path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn unknown_flag_exits_2() {
    bin()
        .args(["hash", "--graph", "g.json", "--bogus"])
        .assert()
        .code(2);
}

#[test]
fn run_executes_graph_and_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("graph.json"), VALID_GRAPH).unwrap();

    bin()
        .args([
            "run",
            "--workdir",
            dir.path().to_str().unwrap(),
            "--graph",
            "graph.json",
            "--mode",
            "incremental",
            "--trace",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("graphHash"));

    assert_eq!(
        fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "hi"
    );
    assert!(dir.path().join(".taskweave/runs").is_dir());
}

#[test]
fn trace_out_writes_canonical_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("graph.json"), VALID_GRAPH).unwrap();

    bin()
        .args([
            "run",
            "--workdir",
            dir.path().to_str().unwrap(),
            "--graph",
            "graph.json",
            "--trace-out",
            "trace.json",
        ])
        .assert()
        .success();

    let trace = fs::read_to_string(dir.path().join("trace.json")).unwrap();
    assert!(trace.starts_with(r#"{"graphHash":""#), "{trace}");
    assert!(trace.contains("TaskExecuted"), "{trace}");
}

#[test]
fn failing_task_exits_3_and_records_failure() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("graph.json"),
        r#"{
          "schema_version": "1.0.0",
          "graph": {
            "nodes": [
              {"id": "boom", "type": "shell", "inputs": {"run": "exit 7"}, "outputs": []}
            ],
            "edges": []
          },
          "metadata": {}
        }"#,
    )
    .unwrap();

    bin()
        .args([
            "run",
            "--workdir",
            dir.path().to_str().unwrap(),
            "--graph",
            "graph.json",
        ])
        .assert()
        .code(3);

    let runs = dir.path().join(".taskweave/runs");
    let run_dir = fs::read_dir(&runs).unwrap().next().unwrap().unwrap().path();
    assert!(run_dir.join("failure.json").is_file());
}

#[test]
fn missing_workdir_exits_2() {
    bin()
        .args([
            "run",
            "--workdir",
            "/definitely/not/a/real/dir",
            "--graph",
            "graph.json",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("working directory"));
}

#[test]
fn plugins_list_is_quiet_on_fresh_workspace() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["plugins", "list", "--workdir", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn plugins_list_reports_plugin_states() {
    let dir = tempfile::tempdir().unwrap();
    let plugins = dir.path().join(".taskweave/plugins");
    fs::create_dir_all(plugins.join("good")).unwrap();
    fs::write(
        plugins.join("good/manifest.json"),
        r#"{"plugin_id":"good","version":"1.0","hooks":["BeforeRun"]}"#,
    )
    .unwrap();
    fs::create_dir_all(plugins.join("bad")).unwrap();
    fs::write(plugins.join("bad/manifest.json"), "{").unwrap();

    bin()
        .args(["plugins", "list", "--workdir", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("good enabled"))
        .stdout(predicate::str::contains("bad disabled"));
}
