//! CLI tests for `devflow run`, `validate` and `nodes`.
//!
//! Spawns the devflow binary and checks exit codes, stdout and run artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use devflow::exit_codes;
use devflow::io::config::{
    BackendConfig, BackendKind, EngineConfig, OracleConfig, OracleKind, write_config,
};
use devflow::io::run_log::{ENVELOPES_FILE, SUMMARY_FILE};
use devflow::test_support::WorkflowFixture;

fn bundled_workflow() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflows/dev_pipeline.yaml")
}

fn devflow(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_devflow"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run devflow")
}

fn optimistic_config(dir: &Path) -> PathBuf {
    let path = dir.join("devflow.toml");
    let cfg = EngineConfig {
        oracle: OracleConfig {
            kind: OracleKind::Optimistic,
            seed: None,
        },
        ..EngineConfig::default()
    };
    write_config(&path, &cfg).expect("write config");
    path
}

#[test]
fn optimistic_run_finishes_with_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    optimistic_config(temp.path());
    let workflow = bundled_workflow();

    let output = devflow(temp.path(), &["run", workflow.to_str().expect("utf8")]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[Master] workflow started, first node: requirements-analysis"));
    assert!(stdout.contains("[Code Review] code review complete, verdict: pass"));
    assert!(stdout.trim_end().ends_with("status: finished"));
}

#[test]
fn run_dir_receives_envelopes_and_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = optimistic_config(temp.path());
    let run_dir = temp.path().join("artifacts");
    let workflow = bundled_workflow();

    let output = devflow(
        temp.path(),
        &[
            "run",
            workflow.to_str().expect("utf8"),
            "--config",
            config.to_str().expect("utf8"),
            "--run-dir",
            run_dir.to_str().expect("utf8"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let envelopes = fs::read_to_string(run_dir.join(ENVELOPES_FILE)).expect("envelopes");
    assert_eq!(envelopes.lines().count(), 21);
    let first: serde_json::Value =
        serde_json::from_str(envelopes.lines().next().expect("line")).expect("json");
    assert_eq!(first["node_id"], "master");
    assert_eq!(first["output_format"], "markdown");

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join(SUMMARY_FILE)).expect("summary"))
            .expect("json");
    assert_eq!(summary["workflow_name"], "dev-pipeline");
    assert_eq!(summary["status"], "finished");
    assert_eq!(summary["master_decisions"], 11);
    assert_eq!(summary["sub_executions"], 10);
}

#[test]
fn reused_run_dir_holds_only_the_latest_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = optimistic_config(temp.path());
    let run_dir = temp.path().join("artifacts");
    let workflow = bundled_workflow();
    let args = [
        "run",
        workflow.to_str().expect("utf8"),
        "--config",
        config.to_str().expect("utf8"),
        "--run-dir",
        run_dir.to_str().expect("utf8"),
    ];

    assert_eq!(devflow(temp.path(), &args).status.code(), Some(exit_codes::OK));
    assert_eq!(devflow(temp.path(), &args).status.code(), Some(exit_codes::OK));

    let envelopes = fs::read_to_string(run_dir.join(ENVELOPES_FILE)).expect("envelopes");
    assert_eq!(envelopes.lines().count(), 21);
}

#[test]
fn seed_with_optimistic_oracle_warns() {
    let temp = tempfile::tempdir().expect("tempdir");
    optimistic_config(temp.path());
    let workflow = bundled_workflow();

    let output = Command::new(env!("CARGO_BIN_EXE_devflow"))
        .current_dir(temp.path())
        .env("RUST_LOG", "warn")
        .args(["run", workflow.to_str().expect("utf8"), "--seed", "9"])
        .output()
        .expect("run devflow");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stderr).contains("seed has no effect"));
}

#[cfg(unix)]
#[test]
fn document_llm_provider_overrides_configured_backend() {
    let bundled = fs::read_to_string(bundled_workflow()).expect("read bundled");
    let document = bundled.replace(
        "    language: en\n",
        "    language: en\n    llm_provider: mock\n",
    );
    assert_ne!(document, bundled);
    let fixture = WorkflowFixture::new(&document).expect("fixture");
    let config = fixture.dir().join("devflow.toml");
    let cfg = EngineConfig {
        backend: BackendConfig {
            kind: BackendKind::Command,
            command: vec!["sh".to_string(), "-c".to_string(), "echo from-command".to_string()],
            ..BackendConfig::default()
        },
        oracle: OracleConfig {
            kind: OracleKind::Optimistic,
            seed: None,
        },
        ..EngineConfig::default()
    };
    write_config(&config, &cfg).expect("write config");
    let run_dir = fixture.dir().join("artifacts");

    let output = devflow(
        fixture.dir(),
        &[
            "run",
            WorkflowFixture::FILE_NAME,
            "--run-dir",
            run_dir.to_str().expect("utf8"),
        ],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let envelopes = fs::read_to_string(run_dir.join(ENVELOPES_FILE)).expect("envelopes");
    assert_eq!(envelopes.lines().count(), 21);
    assert!(!envelopes.contains("from-command"));
}

#[test]
fn seeded_runs_print_identical_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workflow = bundled_workflow();
    let args = ["run", workflow.to_str().expect("utf8"), "--seed", "5"];

    let first = devflow(temp.path(), &args);
    let second = devflow(temp.path(), &args);

    assert_eq!(first.status.code(), second.status.code());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn missing_workflow_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = devflow(temp.path(), &["run", "missing.yaml"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("workflow document not found"));
}

#[test]
fn bad_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("devflow.toml"), "max_steps = 0\n").expect("write");
    let workflow = bundled_workflow();

    let output = devflow(temp.path(), &["run", workflow.to_str().expect("utf8")]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_steps"));
}

#[test]
fn validate_reports_node_count() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workflow = bundled_workflow();

    let output = devflow(temp.path(), &["validate", workflow.to_str().expect("utf8")]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "ok: 12 nodes, master 'master'");
}

#[test]
fn validate_warns_about_undeclared_stages() {
    let fixture = WorkflowFixture::new(
        "meta:\n  master_node_id: master\nnodes:\n  - node_id: master\n  - node_id: requirements-analysis\n",
    )
    .expect("fixture");

    let output = devflow(fixture.dir(), &["validate", WorkflowFixture::FILE_NAME]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("warning: decision table references undeclared node 'bug-fix'"));
    assert!(stdout.contains("ok: 2 nodes, master 'master'"));
}

#[test]
fn validate_rejects_missing_master() {
    let fixture =
        WorkflowFixture::new("meta:\n  master_node_id: master\nnodes:\n  - node_id: unit-test\n")
            .expect("fixture");

    let output = devflow(fixture.dir(), &["validate", WorkflowFixture::FILE_NAME]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("master node 'master'"));
}

#[test]
fn stalled_run_exits_with_stalled_code() {
    let fixture = WorkflowFixture::new(
        "meta:\n  master_node_id: master\nglobal:\n  process_control:\n    workflow_status: executing\n    current_node_id: master\nnodes:\n  - node_id: master\n",
    )
    .expect("fixture");
    let workflow = fixture.workflow_path();

    let output = devflow(fixture.dir(), &["run", workflow.to_str().expect("utf8")]);

    assert_eq!(output.status.code(), Some(exit_codes::STALLED));
    assert!(String::from_utf8_lossy(&output.stdout).contains("status: stalled"));
}

#[test]
fn nodes_prints_yaml_in_document_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workflow = bundled_workflow();

    let output = devflow(temp.path(), &["nodes", workflow.to_str().expect("utf8")]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let master = stdout.find("node_id: master").expect("master");
    let merge = stdout.find("node_id: manual-merge").expect("merge");
    assert!(master < merge);
    assert!(stdout.contains("type: manual"));
}
