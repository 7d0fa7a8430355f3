// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for xtask subcommands.

use std::process::{Command, Output};

fn xtask(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xtask"))
        .args(args)
        .output()
        .expect("spawn xtask")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn list_crates_produces_output() {
    let out = xtask(&["list-crates"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("scout-core"));
}

#[test]
fn list_crates_includes_orchestrator() {
    let out = xtask(&["list-crates"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("scout-orchestrator"));
}

#[test]
fn audit_runs_clean_on_the_workspace() {
    let out = xtask(&["audit"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("required fields"));
}

#[test]
fn stats_reports_crate_count() {
    let out = xtask(&["stats"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("crates:"));
}

#[test]
fn docs_subcommand_accepts_open_flag() {
    let out = Command::new(env!("CARGO_BIN_EXE_xtask"))
        .args(["docs", "--help"])
        .output()
        .expect("spawn xtask");
    assert!(out.status.success());
    assert!(stdout(&out).contains("--open"));
}

#[test]
fn schema_writes_valid_json_for_every_contract_type() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let out = xtask(&["schema", "--out-dir", tmp.path().to_str().unwrap()]);
    assert!(out.status.success());

    for name in [
        "job.schema.json",
        "item.schema.json",
        "job_config.schema.json",
        "job_trigger.schema.json",
        "status_response.schema.json",
        "result_record.schema.json",
    ] {
        let path = tmp.path().join(name);
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
        let value: serde_json::Value = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("parse {}: {e}", path.display()));
        let obj = value.as_object().expect("schema should be a JSON object");
        assert!(
            obj.contains_key("$schema") || obj.contains_key("type") || obj.contains_key("$ref"),
            "{name} missing top-level schema key"
        );
    }
}
