// tests/cli.rs

mod common;

use assert_cmd::Command;
use common::{source, TestRepo};
use predicates::str::contains;
use serde_json::Value;

const ENV: [&str; 6] = [
    "GITHUB_STEP_SUMMARY",
    "GITHUB_WORKSPACE",
    "INPUT_WORKSPACE",
    "INPUT_FILES",
    "INPUT_MIN_THRESHOLD",
    "INPUT_BASE_BRANCH",
];

fn cmd(repo: &TestRepo) -> Command {
    let mut cmd = Command::cargo_bin("committer-coverage").unwrap();
    for var in ENV {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "warn").arg("--repo").arg(repo.path());
    cmd
}

/// alice owns lib.rs (3 of 4 lines covered), bob owns util.rs (none covered).
fn fixture() -> TestRepo {
    let repo = TestRepo::new();
    repo.write("src/lib.rs", source("lib", 4));
    repo.commit("Alice", "alice@example.com", 1_700_000_000, "lib");
    repo.write("src/util.rs", source("util", 2));
    repo.commit("Bob", "bob@example.com", 1_700_000_100, "util");
    repo.write(
        "lcov.info",
        "SF:src/lib.rs\nDA:1,1\nDA:2,4\nDA:3,1\nDA:4,0\nend_of_record\nSF:src/util.rs\nDA:1,0\nDA:2,0\nend_of_record\n",
    );
    repo
}

#[test]
fn passing_gate_exits_zero() {
    let repo = fixture();
    cmd(&repo)
        .args(["--coverage", "lcov.info", "--min-threshold", "50"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("PASSED"))
        .stdout(contains("alice@example.com"));
}

#[test]
fn failing_gate_exits_one() {
    let repo = fixture();
    cmd(&repo)
        .args(["--coverage", "lcov.info", "--min-threshold", "50", "--enforce-per-committer"])
        .current_dir(repo.path())
        .assert()
        .code(1)
        .stdout(contains("FAILED"))
        .stdout(contains("✗ bob@example.com"));
}

#[test]
fn invalid_threshold_exits_two() {
    let repo = fixture();
    cmd(&repo)
        .args(["--coverage", "lcov.info", "--min-threshold", "101"])
        .current_dir(repo.path())
        .assert()
        .code(2)
        .stderr(contains("InvalidThreshold"));
}

#[test]
fn missing_report_exits_two() {
    let repo = fixture();
    cmd(&repo)
        .args(["--coverage", "nope.xml"])
        .current_dir(repo.path())
        .assert()
        .code(2)
        .stderr(contains("CoverageReport"));
}

#[test]
fn json_output_and_job_summary() {
    let repo = fixture();
    let summary = repo.path().join("summary.md");
    let out = cmd(&repo)
        .args(["--coverage", "lcov.info", "--min-threshold", "50", "-o", "json"])
        .arg("--summary-file")
        .arg(&summary)
        .current_dir(repo.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["gate"]["verdict"], "PASSED");
    assert_eq!(json["gate"]["attributed_lines"], 6);
    assert_eq!(json["gate"]["per_committer"][0]["identity"], "bob@example.com");

    let markdown = std::fs::read_to_string(summary).unwrap();
    assert!(markdown.contains("# Committer Coverage Report"));
    assert!(markdown.contains("| ✅ | Alice &lt;alice@example.com&gt; | 4 | 3 | 75.00 |"));
}

#[test]
fn cobertura_names_are_resolved_against_source_roots() {
    let repo = fixture();
    let report = format!(
        r#"<?xml version="1.0" ?>
<coverage line-rate="0.5">
  <sources><source>{}</source></sources>
  <packages><package name="src"><classes>
    <class name="lib" filename="lib.rs">
      <lines>
        <line number="1" hits="1"/><line number="2" hits="1"/>
        <line number="3" hits="1"/><line number="4" hits="1"/>
      </lines>
    </class>
  </classes></package></packages>
</coverage>
"#,
        repo.path().join("src").display()
    );
    repo.write("coverage.xml", report);

    cmd(&repo)
        .args(["--min-threshold", "100"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("Attributed coverage: 4 / 4 (100.00%)"));
}
