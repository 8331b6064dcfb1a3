use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn converge(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("converge"));
    cmd.env("CONVERGE_CONFIG", home.path().join("absent.toml"))
        .env_remove("CONVERGE_DIR")
        .env("NO_COLOR", "1");
    cmd
}

fn states(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn arg(dir: &Path) -> &str {
    dir.to_str().unwrap()
}

const BASE: &str = r#"
[apt.update.base]
packages = ["curl"]
"#;

const HELLO: &str = r#"
[shell.run.hello]
cmd = "echo"
args = ["hello"]
requires = "apt.update.base"
"#;

#[test]
fn plan_prints_tree_and_order() {
    let home = TempDir::new().unwrap();
    let dir = states(&[("base.toml", BASE), ("hello.toml", HELLO)]);

    converge(&home)
        .args(["plan", arg(dir.path())])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            " - root\n     - apt.update.base\n         - shell.run.hello\n",
        ))
        .stdout(predicate::str::contains("[1/2] apt.update.base"))
        .stdout(predicate::str::contains("[2/2] shell.run.hello"));
}

#[test]
fn plan_json_lists_edges() {
    let home = TempDir::new().unwrap();
    let dir = states(&[("base.toml", BASE), ("hello.toml", HELLO)]);

    let output = converge(&home)
        .args(["plan", "--json", arg(dir.path())])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["resources"].as_array().unwrap().len(), 2);
    assert_eq!(report["edges"].as_array().unwrap().len(), 2);
    assert_eq!(
        report["order"],
        serde_json::json!(["apt.update.base", "shell.run.hello"])
    );
}

#[test]
fn validate_reports_counts() {
    let home = TempDir::new().unwrap();
    let dir = states(&[("base.toml", BASE), ("hello.toml", HELLO)]);

    converge(&home)
        .args(["validate", arg(dir.path())])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 resources, 2 edges in 2 files"));
}

#[test]
fn directory_from_environment() {
    let home = TempDir::new().unwrap();
    let dir = states(&[("base.toml", BASE)]);

    converge(&home)
        .env("CONVERGE_DIR", dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 resource, 1 edge in 1 file"));
}

#[test]
fn missing_directory_fails() {
    let home = TempDir::new().unwrap();

    converge(&home)
        .args(["validate", arg(&home.path().join("nowhere"))])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Declarations directory not found"));
}

#[test]
fn unknown_reference_fails() {
    let home = TempDir::new().unwrap();
    let dir = states(&[("hello.toml", HELLO)]);

    converge(&home)
        .args(["plan", arg(dir.path())])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "unable to find 'requires' state 'apt.update.base', which shell.run.hello depends on",
        ));
}

#[test]
fn cycle_fails() {
    let home = TempDir::new().unwrap();
    let dir = states(&[(
        "loop.toml",
        r#"
[shell.run.a]
cmd = "true"
requires = "shell.run.b"

[shell.run.b]
cmd = "true"
requires = "shell.run.a"
"#,
    )]);

    converge(&home)
        .args(["validate", arg(dir.path())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("would create a cycle"));
}

#[test]
fn apply_dry_run_changes_nothing() {
    let home = TempDir::new().unwrap();
    let dir = states(&[(
        "hello.toml",
        r#"
[shell.run.hello]
cmd = "echo"
args = ["hello"]
"#,
    )]);

    converge(&home)
        .args(["apply", "--dry-run", arg(dir.path())])
        .assert()
        .success()
        .stderr(predicate::str::contains("shell.run.hello"))
        .stdout(predicate::str::contains("would run: echo hello"))
        .stdout(predicate::str::contains("Dry run"));
}

#[test]
fn apply_runs_shell_in_order() {
    let home = TempDir::new().unwrap();
    let dir = states(&[(
        "chain.toml",
        r#"
[shell.run.first]
cmd = "true"

[shell.run.second]
cmd = "true"
requires = "shell.run.first"
"#,
    )]);

    converge(&home)
        .args(["apply", "--yes", "-j", "2", arg(dir.path())])
        .assert()
        .success()
        .stdout(predicate::str::contains("Converged"))
        .stdout(predicate::str::contains("2 resources changed"));
}

#[test]
fn apply_failure_is_reported() {
    let home = TempDir::new().unwrap();
    let dir = states(&[(
        "broken.toml",
        r#"
[shell.run.broken]
cmd = "sh"
args = ["-c", "exit 4"]

[shell.run.after]
cmd = "true"
requires = "shell.run.broken"
"#,
    )]);

    converge(&home)
        .args(["apply", "--yes", arg(dir.path())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("shell.run.broken failed during apply"));
}

#[test]
fn completions_generate() {
    let home = TempDir::new().unwrap();

    converge(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("converge"));
}
