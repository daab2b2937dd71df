#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PLAYBOOK: &str = "kustomizationplaybook.yaml";

const VALID: &str = "\
apiVersion: kustomizeplaybook.world-direct.at/v1beta1
kind: KustomizationPlaybook
components:
- name: base
  kustomization:
    resources:
    - base.yaml
- name: app
  dependsOn:
  - name: base
  envsubst: true
  kustomization:
    namespace: ${APP_NAMESPACE:-default}
    resources:
    - app.yaml
";

fn kpb() -> Command {
    let mut cmd = Command::cargo_bin("kpb").unwrap();
    cmd.env_remove("KUBECONFIG").env_remove("RUST_LOG");
    cmd
}

fn playbook_dir(content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(PLAYBOOK), content).unwrap();
    dir
}

#[cfg(unix)]
fn fake_tool(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Pre-flight errors
// ---------------------------------------------------------------------------

#[test]
fn missing_directory_exits_1() {
    let dir = TempDir::new().unwrap();
    kpb()
        .arg(dir.path().join("nope"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("doesn't exist"));
}

#[test]
fn missing_playbook_exits_1() {
    let dir = TempDir::new().unwrap();
    kpb()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(PLAYBOOK));
}

#[test]
fn existing_kustomization_exits_1() {
    let dir = playbook_dir(VALID);
    std::fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();
    kpb()
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("kustomization.yaml"));
    // Left untouched.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("kustomization.yaml")).unwrap(),
        "resources: []\n"
    );
}

#[test]
fn malformed_playbook_exits_1() {
    let dir = playbook_dir("apiVersion: [unterminated\n");
    kpb()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error parsing playbook"));
}

#[test]
fn unknown_field_is_a_parse_error() {
    let dir = playbook_dir(&format!("{VALID}extra: true\n"));
    kpb()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("extra"));
}

#[test]
fn condition_without_check_is_rejected() {
    let dir = playbook_dir(&format!("{VALID}prerequisites:\n- message: nothing to check\n"));
    kpb()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exactly one check"));
}

#[test]
fn all_validation_errors_are_printed() {
    let dir = playbook_dir(
        "\
apiVersion: kustomizeplaybook.world-direct.at/v1beta1
kind: KustomizationPlaybook
components:
- name: dependent
  dependsOn:
  - name: base
  kustomization: {}
- name: base
  kustomization: {}
- name: CAPS
  kustomization: {}
",
    );
    kpb()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid ordering"))
        .stderr(predicate::str::contains("'base'"))
        .stderr(predicate::str::contains("'dependent'"))
        .stderr(predicate::str::contains("invalid component name 'CAPS'"));
}

#[test]
fn missing_envfile_exits_1() {
    let dir = playbook_dir(VALID);
    kpb()
        .arg(dir.path())
        .args(["--envfile", "does-not-exist.env", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist.env"));
}

// ---------------------------------------------------------------------------
// --dry-run
// ---------------------------------------------------------------------------

#[test]
fn dry_run_prints_kustomizations_with_defaults() {
    let dir = playbook_dir(VALID);
    kpb()
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("# base"))
        .stdout(predicate::str::contains("# app"))
        .stdout(predicate::str::contains("namespace: default"));
}

#[test]
fn dry_run_substitutes_from_envfile() {
    let dir = playbook_dir(VALID);
    let envfile = dir.path().join("prod.env");
    std::fs::write(&envfile, "APP_NAMESPACE=production\n").unwrap();
    kpb()
        .arg(dir.path())
        .arg("--envfile")
        .arg(&envfile)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace: production"));
}

#[test]
fn dry_run_json_emits_one_line_per_component() {
    let dir = playbook_dir(VALID);
    let out = kpb()
        .arg(dir.path())
        .args(["--dry-run", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["component"], "base");
    assert_eq!(lines[1]["kustomization"]["namespace"], "default");
}

#[test]
fn dry_run_does_not_leave_kustomization_behind() {
    let dir = playbook_dir(VALID);
    kpb().arg(dir.path()).arg("--dry-run").assert().success();
    assert!(!dir.path().join("kustomization.yaml").exists());
}

// ---------------------------------------------------------------------------
// Cluster-facing run
// ---------------------------------------------------------------------------

#[test]
fn missing_tools_exit_1() {
    let dir = playbook_dir(VALID);
    let empty = TempDir::new().unwrap();
    kpb()
        .arg(dir.path())
        .env("PATH", empty.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("kustomize"));
}

#[cfg(unix)]
#[test]
fn unreadable_kubeconfig_is_unexpected() {
    let dir = playbook_dir(VALID);
    let tools = TempDir::new().unwrap();
    fake_tool(tools.path(), "kustomize");
    fake_tool(tools.path(), "kubectl");
    kpb()
        .arg(dir.path())
        .arg("--kubeconfig")
        .arg(tools.path().join("missing-kubeconfig"))
        .env("PATH", tools.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("kubeconfig"));
}

#[test]
fn directory_argument_is_required() {
    kpb().assert().failure();
}
