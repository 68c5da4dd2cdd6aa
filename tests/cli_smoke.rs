//! CLI smoke tests: run the compiled binary against temporary manifests.
//!
//! HOME points at a temp directory so no user config leaks in.

use std::path::Path;
use std::process::Command;

use tempfile::{tempdir, TempDir};

/// Helper: run corewire with given args and return (exit_code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    run_cli_with_env(home, args, &[])
}

/// Like `run_cli`, with extra environment variables set on the child.
fn run_cli_with_env(home: &Path, args: &[&str], vars: &[(&str, &str)]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_corewire");
    let output = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "off")
        .env_remove("COREWIRE_ENV")
        .env_remove("COREWIRE_VALIDATOR_MANIFEST_PATH")
        .envs(vars.iter().copied())
        .output()
        .expect("failed to execute corewire binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn write_manifest(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

const PASSING: &str = r#"
dependencies:
  required:
    - name: shell
      import_identifier: "bin:sh"
  optional:
    - name: imaginary
      import_identifier: "bin:corewire-test-imaginary-tool"
      installation_identifier: "apt install imaginary"
  development:
    - name: devtool
      import_identifier: "bin:corewire-test-devtool"
feature_dependencies:
  scripting:
    required: [shell]
    optional: [imaginary]
dependency_groups:
  extras:
    description: Nice to have
    dependencies: [imaginary]
"#;

const FAILING: &str = r#"
dependencies:
  required:
    - name: ghost
      import_identifier: "bin:corewire-test-ghost-binary"
      installation_identifier: "cargo install ghost"
"#;

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("corewire"));
}

#[test]
fn cli_version_command() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("corewire"));
    assert!(stdout.contains('.'));
}

// ============================================================================
// Check
// ============================================================================

#[test]
fn cli_check_passes_with_optional_missing() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);
    let (code, stdout, _stderr) = run_cli(home.path(), &["check", "--manifest", &manifest]);
    assert_eq!(code, 0, "stdout: {}", stdout);
    assert!(stdout.contains("[OK]"));
    assert!(stdout.contains("[WARN]"));
    assert!(stdout.contains("apt install imaginary"));
    // Development entries are skipped in production.
    assert!(!stdout.contains("devtool"));
}

#[test]
fn cli_check_fails_on_missing_required() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", FAILING);
    let (code, stdout, _stderr) = run_cli(home.path(), &["check", "--manifest", &manifest]);
    assert_eq!(code, 1);
    assert!(stdout.contains("[ERROR] ghost"));
    assert!(stdout.contains("cargo install ghost"));
}

#[test]
fn cli_check_development_env_includes_dev_entries() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);
    let (code, stdout, _stderr) = run_cli(
        home.path(),
        &["check", "--manifest", &manifest, "--env", "development"],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("devtool"));
}

#[test]
fn cli_check_json_output() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.json", r#"{"dependencies":{"required":[{"name":"sh","import_identifier":"bin:sh"}]}}"#);
    let (code, stdout, _stderr) = run_cli(home.path(), &["check", "--manifest", &manifest, "--json"]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["resolved"][0]["name"], "sh");
    assert_eq!(value["environment"], "production");
}

#[test]
fn cli_check_without_manifest_errors() {
    let home = tempdir().unwrap();
    let (code, _stdout, stderr) = run_cli(home.path(), &["check"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("manifest"));
}

#[test]
fn cli_check_invalid_manifest_errors() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", "dependencies: [not, a, map]");
    let (code, _stdout, stderr) = run_cli(home.path(), &["check", "--manifest", &manifest]);
    assert_ne!(code, 0);
    assert!(stderr.contains("manifest"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn cli_check_rejects_unknown_env_variable() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);
    let (code, stdout, stderr) = run_cli_with_env(
        home.path(),
        &["check", "--manifest", &manifest],
        &[("COREWIRE_ENV", "prodution")],
    );
    assert_ne!(code, 0);
    assert!(!stdout.contains("[OK]"));
    assert!(stderr.contains("Failed to load configuration"), "stderr: {}", stderr);
}

#[test]
fn cli_check_rejects_malformed_config_file() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join(".corewire");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.json"), "{ not json").unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);

    let (code, _stdout, stderr) = run_cli(home.path(), &["check", "--manifest", &manifest]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Failed to load configuration"), "stderr: {}", stderr);

    // Commands that do not read the config still work.
    let (code, stdout, _stderr) = run_cli(home.path(), &["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("corewire"));
}

#[test]
fn cli_env_variable_selects_development() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);
    let (code, stdout, _stderr) = run_cli_with_env(
        home.path(),
        &["check", "--manifest", &manifest],
        &[("COREWIRE_ENV", "development")],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("devtool"));
}

// ============================================================================
// Features & Groups
// ============================================================================

#[test]
fn cli_features_reports_degraded() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);
    let (code, stdout, _stderr) = run_cli(home.path(), &["features", "--manifest", &manifest]);
    assert_eq!(code, 0);
    assert!(stdout.contains("scripting: degraded"));
}

#[test]
fn cli_groups_list_and_command() {
    let home = tempdir().unwrap();
    let manifest = write_manifest(&home, "deps.yaml", PASSING);

    let (code, stdout, _stderr) = run_cli(home.path(), &["groups", "--manifest", &manifest]);
    assert_eq!(code, 0);
    assert!(stdout.contains("extras - Nice to have"));

    let (code, stdout, _stderr) =
        run_cli(home.path(), &["groups", "extras", "--manifest", &manifest]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "apt install imaginary");

    let (code, _stdout, _stderr) =
        run_cli(home.path(), &["groups", "nope", "--manifest", &manifest]);
    assert_ne!(code, 0);
}
