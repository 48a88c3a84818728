//! Command-line behavior that does not need a reachable tracker.

use assert_cmd::Command;
use tempfile::TempDir;

fn jiramirror(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("jiramirror").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("JIRA_URL")
        .env_remove("JIRA_USERNAME")
        .env_remove("JIRA_PASSWORD")
        .env_remove("JIRA_PROJECT")
        .env_remove("JIRAMIRROR_CONFIG")
        .env_remove("JIRAMIRROR_DB")
        .env_remove("JIRAMIRROR_ACTOR")
        .env_remove("RUST_LOG");
    cmd
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_versions_argument() {
    let home = TempDir::new().unwrap();
    let output = jiramirror(&home).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("VERSIONS"), "help was: {stdout}");
}

#[test]
fn missing_configuration_exits_with_config_code() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("absent.json");
    let output = jiramirror(&home)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Configuration error"), "stderr was: {stderr}");
    assert!(stderr.contains("missing `url`"), "stderr was: {stderr}");
}

#[test]
fn json_mode_reports_structured_error() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("absent.json");
    let output = jiramirror(&home)
        .arg("--json")
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("CONFIG_ERROR"), "stderr was: {stderr}");
}

#[test]
fn unparseable_config_file_is_a_config_error() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.json");
    std::fs::write(&config, "{ not json").unwrap();

    let output = jiramirror(&home)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn blank_version_name_is_rejected() {
    let home = TempDir::new().unwrap();
    let output = jiramirror(&home).arg("  ").output().unwrap();

    assert_eq!(output.status.code(), Some(4));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Invalid argument"), "stderr was: {stderr}");
}
