//! Command-line contract tests
//!
//! Runs the built binary against a temporary vault and checks exit status.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const MISSING_TOKEN: &str = "VAULTFLOW_CLI_TEST_MISSING_TOKEN";

const SCHEDULE: &str = r#"
schedule:
  - name: yearly
    frequency: "0 0 1 1 *"
    action: health_check
"#;

struct Vault {
    temp: TempDir,
    config: PathBuf,
}

impl Vault {
    fn new() -> Self {
        Self::with_extra("")
    }

    /// Config with `extra` appended to the base settings
    fn with_extra(extra: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("vaultflow.yml");
        let yaml = format!(
            "vault_path: {}\nlog_dir: {}\n{}",
            temp.path().join("vault").display(),
            temp.path().join("logs").display(),
            extra
        );
        fs::write(&config, yaml).unwrap();
        Self { temp, config }
    }

    fn root(&self) -> PathBuf {
        self.temp.path().join("vault")
    }

    fn write_schedule(&self, yaml: &str) -> PathBuf {
        fs::create_dir_all(self.root()).unwrap();
        let path = self.root().join("schedule.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_vaultflow"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env_remove(MISSING_TOKEN)
            .env("NO_COLOR", "1")
            .env_remove("CLICOLOR_FORCE")
            .current_dir(self.temp.path())
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit {:?}\nstdout: {}\nstderr: {}",
        output.status.code(),
        stdout(output),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(!output.status.success(), "unexpected success\nstdout: {}", stdout(output));
}

#[test]
fn test_action_unknown_name_warns_and_exits_zero() {
    let vault = Vault::new();
    let output = vault.run(&["scheduler", "--action", "bogus_action"]);
    assert_success(&output);
    assert!(stdout(&output).contains("unknown action 'bogus_action'"));
}

#[test]
fn test_action_success_exits_zero_and_records_manual_run() {
    let vault = Vault::new();
    let output = vault.run(&["scheduler", "--action", "daily_report"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Completed:"));

    let state = fs::read_to_string(vault.root().join("scheduler_state.json")).unwrap();
    assert!(state.contains("manual_daily_report"));
}

#[test]
fn test_action_failure_warns_and_exits_zero() {
    let vault = Vault::new();
    fs::create_dir_all(vault.root()).unwrap();
    // The report folder is a file, so writing the report fails
    fs::write(vault.root().join("Accounting"), "not a folder").unwrap();

    let output = vault.run(&["scheduler", "--action", "daily_report"]);
    assert_success(&output);
    assert!(stdout(&output).contains("action 'daily_report' failed"));
}

#[test]
fn test_validate_missing_schedule_fails() {
    let vault = Vault::new();
    assert_failure(&vault.run(&["scheduler", "--validate"]));
}

#[test]
fn test_validate_bad_cron_fails() {
    let vault = Vault::new();
    vault.write_schedule(
        r#"
schedule:
  - name: broken
    frequency: "61 * * * *"
    action: health_check
"#,
    );
    assert_failure(&vault.run(&["scheduler", "--validate"]));
}

#[test]
fn test_validate_and_list_good_schedule() {
    let vault = Vault::new();
    vault.write_schedule(SCHEDULE);

    let output = vault.run(&["scheduler", "--validate"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Valid:"));

    let output = vault.run(&["scheduler", "--list"]);
    assert_success(&output);
    assert!(stdout(&output).contains("yearly"));
}

#[test]
fn test_validate_explicit_schedule_path() {
    let vault = Vault::new();
    let path = vault.temp.path().join("elsewhere.yaml");
    fs::write(&path, SCHEDULE).unwrap();
    assert_success(&vault.run(&["scheduler", "--validate", "--schedule", path_str(&path)]));
}

fn sender_needing_token() -> String {
    format!(
        "senders:\n  - name: email\n    lane: Ready_To_Send/Email\n    command: \"true\"\n    required_env: [{}]\n",
        MISSING_TOKEN
    )
}

#[test]
fn test_missing_sender_credential_aborts_manual_run() {
    let vault = Vault::with_extra(&sender_needing_token());
    let output = vault.run(&["scheduler", "--action", "health_check"]);
    assert_failure(&output);
    assert!(!vault.root().join("scheduler_state.json").exists());
}

#[test]
fn test_missing_sender_credential_aborts_scheduler_startup() {
    let vault = Vault::with_extra(&sender_needing_token());
    vault.write_schedule(SCHEDULE);
    let output = vault.run(&["scheduler", "--check-once"]);
    assert_failure(&output);
    assert!(!stdout(&output).contains("Scheduler started:"));
}

#[test]
fn test_check_once_runs_single_pass() {
    let vault = Vault::new();
    vault.write_schedule(SCHEDULE);
    let output = vault.run(&["scheduler", "--check-once"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Stopped: 1 passes"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_vaultflow"))
        .args(["--config", "/nonexistent/vaultflow.yml", "status"])
        .output()
        .unwrap();
    assert_failure(&output);
}
