//! CLI tests for the `devflow` binary.
//!
//! Spawns the binary and checks exit codes for the read-only report, input
//! validation and the hook protocol.

use std::io::Write;
use std::process::{Command, Stdio};

use devflow::exit_codes;

fn devflow(dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_devflow"));
    command.current_dir(dir).env_remove("RUST_LOG");
    for key in ["DEVFLOW_TOKEN", "GITHUB_TOKEN", "GH_TOKEN", "AZURE_DEVOPS_EXT_PAT"] {
        command.env_remove(key);
    }
    command
}

#[test]
fn status_exits_ok_without_a_plan() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = devflow(temp.path())
        .arg("status")
        .output()
        .expect("devflow status");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No active plan"), "{stdout}");
}

#[test]
fn blank_requirements_exit_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = devflow(temp.path())
        .args(["plan", "generate", "   "])
        .output()
        .expect("devflow plan generate");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No requirements"), "{stderr}");
    assert!(!temp.path().join(".devflow/active_plan").exists());
}

#[test]
fn generate_then_status_reports_unlocked_plan() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = devflow(temp.path())
        .args(["plan", "generate", "Build a todo app"])
        .status()
        .expect("devflow plan generate");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let output = devflow(temp.path())
        .arg("status")
        .output()
        .expect("devflow status");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(not locked)"), "{stdout}");
}

#[test]
fn destructive_command_is_blocked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = devflow(temp.path())
        .args(["hook", "pre-command", "git push --force origin main"])
        .output()
        .expect("devflow hook");
    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("destructive-git-denied"), "{stderr}");
}

#[test]
fn harmless_command_is_allowed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = devflow(temp.path())
        .args(["hook", "pre-command", "git status"])
        .status()
        .expect("devflow hook");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn edit_without_active_task_is_blocked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = devflow(temp.path())
        .args(["hook", "pre-edit", "src/lib.rs"])
        .status()
        .expect("devflow hook");
    assert_eq!(status.code(), Some(exit_codes::BLOCKED));
}

#[test]
fn tool_payload_is_read_from_stdin() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut child = devflow(temp.path())
        .args(["hook", "tool"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn devflow hook tool");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"{"tool_name":"Bash","tool_input":{"command":"git reset --hard HEAD~1"}}"#)
        .expect("write payload");
    let status = child.wait().expect("wait");
    assert_eq!(status.code(), Some(exit_codes::BLOCKED));
}
