//! Test-command runner for the commit gate.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::GuardOutcome;

#[derive(Debug, Clone)]
pub struct TestRequest {
    /// Program and arguments; empty means no tests are configured.
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait TestRunner {
    fn run(&self, request: &TestRequest) -> Result<GuardOutcome>;
}

/// Runs the configured command as a subprocess, bounded by the timeout.
pub struct CommandTestRunner;

impl TestRunner for CommandTestRunner {
    #[instrument(skip_all)]
    fn run(&self, request: &TestRequest) -> Result<GuardOutcome> {
        let Some((program, args)) = request.command.split_first() else {
            debug!("no test command configured");
            return Ok(GuardOutcome::Skipped);
        };

        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create test log dir {}", parent.display()))?;
        }
        // Output goes straight to the log file so a chatty test suite cannot
        // fill a pipe and stall the wait below.
        let log = File::create(&request.log_path)
            .with_context(|| format!("create test log {}", request.log_path.display()))?;
        let log_err = log.try_clone().context("clone test log handle")?;

        debug!(program = %program, "running test command");
        let mut child = match Command::new(program)
            .args(args)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %program, error = %err, "test command could not start");
                fs::write(&request.log_path, format!("failed to spawn {program}: {err}\n"))
                    .with_context(|| format!("write test log {}", request.log_path.display()))?;
                return Ok(GuardOutcome::Fail);
            }
        };

        let status = match child
            .wait_timeout(request.timeout)
            .context("wait for test command")?
        {
            Some(status) => status,
            None => {
                child.kill().context("kill test command")?;
                child.wait().context("wait test command")?;
                warn!(timeout_secs = request.timeout.as_secs(), "test command timed out");
                append_note(&request.log_path, "test command timed out")?;
                truncate_log(&request.log_path, request.output_limit_bytes)?;
                return Ok(GuardOutcome::Fail);
            }
        };

        truncate_log(&request.log_path, request.output_limit_bytes)?;
        if status.success() {
            Ok(GuardOutcome::Pass)
        } else {
            debug!(code = ?status.code(), "test command failed");
            Ok(GuardOutcome::Fail)
        }
    }
}

fn append_note(path: &Path, note: &str) -> Result<()> {
    let mut contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    contents.extend_from_slice(format!("\n[{note}]\n").as_bytes());
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn truncate_log(path: &Path, output_limit: usize) -> Result<()> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("read {}", path.display()))?;
    if buf.len() <= output_limit {
        return Ok(());
    }
    let mut truncated = String::from_utf8_lossy(&buf[..output_limit]).into_owned();
    truncated.push_str(&format!(
        "\n[truncated {} bytes]\n",
        buf.len() - output_limit
    ));
    fs::write(path, truncated).with_context(|| format!("write {}", path.display()))
}
