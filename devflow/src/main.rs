//! `devflow` command-line entry point.
//!
//! Command results go to stdout; errors are rendered from
//! [`FlowError::report`] on stderr. Hook commands follow the agent hook
//! protocol: exit 0 allows, exit 2 blocks with the reason on stderr.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};

use devflow::commit::{CommitMode, run_commit};
use devflow::core::issue_format::issue_title;
use devflow::exit_codes;
use devflow::hooks::payload::parse_tool_payload;
use devflow::hooks::{Action, Phase, Pipeline, PipelineOutcome};
use devflow::io::guards::{CommandTestRunner, TestRunner};
use devflow::io::tracker_store::TrackerStore;
use devflow::logging;
use devflow::plan::{generate_plan, lock_plan};
use devflow::status::collect_status;
use devflow::task::StartOutcome;
use devflow::validate::{PlanValidation, validate_workflow};
use devflow::workflow::Workflow;
use devflow::{FlowError, Result};

#[derive(Parser)]
#[command(
    name = "devflow",
    version,
    about = "Task-lifecycle workflow engine for AI-assisted development"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate and lock project plans.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    /// Move tasks through their lifecycle.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Complete the active task, commit, push and open a pull request.
    Commit,
    /// Return to trunk once the current topic branch is merged.
    Sync,
    /// Print plan progress. Always exits 0.
    Status,
    /// Check the tracker against its schema, invariants and locked plan.
    Validate,
    /// Manage issues on the hosting platform.
    Issues {
        #[command(subcommand)]
        command: IssuesCommand,
    },
    /// Run the validator pipeline for an agent action.
    Hook {
        #[command(subcommand)]
        command: HookCommand,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Record requirements under a new active plan.
    Generate { requirements: String },
    /// Validate the plan specification and freeze it into a task tracker.
    Lock {
        /// Plan id (default: the active plan).
        #[arg(long)]
        plan: Option<String>,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Start the next task whose dependencies are completed.
    Next,
    Start { id: String },
    Block {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Return a blocked task to pending.
    Unblock { id: String },
}

#[derive(Subcommand)]
enum IssuesCommand {
    /// Create missing issues and refresh labels for every task.
    Sync,
}

#[derive(Subcommand)]
enum HookCommand {
    /// Before editing files.
    PreEdit {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Before running a shell command.
    PreCommand { command: String },
    /// Commit gate: runs the configured test command.
    PreCommit,
    /// Tool-use payload as JSON on stdin.
    Tool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err.report());
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(command: Command) -> Result<i32> {
    let root = std::env::current_dir().map_err(|err| FlowError::io(".", err))?;
    if let Command::Status = command {
        return Ok(cmd_status(root));
    }

    let wf = Workflow::load(root)?;
    match command {
        Command::Plan { command } => cmd_plan(&wf, command),
        Command::Task { command } => cmd_task(&wf, command),
        Command::Commit => cmd_commit(&wf),
        Command::Sync => cmd_sync(&wf),
        Command::Status => Ok(cmd_status(wf.root().to_path_buf())),
        Command::Validate => cmd_validate(&wf),
        Command::Issues {
            command: IssuesCommand::Sync,
        } => cmd_issues_sync(&wf),
        Command::Hook { command } => cmd_hook(&wf, command),
    }
}

fn cmd_plan(wf: &Workflow, command: PlanCommand) -> Result<i32> {
    let plans = wf.plans();
    match command {
        PlanCommand::Generate { requirements } => {
            let outcome = generate_plan(&plans, &requirements, Utc::now())?;
            println!("Generated plan {}", outcome.plan_id);
            println!("Requirements: {}", wf.paths().relative(&outcome.requirements_path));
            println!(
                "Write the plan specification to {}, then run `devflow plan lock`.",
                wf.paths().relative(&outcome.spec_path)
            );
        }
        PlanCommand::Lock { plan } => {
            let outcome = lock_plan(&plans, plan.as_deref(), &wf.project_name(), Utc::now())?;
            println!(
                "Locked plan {} ({}, {} tasks)",
                outcome.plan_id, outcome.project_name, outcome.task_count
            );
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_task(wf: &Workflow, command: TaskCommand) -> Result<i32> {
    let lifecycle = wf.lifecycle()?;
    match command {
        TaskCommand::Next => print_started(&lifecycle.start_next(Utc::now())?),
        TaskCommand::Start { id } => print_started(&lifecycle.start(&id, Utc::now())?),
        TaskCommand::Block { id, reason } => {
            let task = lifecycle.block(&id, &reason)?;
            println!("Blocked {}: {reason}", task.id);
        }
        TaskCommand::Unblock { id } => {
            let task = lifecycle.unblock(&id)?;
            println!("Unblocked {}; it is pending again", task.id);
        }
    }
    Ok(exit_codes::OK)
}

fn print_started(outcome: &StartOutcome) {
    println!("Started {}", issue_title(&outcome.task));
    if let Some(branch) = &outcome.branch {
        println!("Branch: {branch}");
    }
    if let Some(issue) = outcome.task.github_issue.as_ref() {
        println!("Issue: #{} {}", issue.number, issue.url);
    }
    for criterion in &outcome.task.completion_criteria {
        println!("  - {criterion}");
    }
}

fn cmd_commit(wf: &Workflow) -> Result<i32> {
    let outcome = run_commit(wf, &CommandTestRunner, Utc::now())?;
    match (&outcome.mode, &outcome.task) {
        (CommitMode::Fallback, _) | (_, None) => {
            println!("Committed changes on {}", outcome.branch);
        }
        (_, Some(task)) => println!("Completed {}", issue_title(task)),
    }
    if let Some(commit) = &outcome.commit {
        println!("Commit: {commit}");
    }
    if outcome.pushed {
        println!("Pushed {}", outcome.branch);
    }
    if let Some(pr) = &outcome.pull_request {
        println!("Pull request: #{} {}", pr.number, pr.url);
    }
    Ok(exit_codes::OK)
}

fn cmd_sync(wf: &Workflow) -> Result<i32> {
    let outcome = wf.branches().sync(wf.hosting())?;
    match &outcome.deleted {
        Some(branch) => println!("Merged {branch}; back on {}", outcome.trunk),
        None => println!("On {}", outcome.trunk),
    }
    if !outcome.pulled {
        println!("No remote configured; trunk was not pulled.");
    }
    Ok(exit_codes::OK)
}

fn cmd_status(root: PathBuf) -> i32 {
    match Workflow::load(root) {
        Ok(wf) => println!("{}", collect_status(&wf)),
        Err(err) => println!("{}", err.report()),
    }
    exit_codes::OK
}

fn cmd_validate(wf: &Workflow) -> Result<i32> {
    match validate_workflow(wf)? {
        PlanValidation::Unlocked {
            plan_id,
            task_count,
        } => println!("Plan {plan_id} is valid and not locked ({task_count} tasks)"),
        PlanValidation::Locked {
            plan_id,
            task_count,
            active_task,
        } => {
            println!("Plan {plan_id} is valid ({task_count} tasks)");
            if let Some(active) = active_task {
                println!("Active task: {active}");
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_issues_sync(wf: &Workflow) -> Result<i32> {
    let issues = wf.issue_sync();
    if !issues.is_enabled() {
        println!("Issue sync is disabled (no hosting client, or issues.enabled = false).");
        return Ok(exit_codes::OK);
    }

    let store = wf.tracker_store()?;
    let tracker = store.load()?;
    let report = issues.sync_all(&tracker);
    if !report.created.is_empty() {
        store.update(|tracker| {
            for (task_id, issue) in &report.created {
                if let Some(task) = tracker.find_mut(task_id) {
                    task.github_issue = Some(issue.clone());
                }
            }
            Ok(())
        })?;
    }

    for (task_id, issue) in &report.created {
        println!("Created #{} for {task_id}", issue.number);
    }
    println!("Relabeled {} issues", report.relabeled);
    if !report.skipped.is_empty() {
        println!("Skipped completed tasks: {}", report.skipped.join(", "));
    }
    if report.failed.is_empty() {
        return Ok(exit_codes::OK);
    }
    eprintln!("Failed to sync: {}", report.failed.join(", "));
    Ok(exit_codes::INVALID)
}

fn cmd_hook(wf: &Workflow, command: HookCommand) -> Result<i32> {
    match command {
        HookCommand::PreEdit { paths } => {
            for path in paths {
                let code = run_hook(wf, Phase::Pre, Action::EditFile { path }, None)?;
                if code != exit_codes::OK {
                    return Ok(code);
                }
            }
            Ok(exit_codes::OK)
        }
        HookCommand::PreCommand { command } => {
            run_hook(wf, Phase::Pre, Action::RunCommand { command }, None)
        }
        HookCommand::PreCommit => run_hook(wf, Phase::Post, Action::Commit, Some(&CommandTestRunner)),
        HookCommand::Tool => {
            let raw = std::io::read_to_string(std::io::stdin())
                .map_err(|err| FlowError::io("<stdin>", err))?;
            match parse_tool_payload(&raw)? {
                Some(action) => run_hook(wf, Phase::Pre, action, None),
                None => Ok(exit_codes::OK),
            }
        }
    }
}

fn run_hook(
    wf: &Workflow,
    phase: Phase,
    action: Action,
    tests: Option<&dyn TestRunner>,
) -> Result<i32> {
    let mut ctx = wf.hook_context(action)?;
    if let Some(runner) = tests {
        ctx = ctx.with_tests(runner, wf.test_request());
    }
    match Pipeline::standard().run(phase, &ctx) {
        PipelineOutcome::Allowed => Ok(exit_codes::OK),
        PipelineOutcome::Blocked { validator, reason } => {
            eprintln!("blocked by {validator}: {reason}");
            Ok(exit_codes::BLOCKED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_task_block_requires_reason() {
        assert!(Cli::try_parse_from(["devflow", "task", "block", "TASK-001"]).is_err());
        let cli = Cli::parse_from(["devflow", "task", "block", "TASK-001", "--reason", "waiting"]);
        assert!(matches!(
            cli.command,
            Command::Task {
                command: TaskCommand::Block { ref reason, .. }
            } if reason == "waiting"
        ));
    }

    #[test]
    fn parse_plan_lock_with_plan() {
        let cli = Cli::parse_from(["devflow", "plan", "lock", "--plan", "plan-1"]);
        assert!(matches!(
            cli.command,
            Command::Plan {
                command: PlanCommand::Lock { plan: Some(ref id) }
            } if id == "plan-1"
        ));
    }

    #[test]
    fn parse_pre_edit_requires_paths() {
        assert!(Cli::try_parse_from(["devflow", "hook", "pre-edit"]).is_err());
        let cli = Cli::parse_from(["devflow", "hook", "pre-edit", "a.rs", "b.rs"]);
        assert!(matches!(
            cli.command,
            Command::Hook {
                command: HookCommand::PreEdit { ref paths }
            } if paths.len() == 2
        ));
    }

    #[test]
    fn parse_issues_sync() {
        let cli = Cli::parse_from(["devflow", "issues", "sync"]);
        assert!(matches!(
            cli.command,
            Command::Issues {
                command: IssuesCommand::Sync
            }
        ));
    }
}
