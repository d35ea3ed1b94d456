//! Two-phase gate around tool actions.
//!
//! Pre-action validators decide whether an edit or shell command may happen at
//! all; post-action validators decide whether finished work (a commit) is
//! accepted. Validators run in a fixed order and the first block wins: later
//! validators are not consulted.

pub mod payload;
pub mod validators;

use std::cell::OnceCell;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::types::GuardOutcome;
use crate::error::{FlowError, Result};
use crate::io::config::Settings;
use crate::io::guards::{TestRequest, TestRunner};
use crate::tracker::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

/// The action being gated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create or modify a file; `path` is relative to the repository root
    /// unless it points outside it.
    EditFile { path: String },
    RunCommand { command: String },
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block(String),
}

pub trait Validator {
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    fn check(&self, ctx: &HookContext<'_>) -> Verdict;
}

/// State the validators consult. Gathered once per pipeline evaluation.
pub struct HookContext<'a> {
    pub action: Action,
    pub active_task: Option<Task>,
    pub branch: Option<String>,
    pub changed_files: Vec<String>,
    pub workdir: PathBuf,
    pub settings: &'a Settings,
    tests: Option<(&'a dyn TestRunner, TestRequest)>,
    test_outcome: OnceCell<GuardOutcome>,
}

impl<'a> HookContext<'a> {
    pub fn new(action: Action, workdir: impl Into<PathBuf>, settings: &'a Settings) -> Self {
        Self {
            action,
            active_task: None,
            branch: None,
            changed_files: Vec::new(),
            workdir: workdir.into(),
            settings,
            tests: None,
            test_outcome: OnceCell::new(),
        }
    }

    pub fn with_active_task(mut self, task: Option<Task>) -> Self {
        self.active_task = task;
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_changed_files(mut self, files: Vec<String>) -> Self {
        self.changed_files = files;
        self
    }

    pub fn with_tests(mut self, runner: &'a dyn TestRunner, request: TestRequest) -> Self {
        self.tests = Some((runner, request));
        self
    }

    /// Outcome of the configured test command, run at most once.
    ///
    /// A runner error counts as a failure: the commit must not be accepted.
    pub fn test_outcome(&self) -> GuardOutcome {
        *self.test_outcome.get_or_init(|| match &self.tests {
            None => GuardOutcome::Skipped,
            Some((runner, request)) => runner.run(request).unwrap_or_else(|err| {
                warn!(error = %err, "test runner failed");
                GuardOutcome::Fail
            }),
        })
    }

    /// Whether `path` is in a location that never needs an active task.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.settings
            .hooks
            .exempt_paths
            .iter()
            .any(|prefix| path_has_prefix(path, prefix))
    }
}

/// Outcome of a pipeline evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Allowed,
    Blocked { validator: String, reason: String },
}

impl PipelineOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PipelineOutcome::Allowed)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            PipelineOutcome::Allowed => Ok(()),
            PipelineOutcome::Blocked { validator, reason } => {
                Err(FlowError::HookBlocked { validator, reason })
            }
        }
    }
}

/// Ordered validator chain.
pub struct Pipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl Pipeline {
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// The standard chain, in evaluation order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(validators::ActiveTaskRequired),
            Box::new(validators::AllowedDirectories),
            Box::new(validators::DestructiveGitDenied),
            Box::new(validators::TestsMustPass),
            Box::new(validators::UiComponentCompanions),
        ])
    }

    pub fn names(&self, phase: Phase) -> Vec<&'static str> {
        self.validators
            .iter()
            .filter(|v| v.phase() == phase)
            .map(|v| v.name())
            .collect()
    }

    /// Run the validators of `phase` until one blocks.
    pub fn run(&self, phase: Phase, ctx: &HookContext<'_>) -> PipelineOutcome {
        for validator in self.validators.iter().filter(|v| v.phase() == phase) {
            match validator.check(ctx) {
                Verdict::Allow => debug!(validator = validator.name(), "allowed"),
                Verdict::Block(reason) => {
                    info!(validator = validator.name(), %reason, "blocked");
                    return PipelineOutcome::Blocked {
                        validator: validator.name().to_string(),
                        reason,
                    };
                }
            }
        }
        PipelineOutcome::Allowed
    }
}

/// Express `path` relative to `workdir` with `/` separators.
///
/// Relative inputs are cleaned of `./`; absolute paths outside `workdir` are
/// returned unchanged so validators can reject them.
pub fn relative_to(workdir: &Path, path: &str) -> String {
    let candidate = Path::new(path);
    let relative = if candidate.is_absolute() {
        match candidate.strip_prefix(workdir) {
            Ok(rel) => rel,
            Err(_) => return path.to_string(),
        }
    } else {
        candidate
    };
    relative
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// True if `path` is `prefix` itself or lies beneath it.
///
/// Prefixes ending in `/` are directories; others match a file or directory
/// of that exact name.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let dir = prefix.trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fixed {
        name: &'static str,
        phase: Phase,
        verdict: Verdict,
        calls: Cell<usize>,
    }

    impl Validator for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn check(&self, _ctx: &HookContext<'_>) -> Verdict {
            self.calls.set(self.calls.get() + 1);
            self.verdict.clone()
        }
    }

    struct CountingRunner {
        runs: Cell<usize>,
    }

    impl TestRunner for CountingRunner {
        fn run(&self, _request: &TestRequest) -> anyhow::Result<GuardOutcome> {
            self.runs.set(self.runs.get() + 1);
            Ok(GuardOutcome::Pass)
        }
    }

    #[test]
    fn first_block_short_circuits() {
        use std::rc::Rc;

        struct Shared(Rc<Fixed>);
        impl Validator for Shared {
            fn name(&self) -> &'static str {
                self.0.name()
            }
            fn phase(&self) -> Phase {
                self.0.phase()
            }
            fn check(&self, ctx: &HookContext<'_>) -> Verdict {
                self.0.check(ctx)
            }
        }

        let fixed = |name, verdict| {
            Rc::new(Fixed {
                name,
                phase: Phase::Pre,
                verdict,
                calls: Cell::new(0),
            })
        };
        let first = fixed("first", Verdict::Allow);
        let second = fixed("second", Verdict::Block("nope".to_string()));
        let third = fixed("third", Verdict::Allow);
        let pipeline = Pipeline::new(vec![
            Box::new(Shared(first.clone())),
            Box::new(Shared(second.clone())),
            Box::new(Shared(third.clone())),
        ]);

        let settings = Settings::default();
        let ctx = HookContext::new(Action::Commit, "/repo", &settings);
        assert_eq!(
            pipeline.run(Phase::Pre, &ctx),
            PipelineOutcome::Blocked {
                validator: "second".to_string(),
                reason: "nope".to_string()
            }
        );
        assert_eq!(first.calls.get(), 1);
        assert_eq!(second.calls.get(), 1);
        assert_eq!(third.calls.get(), 0);

        assert_eq!(pipeline.run(Phase::Post, &ctx), PipelineOutcome::Allowed);
    }

    #[test]
    fn standard_pipeline_order() {
        let pipeline = Pipeline::standard();
        assert_eq!(
            pipeline.names(Phase::Pre),
            vec![
                "active-task-required",
                "allowed-directories",
                "destructive-git-denied"
            ]
        );
        assert_eq!(
            pipeline.names(Phase::Post),
            vec!["tests-must-pass", "ui-component-companions"]
        );
    }

    #[test]
    fn test_outcome_is_computed_once() {
        let settings = Settings::default();
        let runner = CountingRunner { runs: Cell::new(0) };
        let request = TestRequest {
            command: vec!["true".to_string()],
            workdir: PathBuf::from("/repo"),
            log_path: PathBuf::from("/repo/.devflow/logs/tests.log"),
            timeout: std::time::Duration::from_secs(1),
            output_limit_bytes: 10,
        };
        let ctx = HookContext::new(Action::Commit, "/repo", &settings).with_tests(&runner, request);
        assert_eq!(ctx.test_outcome(), GuardOutcome::Pass);
        assert_eq!(ctx.test_outcome(), GuardOutcome::Pass);
        assert_eq!(runner.runs.get(), 1);
    }

    #[test]
    fn paths_are_made_relative() {
        let root = Path::new("/repo");
        assert_eq!(relative_to(root, "/repo/src/lib.rs"), "src/lib.rs");
        assert_eq!(relative_to(root, "./src/lib.rs"), "src/lib.rs");
        assert_eq!(relative_to(root, "/etc/passwd"), "/etc/passwd");
        assert_eq!(relative_to(root, "../other/x"), "../other/x");
    }

    #[test]
    fn prefix_matching_respects_boundaries() {
        assert!(path_has_prefix("docs/guide.md", "docs/"));
        assert!(path_has_prefix("README.md", "README.md"));
        assert!(!path_has_prefix("docsite/index.md", "docs/"));
        assert!(!path_has_prefix("README.md.bak", "README.md"));
    }
}
