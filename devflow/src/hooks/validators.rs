//! The standard validator chain.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;

use super::{Action, HookContext, Phase, Validator, Verdict, path_has_prefix};
use crate::core::types::GuardOutcome;

/// Source edits need an in-progress task, unless the path is exempt.
pub struct ActiveTaskRequired;

impl Validator for ActiveTaskRequired {
    fn name(&self) -> &'static str {
        "active-task-required"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    fn check(&self, ctx: &HookContext<'_>) -> Verdict {
        let Action::EditFile { path } = &ctx.action else {
            return Verdict::Allow;
        };
        if ctx.active_task.is_some() || ctx.is_exempt(path) {
            return Verdict::Allow;
        }
        Verdict::Block(format!(
            "no task is in progress; run `devflow task next` before editing {path}"
        ))
    }
}

/// Edits stay inside the repository and, when configured, inside the allowed
/// directories.
pub struct AllowedDirectories;

impl Validator for AllowedDirectories {
    fn name(&self) -> &'static str {
        "allowed-directories"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    fn check(&self, ctx: &HookContext<'_>) -> Verdict {
        let Action::EditFile { path } = &ctx.action else {
            return Verdict::Allow;
        };
        if escapes_root(path) {
            return Verdict::Block(format!("{path} is outside the repository"));
        }
        let allowed = &ctx.settings.hooks.allowed_dirs;
        if allowed.is_empty()
            || ctx.is_exempt(path)
            || allowed.iter().any(|dir| path_has_prefix(path, dir))
        {
            return Verdict::Allow;
        }
        Verdict::Block(format!(
            "{path} is not under an allowed directory ({})",
            allowed.join(", ")
        ))
    }
}

fn escapes_root(path: &str) -> bool {
    let path = Path::new(path);
    path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

/// `git`, then any global options, then the subcommand.
const GIT: &str = r"\bgit(?:\s+[^\s;&|]+)*?\s+";
/// Arguments up to the end of the current shell command.
const ARGS: &str = r"[^;&|]*";

struct Rule {
    pattern: Regex,
    description: &'static str,
}

static DESTRUCTIVE_GIT: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |subcommand: &str, tail: &str, description| Rule {
        pattern: Regex::new(&format!(r"{GIT}{subcommand}\b{ARGS}{tail}"))
            .expect("destructive git pattern should compile"),
        description,
    };
    vec![
        rule(
            "push",
            r"\s(?:--force(?:-with-lease)?\b|-f\b|\+[^\s;&|]+)",
            "force push rewrites remote history",
        ),
        rule("reset", r"\s--hard\b", "hard reset discards local work"),
        rule(
            "clean",
            r"\s(?:-[a-zA-Z]*f[a-zA-Z]*\b|--force\b)",
            "forced clean deletes untracked files",
        ),
        rule(
            "branch",
            r"\s(?:-D\b|--delete\s+--force\b|--force\s+--delete\b)",
            "forced branch delete drops unmerged commits",
        ),
        rule(
            "(?:checkout|restore)",
            r"\s(?:--\s+)?\.(?:\s|$)",
            "discarding the whole working tree loses local work",
        ),
    ]
});

/// Return the description of the first destructive git invocation in
/// `command`, if any.
pub fn destructive_git(command: &str) -> Option<&'static str> {
    DESTRUCTIVE_GIT
        .iter()
        .find(|rule| rule.pattern.is_match(command))
        .map(|rule| rule.description)
}

/// Shell commands may not run history-destroying git subcommands.
pub struct DestructiveGitDenied;

impl Validator for DestructiveGitDenied {
    fn name(&self) -> &'static str {
        "destructive-git-denied"
    }

    fn phase(&self) -> Phase {
        Phase::Pre
    }

    fn check(&self, ctx: &HookContext<'_>) -> Verdict {
        let Action::RunCommand { command } = &ctx.action else {
            return Verdict::Allow;
        };
        match destructive_git(command) {
            Some(description) => Verdict::Block(format!("`{}` denied: {description}", command.trim())),
            None => Verdict::Allow,
        }
    }
}

/// A commit is accepted only when the configured test command passes.
pub struct TestsMustPass;

impl Validator for TestsMustPass {
    fn name(&self) -> &'static str {
        "tests-must-pass"
    }

    fn phase(&self) -> Phase {
        Phase::Post
    }

    fn check(&self, ctx: &HookContext<'_>) -> Verdict {
        if ctx.action != Action::Commit {
            return Verdict::Allow;
        }
        match ctx.test_outcome() {
            GuardOutcome::Pass | GuardOutcome::Skipped => Verdict::Allow,
            GuardOutcome::Fail => Verdict::Block(format!(
                "`{}` failed; see .devflow/logs/tests.log",
                ctx.settings.hooks.test_command.join(" ")
            )),
        }
    }
}

/// Changed UI components need a test file and a story file beside them.
pub struct UiComponentCompanions;

impl Validator for UiComponentCompanions {
    fn name(&self) -> &'static str {
        "ui-component-companions"
    }

    fn phase(&self) -> Phase {
        Phase::Post
    }

    fn check(&self, ctx: &HookContext<'_>) -> Verdict {
        if ctx.action != Action::Commit {
            return Verdict::Allow;
        }
        let hooks = &ctx.settings.hooks;
        let mut problems = Vec::new();
        for path in &ctx.changed_files {
            if !hooks
                .ui_component_dirs
                .iter()
                .any(|dir| path_has_prefix(path, dir))
            {
                continue;
            }
            let Some(component) = ComponentFile::parse(path, &hooks.ui_extensions) else {
                continue;
            };
            // Deleted components need nothing.
            if !ctx.workdir.join(path).is_file() {
                continue;
            }
            let missing = component.missing_companions(&ctx.workdir);
            if !missing.is_empty() {
                problems.push(format!("{path} needs {}", missing.join(" and ")));
            }
        }
        if problems.is_empty() {
            Verdict::Allow
        } else {
            Verdict::Block(problems.join("; "))
        }
    }
}

const COMPANION_MARKERS: [&str; 3] = ["test", "spec", "stories"];
const TEST_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

/// A UI component source file split into directory, stem and extension.
#[derive(Debug, PartialEq, Eq)]
struct ComponentFile<'a> {
    dir: &'a str,
    stem: &'a str,
    extension: &'a str,
}

impl<'a> ComponentFile<'a> {
    /// `None` for non-component files and for companions themselves.
    fn parse(path: &'a str, extensions: &[String]) -> Option<Self> {
        let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
        let (stem, extension) = file.rsplit_once('.')?;
        if stem.is_empty() || !extensions.iter().any(|e| e == extension) {
            return None;
        }
        let is_companion = stem
            .rsplit_once('.')
            .is_some_and(|(_, marker)| COMPANION_MARKERS.contains(&marker));
        if is_companion {
            return None;
        }
        Some(Self {
            dir,
            stem,
            extension,
        })
    }

    fn candidates(&self, markers: &[&str]) -> Vec<String> {
        let mut names = Vec::new();
        for marker in markers {
            names.push(format!("{}.{marker}.{}", self.stem, self.extension));
            for ext in TEST_EXTENSIONS {
                if ext != self.extension {
                    names.push(format!("{}.{marker}.{ext}", self.stem));
                }
            }
        }
        names
    }

    fn has_any(&self, root: &Path, markers: &[&str], include_tests_dir: bool) -> bool {
        let dir = root.join(self.dir);
        self.candidates(markers).iter().any(|name| {
            dir.join(name).is_file() || (include_tests_dir && dir.join("__tests__").join(name).is_file())
        })
    }

    fn missing_companions(&self, root: &Path) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.has_any(root, &["test", "spec"], true) {
            missing.push(format!("{}.test.{}", self.stem, self.extension));
        }
        if !self.has_any(root, &["stories"], false) {
            missing.push(format!("{}.stories.{}", self.stem, self.extension));
        }
        missing
    }
}
