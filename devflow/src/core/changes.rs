//! Structured change summaries for commit messages and pull request bodies.

use serde::Serialize;

use crate::core::types::StatusEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Classify a porcelain XY code. Staged (X) wins over worktree (Y).
    pub fn from_code(code: &str) -> Self {
        if code == "??" {
            return ChangeKind::Added;
        }
        let mut chars = code.chars();
        let index = chars.next().unwrap_or(' ');
        let worktree = chars.next().unwrap_or(' ');
        let effective = if index == ' ' { worktree } else { index };
        match effective {
            'A' => ChangeKind::Added,
            'D' => ChangeKind::Deleted,
            'R' | 'C' => ChangeKind::Renamed,
            _ => ChangeKind::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: String,
}

/// Changed files grouped by kind, sorted by path for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<String>,
}

impl ChangeSummary {
    pub fn from_entries(entries: &[StatusEntry]) -> Self {
        let mut summary = ChangeSummary::default();
        for entry in entries {
            let bucket = match ChangeKind::from_code(&entry.code) {
                ChangeKind::Added => &mut summary.added,
                ChangeKind::Modified => &mut summary.modified,
                ChangeKind::Deleted => &mut summary.deleted,
                ChangeKind::Renamed => &mut summary.renamed,
            };
            bucket.push(entry.path.clone());
        }
        for bucket in [
            &mut summary.added,
            &mut summary.modified,
            &mut summary.deleted,
            &mut summary.renamed,
        ] {
            bucket.sort();
            bucket.dedup();
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    pub fn file_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len() + self.renamed.len()
    }

    /// Flattened list in kind order, for templates.
    pub fn files(&self) -> Vec<FileChange> {
        let groups = [
            (ChangeKind::Added, &self.added),
            (ChangeKind::Modified, &self.modified),
            (ChangeKind::Deleted, &self.deleted),
            (ChangeKind::Renamed, &self.renamed),
        ];
        groups
            .into_iter()
            .flat_map(|(kind, paths)| {
                paths.iter().map(move |path| FileChange {
                    kind,
                    path: path.clone(),
                })
            })
            .collect()
    }
}
