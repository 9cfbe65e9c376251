use std::io::{IsTerminal, Write};

use crate::error::{IoResultExt, Result};
use crate::hash::{hash_to_hex, Hash};
use crate::index::Index;
use crate::repository::Repository;

/// Structured reconciliation of workspace, index, and HEAD tree.
#[derive(Debug, Default)]
pub struct StatusReport {
    /// Checked-out branch; `None` when HEAD is detached.
    pub branch: Option<String>,
    pub head: Option<Hash>,
    pub merging: bool,

    /// Indexed, never committed on the current HEAD's tree.
    pub staged_new: Vec<String>,
    /// Indexed, hash differs from HEAD's tree entry.
    pub staged_modified: Vec<String>,
    /// Present in HEAD's tree but absent from the index.
    pub staged_deleted: Vec<String>,

    /// Workspace content drifted from the index, not staged.
    pub unstaged_modified: Vec<String>,
    /// Indexed path missing from the workspace.
    pub unstaged_deleted: Vec<String>,

    pub untracked: Vec<String>,
    /// Paths still carrying conflict markers while a merge is pending.
    pub conflicts: Vec<String>,
}

impl StatusReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.staged_new.is_empty()
            && self.staged_modified.is_empty()
            && self.staged_deleted.is_empty()
            && self.unstaged_modified.is_empty()
            && self.unstaged_deleted.is_empty()
            && self.untracked.is_empty()
            && self.conflicts.is_empty()
    }
}

pub fn collect(repo: &Repository) -> Result<StatusReport> {
    let _span = tracing::debug_span!("status").entered();

    let head = repo.head()?;
    let head_commit = head.commit();
    let head_map = repo.flatten_commit_tree(head_commit.as_ref())?;

    // An empty (just-committed) index reads as the HEAD baseline.
    let index = Index::load_effective(repo)?;
    let changes = index.changes(&repo.root, &repo.ignore);

    let mut report = StatusReport {
        branch: head.branch().map(ToOwned::to_owned),
        head: head_commit,
        merging: repo.merge_head()?.is_some(),
        unstaged_modified: changes.modified,
        unstaged_deleted: changes.deleted,
        untracked: changes.untracked,
        ..StatusReport::default()
    };

    for entry in &index {
        match head_map.get(entry.path) {
            None => report.staged_new.push(entry.path.to_owned()),
            Some(item) if item.hash != *entry.hash => {
                report.staged_modified.push(entry.path.to_owned());
            }
            Some(_) => {}
        }
    }
    for path in head_map.keys() {
        if index.find(path).is_none() {
            report.staged_deleted.push(path.clone());
        }
    }

    if report.merging {
        // Conflicted paths are surfaced in their own section only.
        let conflicts = index.conflicted_paths();
        report.staged_modified.retain(|p| !conflicts.contains(p));
        report.staged_new.retain(|p| !conflicts.contains(p));
        report.conflicts = conflicts;
    }

    report.staged_new.sort_unstable();
    report.staged_modified.sort_unstable();
    report.staged_deleted.sort_unstable();

    Ok(report)
}

//
//
// Output: sections, optional color
//
//

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn stdout_is_tty() -> bool {
    std::io::stdout().is_terminal()
}

fn section_header(f: &mut (impl Write + ?Sized), title: &str) -> std::io::Result<()> {
    if stdout_is_tty() {
        writeln!(f, "{BOLD}{title}{RESET}")
    } else {
        writeln!(f, "{title}")
    }
}

fn path_line(
    f: &mut (impl Write + ?Sized),
    color: &str,
    label: &str,
    path: &str,
) -> std::io::Result<()> {
    if stdout_is_tty() {
        writeln!(f, "    {color}{label}{path}{RESET}")
    } else {
        writeln!(f, "    {label}{path}")
    }
}

pub fn render(report: &StatusReport, out: &mut (impl Write + ?Sized)) -> std::io::Result<()> {
    match (&report.branch, report.head) {
        (Some(branch), _) => writeln!(out, "On branch {branch}")?,
        (None, Some(hash)) => writeln!(out, "HEAD detached at {}", &hash_to_hex(&hash)[..8])?,
        (None, None) => writeln!(out, "Not currently on any branch")?,
    }

    if report.merging {
        writeln!(out, "A merge is in progress; fix conflicts and commit")?;
    }
    writeln!(out)?;

    let has_staged = !report.staged_new.is_empty()
        || !report.staged_modified.is_empty()
        || !report.staged_deleted.is_empty();
    let has_unstaged =
        !report.unstaged_modified.is_empty() || !report.unstaged_deleted.is_empty();

    if !report.conflicts.is_empty() {
        section_header(out, "Unmerged paths:")?;
        for p in &report.conflicts {
            path_line(out, RED, "both modified:   ", p)?;
        }
        writeln!(out)?;
    }

    if has_staged {
        section_header(out, "Changes to be committed:")?;
        for p in &report.staged_new {
            path_line(out, GREEN, "new file:   ", p)?;
        }
        for p in &report.staged_modified {
            path_line(out, GREEN, "modified:   ", p)?;
        }
        for p in &report.staged_deleted {
            path_line(out, RED, "deleted:    ", p)?;
        }
        writeln!(out)?;
    }

    if has_unstaged {
        section_header(out, "Changes not staged for commit:")?;
        for p in &report.unstaged_modified {
            path_line(out, YELLOW, "modified:   ", p)?;
        }
        for p in &report.unstaged_deleted {
            path_line(out, RED, "deleted:    ", p)?;
        }
        writeln!(out)?;
    }

    if !report.untracked.is_empty() {
        section_header(out, "Untracked files:")?;
        for p in &report.untracked {
            path_line(out, "", "", p)?;
        }
        writeln!(out)?;
    }

    if report.is_clean() {
        writeln!(out, "nothing to commit, working tree clean")?;
    }

    Ok(())
}

pub fn status(repo: &Repository) -> Result<()> {
    let report = collect(repo)?;
    render(&report, &mut std::io::stdout()).with_path(&repo.root)?;
    Ok(())
}
