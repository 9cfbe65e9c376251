//! Line-level diff: a deterministic bounded-window edit script plus
//! unified formatting with context trimming. Not an optimal LCS; the
//! guarantees are degeneracy on equal inputs and deterministic output.

use std::io::{BufWriter, IsTerminal, Write};

use crate::error::{IoResultExt, Result};
use crate::index::Index;
use crate::object::blob_object_hash;
use crate::repository::Repository;

pub const DEFAULT_CONTEXT: usize = 3;

/// How far the resync search looks ahead on each side before falling
/// back to a one-line modify.
const LOOKAHEAD: usize = 10;

const BINARY_SNIFF_LEN: usize = 8192;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Same,
    Delete,
    Add,
}

#[derive(Debug, Clone, Copy)]
pub struct Edit<'a> {
    pub kind: EditKind,
    pub line: &'a str,
}

/// Split on `\r?\n`. A trailing newline yields a trailing empty line on
/// both sides symmetrically, so it never shows up as a phantom change.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

/// Two-cursor edit script. Equal lines stream through; on a mismatch a
/// bounded two-dimensional window is searched for the nearest resync
/// pair, and when none exists within it the lines are treated as a
/// one-line modify.
#[must_use]
pub fn diff_lines<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let mut edits = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);

    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            edits.push(Edit {
                kind: EditKind::Same,
                line: old[i],
            });
            i += 1;
            j += 1;
            continue;
        }

        // Nearest matching pair (i+a, j+b), minimizing skipped lines;
        // ties prefer fewer deletions.
        let mut best: Option<(usize, usize)> = None;
        for a in 0..=LOOKAHEAD {
            for b in 0..=LOOKAHEAD {
                if a == 0 && b == 0 {
                    continue;
                }
                let (oi, nj) = (i + a, j + b);
                if oi < old.len() && nj < new.len() && old[oi] == new[nj] {
                    let better = match best {
                        None => true,
                        Some((ba, bb)) => a + b < ba + bb || (a + b == ba + bb && a < ba),
                    };
                    if better {
                        best = Some((a, b));
                    }
                }
            }
        }

        match best {
            Some((a, b)) => {
                for line in &old[i..i + a] {
                    edits.push(Edit {
                        kind: EditKind::Delete,
                        line,
                    });
                }
                for line in &new[j..j + b] {
                    edits.push(Edit {
                        kind: EditKind::Add,
                        line,
                    });
                }
                i += a;
                j += b;
                // The resync head itself emits as `Same` next iteration.
            }
            None => {
                edits.push(Edit {
                    kind: EditKind::Delete,
                    line: old[i],
                });
                edits.push(Edit {
                    kind: EditKind::Add,
                    line: new[j],
                });
                i += 1;
                j += 1;
            }
        }
    }

    while i < old.len() {
        edits.push(Edit {
            kind: EditKind::Delete,
            line: old[i],
        });
        i += 1;
    }
    while j < new.len() {
        edits.push(Edit {
            kind: EditKind::Add,
            line: new[j],
        });
        j += 1;
    }

    edits
}

/// Unified rendering of an edit script: up to `context` unchanged lines
/// around each change region; regions separated by more than
/// `2 * context` unchanged lines get their own `@@` hunk.
#[must_use]
pub fn unified(before: &str, after: &str, context: usize, color: bool) -> String {
    let old = split_lines(before);
    let new = split_lines(after);
    let edits = diff_lines(&old, &new);

    let mut out = String::new();

    // Line numbers carried by each edit (1-based, git convention).
    let mut numbered = Vec::with_capacity(edits.len());
    let (mut old_no, mut new_no) = (1usize, 1usize);
    for edit in &edits {
        numbered.push((*edit, old_no, new_no));
        match edit.kind {
            EditKind::Same => {
                old_no += 1;
                new_no += 1;
            }
            EditKind::Delete => old_no += 1,
            EditKind::Add => new_no += 1,
        }
    }

    let changes: Vec<usize> = numbered
        .iter()
        .enumerate()
        .filter(|(_, (e, _, _))| e.kind != EditKind::Same)
        .map(|(idx, _)| idx)
        .collect();
    if changes.is_empty() {
        return out;
    }

    // Group change indices into hunks: a gap wider than 2*context starts
    // a new hunk.
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    let mut start = changes[0];
    let mut end = changes[0];
    for &c in &changes[1..] {
        if c - end > 2 * context {
            hunks.push((start, end));
            start = c;
        }
        end = c;
    }
    hunks.push((start, end));

    for (change_start, change_end) in hunks {
        let lo = change_start.saturating_sub(context);
        let hi = (change_end + context).min(numbered.len() - 1);

        let mut old_count = 0usize;
        let mut new_count = 0usize;
        for (edit, _, _) in &numbered[lo..=hi] {
            match edit.kind {
                EditKind::Same => {
                    old_count += 1;
                    new_count += 1;
                }
                EditKind::Delete => old_count += 1,
                EditKind::Add => new_count += 1,
            }
        }

        let (_, first_old, first_new) = numbered[lo];
        let old_start = if old_count == 0 { first_old - 1 } else { first_old };
        let new_start = if new_count == 0 { first_new - 1 } else { first_new };

        out.push_str(&format!(
            "@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
        ));

        for (edit, _, _) in &numbered[lo..=hi] {
            match edit.kind {
                EditKind::Same => {
                    out.push(' ');
                    out.push_str(edit.line);
                }
                EditKind::Delete => {
                    if color {
                        out.push_str(RED);
                    }
                    out.push('-');
                    out.push_str(edit.line);
                    if color {
                        out.push_str(RESET);
                    }
                }
                EditKind::Add => {
                    if color {
                        out.push_str(GREEN);
                    }
                    out.push('+');
                    out.push_str(edit.line);
                    if color {
                        out.push_str(RESET);
                    }
                }
            }
            out.push('\n');
        }
    }

    out
}

/// Heuristic gate deciding whether bytes should be line-diffed at all:
/// known magic numbers, any NUL, or too many control bytes in the sniff
/// window.
#[must_use]
pub fn is_binary(data: &[u8]) -> bool {
    let sniff = &data[..data.len().min(BINARY_SNIFF_LEN)];
    if sniff.is_empty() {
        return false;
    }

    const MAGICS: &[&[u8]] = &[
        b"\x7fELF",
        b"\x89PNG",
        b"\xff\xd8\xff",
        b"GIF8",
        b"%PDF",
        b"PK\x03\x04",
        b"\x1f\x8b",
    ];
    if MAGICS.iter().any(|m| sniff.starts_with(m)) {
        return true;
    }

    if sniff.contains(&0) {
        return true;
    }

    let control = sniff
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f)
        .count();
    control * 10 > sniff.len() * 3
}

//
//
// Repository-level diff operations
//
//

pub enum DiffTarget {
    /// `riv diff` - working directory vs index.
    WorkingVsIndex,
    /// `riv diff --staged` - index vs HEAD tree.
    Staged,
}

pub fn diff(repo: &Repository, target: DiffTarget) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let context = repo.config.diff_context();
    let color = color_enabled(repo);

    match target {
        DiffTarget::WorkingVsIndex => diff_working_vs_index(repo, &mut out, context, color),
        DiffTarget::Staged => diff_staged(repo, &mut out, context, color),
    }
}

fn color_enabled(repo: &Repository) -> bool {
    match repo.config.get("diff", "color") {
        Some("always") => true,
        Some("never") => false,
        _ => std::io::stdout().is_terminal(),
    }
}

fn diff_working_vs_index(
    repo: &Repository,
    out: &mut impl Write,
    context: usize,
    color: bool,
) -> Result<()> {
    let index = Index::load_effective(repo)?;

    let mut order = (0..index.count).collect::<Vec<_>>();
    order.sort_unstable_by_key(|&i| index.get_path(i));

    for i in order {
        let path = index.get_path(i);
        if repo.ignore.is_ignored_rel(path) {
            continue;
        }

        let before_bytes = repo.read_blob(&index.hashes[i])?;

        let Ok(on_disk) = std::fs::read(repo.root.join(path)) else {
            //
            // File deleted locally - show as pure removal.
            //
            print_blob_diff(out, path, &before_bytes, b"", context, color)?;
            continue;
        };
        if blob_object_hash(&on_disk) == index.hashes[i] {
            continue; // Unchanged!
        }

        print_blob_diff(out, path, &before_bytes, &on_disk, context, color)?;
    }

    Ok(())
}

fn diff_staged(
    repo: &Repository,
    out: &mut impl Write,
    context: usize,
    color: bool,
) -> Result<()> {
    // Seeded-from-HEAD when empty, so a fresh commit diffs clean and a
    // staged index compares entry-by-entry against the HEAD tree.
    let index = Index::load_effective(repo)?;
    let head = repo.head_commit()?;
    let head_map = repo.flatten_commit_tree(head.as_ref())?;

    let mut order = (0..index.count).collect::<Vec<_>>();
    order.sort_unstable_by_key(|&i| index.get_path(i));

    for i in order {
        let path = index.get_path(i);
        if repo.ignore.is_ignored_rel(path) {
            continue;
        }

        match head_map.get(path) {
            Some(item) => {
                if item.hash == index.hashes[i] {
                    continue; // Unchanged!
                }
                let before = repo.read_blob(&item.hash)?;
                let after = repo.read_blob(&index.hashes[i])?;
                print_blob_diff(out, path, &before, &after, context, color)?;
            }
            None => {
                // New file - did not exist in HEAD.
                let after = repo.read_blob(&index.hashes[i])?;
                print_blob_diff(out, path, b"", &after, context, color)?;
            }
        }
    }

    //
    // Staged deletions: in HEAD, gone from the index.
    //
    for (path, item) in &head_map {
        if index.find(path).is_some() || repo.ignore.is_ignored_rel(path) {
            continue;
        }
        let before = repo.read_blob(&item.hash)?;
        print_blob_diff(out, path, &before, b"", context, color)?;
    }

    Ok(())
}

/// Shared per-file rendering, with the binary gate applied before any
/// bytes are treated as text.
pub fn print_blob_diff(
    out: &mut impl Write,
    path: &str,
    before: &[u8],
    after: &[u8],
    context: usize,
    color: bool,
) -> Result<()> {
    if is_binary(before) || is_binary(after) {
        writeln!(out, "Binary files differ: {path}").with_path(path)?;
        return Ok(());
    }
    let (Ok(before), Ok(after)) = (std::str::from_utf8(before), std::str::from_utf8(after)) else {
        writeln!(out, "Binary files differ: {path}").with_path(path)?;
        return Ok(());
    };

    let body = unified(before, after, context, color);
    if body.is_empty() {
        return Ok(()); // Empty diff!
    }

    writeln!(out, "--- a/{path}").with_path(path)?;
    writeln!(out, "+++ b/{path}").with_path(path)?;
    write!(out, "{body}").with_path(path)?;
    Ok(())
}
