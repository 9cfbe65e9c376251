use std::io::Write;

use chrono::{DateTime, Utc};

use crate::commit::{diff_commits, history};
use crate::diff::print_blob_diff;
use crate::error::{IoResultExt, Result};
use crate::hash::hash_to_hex;
use crate::repository::Repository;

/// Walk first-parent history from HEAD and format it, optionally with a
/// per-commit patch against the first parent.
pub fn log(
    repo: &Repository,
    out: &mut impl Write,
    max_count: usize,
    patch: bool,
) -> Result<()> {
    let Some(head) = repo.head_commit()? else {
        writeln!(out, "no commits yet").with_path(&repo.root)?;
        return Ok(());
    };

    for (hash, commit) in history(repo, &head, max_count)? {
        writeln!(out, "commit {}", hash_to_hex(&hash)).with_path(&repo.root)?;
        if commit.parents.len() > 1 {
            let short: Vec<String> = commit
                .parents
                .iter()
                .map(|p| hash_to_hex(p)[..8].to_owned())
                .collect();
            writeln!(out, "Merge: {}", short.join(" ")).with_path(&repo.root)?;
        }
        writeln!(out, "Author: {}", commit.author).with_path(&repo.root)?;
        writeln!(out, "Date:   {}", format_timestamp(commit.timestamp)).with_path(&repo.root)?;
        writeln!(out).with_path(&repo.root)?;
        for line in commit.message.lines() {
            writeln!(out, "    {line}").with_path(&repo.root)?;
        }
        writeln!(out).with_path(&repo.root)?;

        if patch {
            print_patch(repo, out, &hash, &commit)?;
        }
    }

    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map_or_else(|| timestamp.to_string(), |dt| dt.to_rfc3339())
}

fn print_patch(
    repo: &Repository,
    out: &mut impl Write,
    hash: &crate::hash::Hash,
    commit: &crate::object::Commit,
) -> Result<()> {
    let parent = commit.parents.first();
    let delta = diff_commits(repo, parent, hash)?;

    let old_map = repo.flatten_commit_tree(parent)?;
    let new_map = repo.flatten_commit_tree(Some(hash))?;
    let context = repo.config.diff_context();

    for path in &delta.added {
        let after = repo.read_blob(&new_map[path].hash)?;
        print_blob_diff(out, path, b"", &after, context, false)?;
    }
    for path in &delta.modified {
        let before = repo.read_blob(&old_map[path].hash)?;
        let after = repo.read_blob(&new_map[path].hash)?;
        print_blob_diff(out, path, &before, &after, context, false)?;
    }
    for path in &delta.deleted {
        let before = repo.read_blob(&old_map[path].hash)?;
        print_blob_diff(out, path, &before, b"", context, false)?;
    }

    writeln!(out).with_path(&repo.root)?;
    Ok(())
}
