use std::borrow::Cow;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::hash::Hash;
use crate::ignore::Ignore;
use crate::index::{mtime_of, Index, FLAG_CONFLICT, FLAG_STAGED};
use crate::object::MODE_FILE;
use crate::repository::Repository;

use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

/// Stage every workspace file matched by `paths` (literal paths or
/// regexes; empty means the whole workspace), and drop index entries
/// whose files vanished. One lock acquisition covers the whole cycle.
pub fn stage(repo: &Repository, paths: &[PathBuf]) -> Result<()> {
    let _span = tracing::debug_span!("stage").entered();

    let current_dir = env::current_dir().with_path(".")?;

    //
    //
    // Classify patterns into literal roots or regexes.
    //
    //

    let default = [PathBuf::from(".")];
    let patterns = if paths.is_empty() { &default[..] } else { paths };
    let (literal_roots, combined_re) = classify_patterns(patterns, &current_dir);

    //
    //
    // Collect candidate files.
    //
    //

    let candidates = walk_matching(&repo.root, &repo.ignore, &literal_roots, combined_re.as_ref());

    Index::update(&repo.control_dir(), |index| {
        //
        // Right after a commit the index is empty; fault the HEAD tree
        // in first so the index stays the full next-commit snapshot.
        //
        index.seed_if_empty(repo)?;

        //
        // Stage removes: entries whose workspace file is gone.
        //
        let mut to_remove = Vec::new();
        for i in 0..index.count {
            if !repo.root.join(index.get_path(i)).exists() {
                to_remove.push(index.get_path(i).to_owned());
            }
        }
        for path in &to_remove {
            index.remove(path);
        }

        //
        // Filter to dirty files.
        //
        let mut todo = Vec::new();
        for (abs, rel) in candidates {
            if repo.ignore.is_ignored_rel(&rel) {
                continue;
            }
            let meta = match fs::metadata(&abs) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("metadata error for {}: {}", abs.display(), e);
                    continue;
                }
            };
            if let Some(i) = index.find(&rel) {
                if !index.is_dirty(i, &meta) {
                    continue;
                }
            }
            todo.push((abs, rel, meta));
        }

        //
        // Read, encode, hash, and persist blobs in parallel. Blobs land
        // in the object store before the index mentions them.
        //
        let hashed = todo
            .par_iter()
            .map(|(abs, rel, _)| -> Result<(usize, Hash, String)> {
                let data = fs::read(abs).with_path(abs.as_path())?;
                let hash = repo.write_blob(&data)?;
                Ok((data.len(), hash, rel.clone()))
            })
            .collect::<Vec<_>>();

        let mut staged_count = 0usize;
        let mut staged_bytes = 0usize;
        for (result, (_, _, meta)) in hashed.into_iter().zip(todo.iter()) {
            let (len, hash, rel) = result?;
            // Re-staging content the entry already holds just refreshes
            // the stat triple (and resolves any conflict marker).
            let flags = match index.find(&rel) {
                Some(i) if index.hashes[i] == hash => index.flags[i] & !FLAG_CONFLICT,
                _ => FLAG_STAGED,
            };
            index.add_file(&rel, hash, meta, flags);
            staged_count += 1;
            staged_bytes += len;
        }

        if staged_count > 0 || !to_remove.is_empty() {
            tracing::debug!(staged_count, staged_bytes, removed = to_remove.len(), "staged");
            println!(
                "Staged {staged_count} file(s), {removes} remove(s), {staged_bytes} byte(s)",
                removes = to_remove.len(),
            );
        }

        Ok(())
    })
}

/// Stage explicit bytes at one path: persist the blob first, then upsert
/// the entry under the lock.
pub fn stage_bytes(repo: &Repository, path: &str, bytes: &[u8]) -> Result<Hash> {
    let hash = repo.write_blob(bytes)?;

    let (size, mtime) = match fs::metadata(repo.root.join(path)) {
        Ok(meta) => (meta.len(), mtime_of(&meta)),
        Err(_) => (bytes.len() as u64, 0),
    };

    Index::update(&repo.control_dir(), |index| {
        index.seed_if_empty(repo)?;
        index.upsert(path, hash, size, mtime, MODE_FILE, FLAG_STAGED);
        Ok(())
    })?;

    Ok(hash)
}

//
//
// Shared pattern matching helpers. (stage and unstage share these.)
//
//

#[must_use]
pub fn classify_patterns(
    patterns: &[PathBuf],
    current_dir: &Path,
) -> (Vec<PathBuf>, Option<Regex>) {
    let mut literal_roots = Vec::new();
    let mut regex_patterns = Vec::new();

    for p in patterns {
        let candidate = if p.is_absolute() {
            Cow::Borrowed(p)
        } else {
            Cow::Owned(current_dir.join(p))
        };

        if candidate.exists() {
            //
            // Canonicalize once here so we don't repeat it per-file in
            // the walk.
            //
            match candidate.canonicalize() {
                Ok(canon) => literal_roots.push(canon),
                Err(e) => eprintln!("Cannot canonicalize '{}': {}", candidate.display(), e),
            }
            continue;
        }

        let s = p.to_string_lossy();
        if Regex::new(&s).is_ok() {
            regex_patterns.push(format!("(?:{s})"));
        } else {
            eprintln!("Invalid pattern '{s}', skipping");
        }
    }

    let combined_re = if regex_patterns.is_empty() {
        None
    } else {
        match Regex::new(&regex_patterns.join("|")) {
            Ok(re) => Some(re),
            Err(e) => {
                eprintln!("Failed to combine patterns: {e}");
                None
            }
        }
    };

    (literal_roots, combined_re)
}

/// Walk the workspace, returning `(abs_path, rel_norm)` for every
/// non-ignored file matching `literal_roots` or `combined_re`.
#[must_use]
pub fn walk_matching(
    repo_root: &Path,
    ignore: &Ignore,
    literal_roots: &[PathBuf],
    combined_re: Option<&Regex>,
) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();

    for entry in WalkDir::new(repo_root)
        .into_iter()
        .filter_entry(|e| !ignore.is_ignored_abs(e.path()))
    {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let Ok(rel) = path.strip_prefix(repo_root) else {
            continue;
        };
        let rel_norm = rel.to_string_lossy().replace('\\', "/");

        let matched = literal_roots.iter().any(|root| path.starts_with(root))
            || combined_re.is_some_and(|re| re.is_match(&rel_norm));

        if matched {
            files.push((path, rel_norm));
        }
    }

    files.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    files.dedup_by(|a, b| a.0 == b.0);
    files
}

/// Normalize a user-supplied path to a repo-relative forward-slash string.
#[must_use]
pub fn normalize_rel(repo_root: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(repo_root).ok()?
    } else {
        path.strip_prefix(".").unwrap_or(path)
    };
    let s = rel.to_string_lossy().replace('\\', "/");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
