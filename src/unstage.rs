use std::path::PathBuf;

use crate::error::Result;
use crate::index::Index;
use crate::repository::Repository;
use crate::stage::normalize_rel;

/// Drop entries from the index without touching the workspace. Empty
/// `paths` clears the whole index.
pub fn unstage(repo: &Repository, paths: &[PathBuf]) -> Result<usize> {
    Index::update(&repo.control_dir(), |index| {
        if paths.is_empty() {
            let removed = index.count;
            index.clear();
            return Ok(removed);
        }

        // Removing one entry from the implicit post-commit baseline
        // needs the baseline materialized first.
        index.seed_if_empty(repo)?;

        let mut removed = 0usize;
        for path in paths {
            let Some(rel) = normalize_rel(&repo.root, path) else {
                continue;
            };
            if index.remove(&rel) {
                removed += 1;
            } else {
                eprintln!("'{rel}' is not staged");
            }
        }
        Ok(removed)
    })
}
