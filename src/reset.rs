use crate::checkout::{apply_tree_map, ensure_clean};
use crate::error::Result;
use crate::hash::hash_to_hex;
use crate::index::Index;
use crate::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD's target only; index and workspace untouched.
    Soft,
    /// Also rebuild the index from the target commit's tree.
    Mixed,
    /// Also rewrite the workspace. Destructive, so it refuses on a dirty
    /// workspace unless forced.
    Hard,
}

pub fn reset(repo: &Repository, mode: ResetMode, target: &str, force: bool) -> Result<()> {
    let hash = repo.resolve_revision(target)?;
    let commit = repo.read_commit(&hash)?;

    match mode {
        ResetMode::Soft => {
            // Keep "what HEAD held" staged across the move: materialize
            // the implicit post-commit baseline before HEAD changes.
            Index::update(&repo.control_dir(), |index| index.seed_if_empty(repo))?;
            repo.advance_head(&hash)?;
        }
        ResetMode::Mixed => {
            Index::update(&repo.control_dir(), |index| {
                // Recorded stats are zeroed so the next status rehashes
                // everything instead of trusting stale workspace stats.
                index.replace_from_tree(repo, &commit.tree, false)
            })?;
            repo.advance_head(&hash)?;
        }
        ResetMode::Hard => {
            let map = repo.flatten_tree(&commit.tree)?;
            Index::update(&repo.control_dir(), |index| {
                if !force {
                    ensure_clean(repo, index)?;
                }
                apply_tree_map(repo, index, &map)
            })?;
            repo.advance_head(&hash)?;
        }
    }

    // An interrupted merge does not survive a reset.
    repo.clear_merge_head()?;

    tracing::debug!(target = %hash_to_hex(&hash), ?mode, "reset");
    Ok(())
}
