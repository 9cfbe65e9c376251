use crate::error::{Error, Result};
use crate::hash::{hash_to_hex, Hash};
use crate::index::Index;
use crate::object::{Commit, Object};
use crate::repository::Repository;

use smallvec::SmallVec;

/// Build and persist one commit record. The author comes from config
/// with an env fallback; the timestamp is wall-clock seconds.
pub fn create_commit(
    repo: &Repository,
    tree: Hash,
    message: &str,
    parents: &[Hash],
) -> Result<Hash> {
    let commit = Commit {
        tree,
        parents: SmallVec::from_slice(parents),
        timestamp: chrono::Utc::now().timestamp(),
        author: repo.config.author().into(),
        message: message.into(),
    };

    repo.write_object(&Object::Commit(commit))
}

/// Flush the index into a tree, create the commit, and advance whatever
/// HEAD points at. A pending merge contributes its second parent and is
/// cleared on success.
pub fn commit(repo: &Repository, message: &str) -> Result<Hash> {
    let head = repo.head_commit()?;
    let merge_head = repo.merge_head()?;

    let hash = Index::update(&repo.control_dir(), |index| {
        //
        // Refuse empty commits: an empty index means nothing staged,
        // and a snapshot identical to HEAD has nothing to record.
        //
        if merge_head.is_none() {
            if index.count == 0 {
                return Err(Error::InvalidArgument("nothing to commit".into()));
            }
            let head_map = repo.flatten_commit_tree(head.as_ref())?;
            let unchanged = index.count == head_map.len()
                && head_map.iter().all(|(path, item)| {
                    index.find(path).is_some_and(|i| {
                        index.hashes[i] == item.hash && index.modes[i] == item.mode
                    })
                });
            if unchanged {
                return Err(Error::InvalidArgument("nothing to commit".into()));
            }
        }

        let tree = index.write_tree(repo)?;

        let mut parents: SmallVec<[Hash; 2]> = SmallVec::new();
        if let Some(h) = head {
            parents.push(h);
        }
        if let Some(m) = merge_head {
            parents.push(m);
        }

        let hash = create_commit(repo, tree, message, &parents)?;

        repo.advance_head(&hash)?;

        // The staged snapshot is now HEAD: flush leaves the index empty.
        index.clear();

        Ok(hash)
    })?;

    if merge_head.is_some() {
        repo.clear_merge_head()?;
    }

    tracing::info!(commit = %hash_to_hex(&hash), "created commit");
    Ok(hash)
}

/// First-parent history from `start`, newest to oldest, bounded by
/// `max_depth`.
pub fn history(
    repo: &Repository,
    start: &Hash,
    max_depth: usize,
) -> Result<Vec<(Hash, Commit)>> {
    let mut out = Vec::new();
    let mut current = *start;

    while out.len() < max_depth {
        let commit = repo.read_commit(&current)?;
        let next = commit.parents.first().copied();
        out.push((current, commit));

        match next {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(out)
}

/// Per-path difference between two commits' trees.
#[derive(Debug, Default)]
pub struct TreeDelta {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

/// Compare tree entries by path; blob-hash inequality means modified.
/// `old = None` diffs against the empty tree (root commit).
pub fn diff_commits(
    repo: &Repository,
    old: Option<&Hash>,
    new: &Hash,
) -> Result<TreeDelta> {
    let old_map = match old {
        Some(hash) => {
            let commit = repo.read_commit(hash)?;
            repo.flatten_tree(&commit.tree)?
        }
        None => std::collections::BTreeMap::new(),
    };
    let new_commit = repo.read_commit(new)?;
    let new_map = repo.flatten_tree(&new_commit.tree)?;

    let mut delta = TreeDelta::default();

    for (path, item) in &new_map {
        match old_map.get(path) {
            None => delta.added.push(path.clone()),
            Some(old_item) if old_item.hash != item.hash => delta.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in old_map.keys() {
        if !new_map.contains_key(path) {
            delta.deleted.push(path.clone());
        }
    }

    Ok(delta)
}
