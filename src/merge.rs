//! Three-way merge: common-ancestor discovery over the full parent
//! graph, per-side change classification since the base, and conflict
//! synthesis with textual markers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::checkout::{apply_tree_map, ensure_clean};
use crate::commit::create_commit;
use crate::error::{Error, Result};
use crate::hash::{hash_to_hex, Hash};
use crate::index::Index;
use crate::object::MODE_FILE;
use crate::repository::{Repository, TreeItem};
use crate::util::Xxh3HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Conflicts stop the merge with markers written to the workspace.
    Normal,
    /// Conflicting paths keep the current branch's version.
    Ours,
    /// Conflicting paths take the source branch's version.
    Theirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Source is already contained in the target.
    AlreadyUpToDate,
    /// Target was an ancestor of source; the branch moved up, no new
    /// commit.
    FastForward(Hash),
    /// A two-parent merge commit was created.
    Merged(Hash),
}

/// Merge `source` (a branch name) into the current HEAD.
pub fn merge(repo: &Repository, source: &str, strategy: MergeStrategy) -> Result<MergeOutcome> {
    let _span = tracing::info_span!("merge", source).entered();

    let src_ref = format!("refs/heads/{source}");
    let src = repo
        .read_ref(&src_ref)?
        .ok_or(Error::RefMissing(src_ref))?;
    let tgt = repo
        .head_commit()?
        .ok_or_else(|| Error::InvalidArgument("cannot merge: no commits yet".into()))?;

    if src == tgt {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    let base = merge_base(repo, &tgt, &src);

    if base == Some(src) {
        // Everything on the source side is already in our history.
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    if base == Some(tgt) {
        return fast_forward(repo, source, &src);
    }

    three_way(repo, source, &src, &tgt, base.as_ref(), strategy)
}

/// First commit reachable from both sides under breadth-first order,
/// walking all parents. `None` means disjoint histories (orphan merge,
/// empty base).
pub fn merge_base(repo: &Repository, a: &Hash, b: &Hash) -> Option<Hash> {
    let reachable_from_a = bfs_ancestors(repo, a);

    let mut seen: Xxh3HashSet<Hash> = Xxh3HashSet::default();
    let mut queue = VecDeque::from([*b]);
    while let Some(hash) = queue.pop_front() {
        if !seen.insert(hash) {
            continue;
        }
        if reachable_from_a.contains(&hash) {
            return Some(hash);
        }
        if let Ok(commit) = repo.read_commit(&hash) {
            queue.extend(commit.parents.iter().copied());
        }
    }
    None
}

fn bfs_ancestors(repo: &Repository, start: &Hash) -> Xxh3HashSet<Hash> {
    let mut seen: Xxh3HashSet<Hash> = Xxh3HashSet::default();
    let mut queue = VecDeque::from([*start]);
    while let Some(hash) = queue.pop_front() {
        if !seen.insert(hash) {
            continue;
        }
        if let Ok(commit) = repo.read_commit(&hash) {
            queue.extend(commit.parents.iter().copied());
        }
    }
    seen
}

fn fast_forward(repo: &Repository, source: &str, src: &Hash) -> Result<MergeOutcome> {
    let commit = repo.read_commit(src)?;
    let map = repo.flatten_tree(&commit.tree)?;

    Index::update(&repo.control_dir(), |index| {
        ensure_clean(repo, index)?;
        apply_tree_map(repo, index, &map)
    })?;

    repo.advance_head(src)?;
    tracing::info!(source, to = %hash_to_hex(src), "fast-forward");
    Ok(MergeOutcome::FastForward(*src))
}

fn three_way(
    repo: &Repository,
    source: &str,
    src: &Hash,
    tgt: &Hash,
    base: Option<&Hash>,
    strategy: MergeStrategy,
) -> Result<MergeOutcome> {
    let base_map = repo.flatten_commit_tree(base)?;
    let src_map = repo.flatten_commit_tree(Some(src))?;
    let tgt_map = repo.flatten_commit_tree(Some(tgt))?;

    let all_paths: BTreeSet<&String> = src_map.keys().chain(tgt_map.keys()).collect();

    let mut merged: BTreeMap<String, TreeItem> = BTreeMap::new();
    let mut conflicts: Vec<String> = Vec::new();

    for path in all_paths {
        let base_item = base_map.get(path);
        let src_item = src_map.get(path);
        let tgt_item = tgt_map.get(path);

        let src_changed = src_item.map(|i| i.hash) != base_item.map(|i| i.hash);
        let tgt_changed = tgt_item.map(|i| i.hash) != base_item.map(|i| i.hash);

        let chosen = match (src_changed, tgt_changed) {
            // Untouched, or changed only on one side.
            (false, false) | (false, true) => tgt_item.copied(),
            (true, false) => src_item.copied(),
            (true, true) => {
                if src_item.map(|i| i.hash) == tgt_item.map(|i| i.hash) {
                    // Identical change on both sides.
                    tgt_item.copied()
                } else {
                    match strategy {
                        MergeStrategy::Ours => tgt_item.copied(),
                        MergeStrategy::Theirs => src_item.copied(),
                        MergeStrategy::Normal => {
                            let blob =
                                conflict_blob(repo, source, tgt_item, src_item)?;
                            conflicts.push(path.clone());
                            Some(TreeItem {
                                hash: blob,
                                mode: tgt_item.or(src_item).map_or(MODE_FILE, |i| i.mode),
                            })
                        }
                    }
                }
            }
        };

        if let Some(item) = chosen {
            merged.insert(path.clone(), item);
        }
    }

    if conflicts.is_empty() {
        let hash = Index::update(&repo.control_dir(), |index| {
            ensure_clean(repo, index)?;
            apply_tree_map(repo, index, &merged)?;

            let tree = index.write_tree(repo)?;
            let hash = create_commit(
                repo,
                tree,
                &format!("Merge branch '{source}'"),
                &[*tgt, *src],
            )?;
            repo.advance_head(&hash)?;
            index.clear();
            Ok(hash)
        })?;

        repo.clear_merge_head()?;
        tracing::info!(commit = %hash_to_hex(&hash), "merge commit");
        return Ok(MergeOutcome::Merged(hash));
    }

    //
    // Unresolved conflicts: leave the merged state (markers included) in
    // the workspace and index, record MERGE_HEAD, and hand resolution to
    // the user.
    //
    Index::update(&repo.control_dir(), |index| {
        ensure_clean(repo, index)?;
        apply_tree_map(repo, index, &merged)?;
        for path in &conflicts {
            index.mark_conflict(path);
        }
        Ok(())
    })?;
    repo.set_merge_head(src)?;

    Err(Error::MergeConflict(conflicts))
}

/// Build the marker blob for one conflicted path. Deleted sides
/// contribute empty content; the markers are stored verbatim for the
/// user to edit.
fn conflict_blob(
    repo: &Repository,
    source: &str,
    tgt_item: Option<&TreeItem>,
    src_item: Option<&TreeItem>,
) -> Result<Hash> {
    let read_side = |item: Option<&TreeItem>| -> Result<Vec<u8>> {
        match item {
            Some(item) => {
                let mut bytes = repo.read_blob(&item.hash)?.into_vec();
                if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                    bytes.push(b'\n');
                }
                Ok(bytes)
            }
            None => Ok(Vec::new()),
        }
    };

    let ours = read_side(tgt_item)?;
    let theirs = read_side(src_item)?;

    let mut blob = Vec::with_capacity(ours.len() + theirs.len() + 64);
    blob.extend_from_slice(b"<<<<<<< HEAD\n");
    blob.extend_from_slice(&ours);
    blob.extend_from_slice(b"=======\n");
    blob.extend_from_slice(&theirs);
    blob.extend_from_slice(format!(">>>>>>> {source}\n").as_bytes());

    repo.write_blob(&blob)
}
