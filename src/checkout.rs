use std::collections::BTreeMap;
use std::fs;

use crate::branch;
use crate::error::{Error, IoResultExt, Result};
use crate::index::{effective_view, mtime_of, Index};
use crate::object::MODE_EXEC;
use crate::refs;
use crate::repository::{Repository, TreeItem};

/// Uncommitted work blocks snapshot switches unless forced. An empty
/// index is judged against the HEAD baseline, not treated as clean.
pub(crate) fn ensure_clean(repo: &Repository, index: &Index) -> Result<()> {
    let mut slot = None;
    let view = effective_view(repo, index, &mut slot)?;
    let changes = view.changes(&repo.root, &repo.ignore);
    if !changes.staged.is_empty() || !changes.modified.is_empty() || !changes.deleted.is_empty() {
        return Err(Error::DirtyWorkspace);
    }
    Ok(())
}

/// Materialize a flattened snapshot into the workspace and rebuild the
/// index to mirror it. Tracked files absent from the snapshot are
/// removed from disk.
pub(crate) fn apply_tree_map(
    repo: &Repository,
    index: &mut Index,
    map: &BTreeMap<String, TreeItem>,
) -> Result<()> {
    // Tracked set: the index when it has entries, the HEAD tree right
    // after a commit cleared it.
    let tracked: Vec<String> = if index.count > 0 {
        (0..index.count).map(|i| index.get_path(i).to_owned()).collect()
    } else {
        repo.flatten_commit_tree(repo.head_commit()?.as_ref())?
            .into_keys()
            .collect()
    };
    for path in &tracked {
        if !map.contains_key(path) {
            let abs = repo.root.join(path);
            if abs.exists() {
                fs::remove_file(&abs).with_path(&abs)?;
            }
        }
    }

    for (path, item) in map {
        let abs = repo.root.join(path);
        let data = repo.read_blob(&item.hash)?;
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        fs::write(&abs, &data).with_path(&abs)?;
        set_file_mode(&abs, item.mode)?;
    }

    index.clear();
    for (path, item) in map {
        let abs = repo.root.join(path);
        let (size, mtime) = match fs::metadata(&abs) {
            Ok(meta) => (meta.len(), mtime_of(&meta)),
            Err(_) => (0, 0),
        };
        index.upsert(path, item.hash, size, mtime, item.mode, 0);
    }

    Ok(())
}

#[cfg(unix)]
fn set_file_mode(abs: &std::path::Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = if mode == MODE_EXEC { 0o755 } else { 0o644 };
    fs::set_permissions(abs, fs::Permissions::from_mode(bits)).with_path(abs)
}

#[cfg(not(unix))]
fn set_file_mode(_abs: &std::path::Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Switch the workspace to a branch, tag, or commit. A branch name keeps
/// HEAD symbolic; anything else detaches it.
pub fn checkout(repo: &Repository, target: &str, force: bool) -> Result<()> {
    let (hash, branch_name) = if branch::branch_exists(repo, target) {
        let branch_ref = format!("refs/heads/{target}");
        let hash = repo
            .read_ref(&branch_ref)?
            .ok_or(Error::RefMissing(branch_ref))?;
        (hash, Some(target))
    } else {
        (repo.resolve_revision(target)?, None)
    };

    let commit = repo.read_commit(&hash)?;
    let map = repo.flatten_tree(&commit.tree)?;

    Index::update(&repo.control_dir(), |index| {
        if !force {
            let mut slot = None;
            let view = effective_view(repo, index, &mut slot)?;
            let changes = view.changes(&repo.root, &repo.ignore);
            if !changes.staged.is_empty()
                || !changes.modified.is_empty()
                || !changes.deleted.is_empty()
            {
                return Err(Error::DirtyWorkspace);
            }
            //
            // Never silently clobber untracked files with snapshot
            // content.
            //
            for path in map.keys() {
                if view.find(path).is_none() && repo.root.join(path).exists() {
                    return Err(Error::DirtyWorkspace);
                }
            }
        }
        apply_tree_map(repo, index, &map)
    })?;

    let control = repo.control_dir();
    match branch_name {
        Some(name) => refs::set_head_to_branch(&control, name)?,
        None => refs::set_head_detached(&control, &hash)?,
    }

    tracing::debug!(rev = target, detached = branch_name.is_none(), "checked out");
    Ok(())
}

/// `checkout -b`: create the branch at HEAD and switch to it without
/// touching the workspace.
pub fn checkout_new_branch(repo: &Repository, name: &str) -> Result<()> {
    branch::create(repo, name, None)?;
    refs::set_head_to_branch(&repo.control_dir(), name)
}
