use std::io::Write;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{hash_to_hex, Hash};
use crate::refs;
use crate::repository::Repository;
use crate::util::Xxh3HashSet;

#[inline]
fn branch_ref(name: &str) -> String {
    format!("refs/heads/{name}")
}

#[inline]
#[must_use]
pub fn branch_exists(repo: &Repository, name: &str) -> bool {
    refs::ref_exists(&repo.control_dir(), &branch_ref(name))
}

// Reject names that would break the filesystem or confuse revision
// parsing; the ref layer checks the rest.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(Error::InvalidArgument(format!(
            "branch name '{name}' cannot start with '-'"
        )));
    }
    refs::validate_ref_name(&branch_ref(name))
}

/// Print all local branches, marking the current one with `*`.
pub fn list(repo: &Repository, out: &mut (impl Write + ?Sized)) -> Result<()> {
    let branches = refs::list(&repo.control_dir(), "heads")?;
    if branches.is_empty() {
        writeln!(out, "no branches yet").with_path(&repo.root)?;
        return Ok(());
    }

    let current = repo.current_branch()?;

    for (name, hash) in branches {
        let marker = if current.as_deref() == Some(&name) {
            "* "
        } else {
            "  "
        };
        writeln!(out, "{marker}{name}  {}", &hash_to_hex(&hash)[..8]).with_path(&repo.root)?;
    }

    Ok(())
}

/// Create a new branch pointing at `target` (branch name, commit hash,
/// or HEAD when omitted).
pub fn create(repo: &Repository, name: &str, target: Option<&str>) -> Result<Hash> {
    if branch_exists(repo, name) {
        return Err(Error::RefExists(branch_ref(name)));
    }
    validate_branch_name(name)?;

    let hash = match target {
        Some(t) => repo.resolve_revision(t)?,
        None => repo
            .head_commit()?
            .ok_or_else(|| Error::InvalidArgument("cannot branch: no commits yet".into()))?,
    };

    // Target must resolve to a commit, not just any object.
    repo.read_commit(&hash)?;

    repo.write_ref(&branch_ref(name), &hash)?;
    tracing::debug!(branch = name, at = %hash_to_hex(&hash), "created branch");
    Ok(hash)
}

/// Delete a branch. Without `force`, refuses when the branch tip is not
/// reachable from any other branch head.
pub fn delete(repo: &Repository, name: &str, force: bool) -> Result<()> {
    if !branch_exists(repo, name) {
        return Err(Error::RefMissing(branch_ref(name)));
    }
    if repo.current_branch()?.as_deref() == Some(name) {
        return Err(Error::BranchInUse(name.to_owned()));
    }

    let branch_hash = repo
        .read_ref(&branch_ref(name))?
        .ok_or_else(|| Error::RefMissing(branch_ref(name)))?;

    if !force {
        //
        // Check whether the tip is reachable from any OTHER branch.
        //
        let mut other_reachable = Xxh3HashSet::default();
        for (other, hash) in refs::list(&repo.control_dir(), "heads")? {
            if other != name {
                other_reachable.extend(repo.reachable_commits(&hash));
            }
        }

        if !other_reachable.contains(&branch_hash) {
            return Err(Error::InvalidArgument(format!(
                "branch '{name}' is not fully merged; use -D to force"
            )));
        }
    }

    repo.delete_ref(&branch_ref(name))?;
    tracing::debug!(branch = name, "deleted branch");
    Ok(())
}

pub fn rename(repo: &Repository, old: &str, new: &str) -> Result<()> {
    if !branch_exists(repo, old) {
        return Err(Error::RefMissing(branch_ref(old)));
    }
    if branch_exists(repo, new) {
        return Err(Error::RefExists(branch_ref(new)));
    }
    validate_branch_name(new)?;

    let hash = repo
        .read_ref(&branch_ref(old))?
        .ok_or_else(|| Error::RefMissing(branch_ref(old)))?;
    repo.write_ref(&branch_ref(new), &hash)?;
    repo.delete_ref(&branch_ref(old))?;

    //
    // If we renamed the checked-out branch, re-point HEAD too.
    //
    if repo.current_branch()?.as_deref() == Some(old) {
        refs::set_head_to_branch(&repo.control_dir(), new)?;
    }

    Ok(())
}
