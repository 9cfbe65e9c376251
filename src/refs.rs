//! Named pointers: branches, tags, remotes, and HEAD. Direct refs hold a
//! hex commit id; symbolic refs hold `ref: <name>` and are chased with a
//! bounded depth.

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{hash_to_hex, hex_to_hash, looks_like_hash, Hash};
use crate::util::atomic_write;

use std::fs;
use std::path::{Path, PathBuf};

/// Symbolic chains longer than this are rejected as cycles.
pub const MAX_SYMREF_DEPTH: u32 = 5;

pub const SYMREF_PREFIX: &str = "ref: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `ref: refs/heads/<name>`; `resolved` is `None` while the branch is
    /// still unborn.
    Symbolic {
        target: String,
        resolved: Option<Hash>,
    },
    Detached(Hash),
}

impl Head {
    #[inline]
    #[must_use]
    pub fn commit(&self) -> Option<Hash> {
        match self {
            Head::Symbolic { resolved, .. } => *resolved,
            Head::Detached(hash) => Some(*hash),
        }
    }

    /// Branch name when HEAD is symbolic under `refs/heads/`.
    #[inline]
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Symbolic { target, .. } => target.strip_prefix("refs/heads/"),
            Head::Detached(_) => None,
        }
    }
}

fn ref_path(control: &Path, name: &str) -> PathBuf {
    control.join(name)
}

/// Reject names that would break the filesystem or path parsing.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("empty ref name".into()));
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(Error::InvalidArgument(format!("invalid ref name '{name}'")));
    }
    if name.bytes().any(|b| b < 0x20 || b == 0x7f) || name.contains(char::is_whitespace) {
        return Err(Error::InvalidArgument(format!("invalid ref name '{name}'")));
    }
    for component in name.split('/') {
        if component == "." || component == ".." || component == "HEAD" {
            return Err(Error::InvalidArgument(format!("invalid ref name '{name}'")));
        }
    }
    Ok(())
}

/// Atomic write of a direct ref; parent directories are created.
pub fn write_ref(control: &Path, name: &str, hash: &Hash) -> Result<()> {
    validate_ref_name(name)?;
    atomic_write(
        &ref_path(control, name),
        format!("{}\n", hash_to_hex(hash)).as_bytes(),
    )
}

/// Direct read of one ref file. Missing is `None`, not an error.
pub fn read_ref(control: &Path, name: &str) -> Result<Option<Hash>> {
    let path = ref_path(control, name);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io { path, source: e }),
    };
    let line = content.trim();
    if line.starts_with(SYMREF_PREFIX) {
        return Err(Error::Malformed("symbolic ref where a direct ref was expected"));
    }
    hex_to_hash(line).map(Some)
}

pub fn delete_ref(control: &Path, name: &str) -> Result<bool> {
    let path = ref_path(control, name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

#[inline]
#[must_use]
pub fn ref_exists(control: &Path, name: &str) -> bool {
    ref_path(control, name).is_file()
}

/// Resolve a ref name to a commit id, chasing `ref: ` indirections.
/// A chain deeper than [`MAX_SYMREF_DEPTH`] is treated as a cycle.
pub fn resolve(control: &Path, name: &str) -> Result<Option<Hash>> {
    let mut current = name.to_owned();

    for _ in 0..=MAX_SYMREF_DEPTH {
        let path = ref_path(control, &current);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io { path, source: e }),
        };

        let line = content.trim();
        if let Some(target) = line.strip_prefix(SYMREF_PREFIX) {
            current = target.trim().to_owned();
            continue;
        }
        if looks_like_hash(line) {
            return Ok(Some(hex_to_hash(line)?));
        }
        return Err(Error::InvalidHead(format!("'{current}' contains '{line}'")));
    }

    Err(Error::InvalidHead(format!(
        "symbolic ref chain from '{name}' exceeds depth {MAX_SYMREF_DEPTH}"
    )))
}

/// Recursively walk `refs/<prefix>/`, returning `(name, hash)` pairs
/// sorted by name. Entries that do not hold a direct hash (annotated tag
/// records) are skipped; the tag layer reads those itself.
pub fn list(control: &Path, prefix: &str) -> Result<Vec<(String, Hash)>> {
    let base = control.join("refs").join(prefix);
    let mut out = Vec::new();
    if base.is_dir() {
        collect_refs(control, &base, &base, prefix, &mut out)?;
    }
    out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn collect_refs(
    control: &Path,
    base: &Path,
    dir: &Path,
    prefix: &str,
    out: &mut Vec<(String, Hash)>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        if path.is_dir() {
            collect_refs(control, base, &path, prefix, out)?;
        } else if path.is_file() {
            let Ok(rel) = path.strip_prefix(base) else { continue };
            let name = rel.to_string_lossy().replace('\\', "/");
            let full = format!("refs/{prefix}/{name}");
            if let Ok(Some(hash)) = read_ref(control, &full) {
                out.push((name, hash));
            }
        }
    }
    Ok(())
}

pub fn set_head_to_branch(control: &Path, branch: &str) -> Result<()> {
    atomic_write(
        &control.join("HEAD"),
        format!("{SYMREF_PREFIX}refs/heads/{branch}\n").as_bytes(),
    )
}

pub fn set_head_detached(control: &Path, hash: &Hash) -> Result<()> {
    atomic_write(
        &control.join("HEAD"),
        format!("{}\n", hash_to_hex(hash)).as_bytes(),
    )
}

/// Read and classify HEAD. HEAD must exist in an initialized repository.
pub fn read_head(control: &Path) -> Result<Head> {
    let path = control.join("HEAD");
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::InvalidHead("HEAD is missing".into()));
        }
        Err(e) => return Err(Error::Io { path, source: e }),
    };

    let line = content.trim();
    if let Some(target) = line.strip_prefix(SYMREF_PREFIX) {
        let target = target.trim().to_owned();
        let resolved = resolve(control, &target)?;
        return Ok(Head::Symbolic { target, resolved });
    }
    if looks_like_hash(line) {
        return Ok(Head::Detached(hex_to_hash(line)?));
    }
    Err(Error::InvalidHead(format!("'{line}'")))
}
