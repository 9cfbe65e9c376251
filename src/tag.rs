//! Tags: a lightweight tag is a direct ref under `refs/tags/`; an
//! annotated tag stores a small TOML record in the same location.

use std::fs;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{hash_to_hex, hex_to_hash, looks_like_hash, Hash};
use crate::refs;
use crate::repository::Repository;
use crate::util::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    /// Hex id of the tagged object.
    pub object: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tagger: String,
    /// ISO-8601.
    pub timestamp: String,
    pub message: String,
}

#[inline]
fn tag_ref(name: &str) -> String {
    format!("refs/tags/{name}")
}

#[inline]
#[must_use]
pub fn tag_exists(repo: &Repository, name: &str) -> bool {
    refs::ref_exists(&repo.control_dir(), &tag_ref(name))
}

/// Create a tag at `target` (HEAD when omitted). A message makes it
/// annotated.
pub fn create(
    repo: &Repository,
    name: &str,
    target: Option<&str>,
    message: Option<&str>,
) -> Result<Hash> {
    if tag_exists(repo, name) {
        return Err(Error::RefExists(tag_ref(name)));
    }
    refs::validate_ref_name(&tag_ref(name))?;

    let hash = match target {
        Some(t) => repo.resolve_revision(t)?,
        None => repo
            .head_commit()?
            .ok_or_else(|| Error::InvalidArgument("cannot tag: no commits yet".into()))?,
    };
    repo.read_commit(&hash)?;

    match message {
        None => repo.write_ref(&tag_ref(name), &hash)?,
        Some(message) => {
            let record = TagRecord {
                object: hash_to_hex(&hash),
                kind: "commit".to_owned(),
                tagger: repo.config.author(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                message: message.to_owned(),
            };
            let content = toml::to_string_pretty(&record)?;
            atomic_write(
                &repo.control_dir().join(tag_ref(name)),
                content.as_bytes(),
            )?;
        }
    }

    Ok(hash)
}

pub fn delete(repo: &Repository, name: &str) -> Result<()> {
    if !repo.delete_ref(&tag_ref(name))? {
        return Err(Error::RefMissing(tag_ref(name)));
    }
    Ok(())
}

/// Resolve a tag name to the commit it points at, whether lightweight or
/// annotated. `None` when no such tag exists.
pub fn peel(repo: &Repository, name: &str) -> Result<Option<Hash>> {
    let path = repo.control_dir().join(tag_ref(name));
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io { path, source: e }),
    };

    let line = content.trim();
    if looks_like_hash(line) {
        return hex_to_hash(line).map(Some);
    }

    let record: TagRecord = toml::from_str(&content)?;
    hex_to_hash(&record.object).map(Some)
}

/// Read the annotated record, if this tag carries one.
pub fn read_record(repo: &Repository, name: &str) -> Result<Option<TagRecord>> {
    let path = repo.control_dir().join(tag_ref(name));
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io { path, source: e }),
    };
    if looks_like_hash(content.trim()) {
        return Ok(None);
    }
    Ok(Some(toml::from_str(&content)?))
}

/// Print all tags, annotated ones with their message's first line.
pub fn list(repo: &Repository, out: &mut (impl Write + ?Sized)) -> Result<()> {
    let tags_dir = repo.control_dir().join("refs/tags");
    let mut names = Vec::new();
    if tags_dir.is_dir() {
        collect_names(&tags_dir, &tags_dir, &mut names)?;
    }
    names.sort_unstable();

    for name in names {
        match read_record(repo, &name)? {
            Some(record) => {
                let first_line = record.message.lines().next().unwrap_or("");
                writeln!(out, "{name}  {first_line}").with_path(&repo.root)?;
            }
            None => writeln!(out, "{name}").with_path(&repo.root)?,
        }
    }
    Ok(())
}

fn collect_names(base: &std::path::Path, dir: &std::path::Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        if path.is_dir() {
            collect_names(base, &path, out)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}
