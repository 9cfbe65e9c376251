//! Remote-URL registry stored in `remotes` as a TOML table. Metadata
//! only; nothing here ever touches the network.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::util::atomic_write;

type Registry = BTreeMap<String, String>;

fn registry_path(repo: &Repository) -> PathBuf {
    repo.control_dir().join("remotes")
}

pub fn load(repo: &Repository) -> Result<Registry> {
    let path = registry_path(repo);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::new()),
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

fn save(repo: &Repository, registry: &Registry) -> Result<()> {
    let content = toml::to_string_pretty(registry)?;
    atomic_write(&registry_path(repo), content.as_bytes())
}

pub fn add(repo: &Repository, name: &str, url: &str) -> Result<()> {
    let mut registry = load(repo)?;
    if registry.contains_key(name) {
        return Err(Error::InvalidArgument(format!(
            "remote '{name}' already exists"
        )));
    }
    registry.insert(name.to_owned(), url.to_owned());
    save(repo, &registry)
}

pub fn remove(repo: &Repository, name: &str) -> Result<()> {
    let mut registry = load(repo)?;
    if registry.remove(name).is_none() {
        return Err(Error::InvalidArgument(format!("no such remote '{name}'")));
    }
    save(repo, &registry)
}

/// Sorted `(name, url)` pairs.
pub fn list(repo: &Repository) -> Result<Vec<(String, String)>> {
    Ok(load(repo)?.into_iter().collect())
}
