//! Repository configuration stored in `config` as TOML tables:
//! `section -> key -> value`. The whole document is rewritten atomically
//! after every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::util::atomic_write;

type Sections = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    sections: Sections,
}

impl Config {
    /// Load from `<control>/config`. Defaults are synthesized (and written
    /// back) when the file is missing or lacks the baseline sections.
    pub fn load(control: &Path) -> Result<Self> {
        let path = control.join("config");

        let mut sections: Sections = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Sections::new(),
            Err(e) => return Err(Error::Io { path, source: e }),
        };

        let mut dirty = false;
        for section in ["core", "user", "branch", "merge", "diff"] {
            if !sections.contains_key(section) {
                sections.insert(section.to_owned(), BTreeMap::new());
                dirty = true;
            }
        }
        let branch = sections.get_mut("branch").expect("just inserted");
        if !branch.contains_key("default") {
            branch.insert("default".to_owned(), "main".to_owned());
            dirty = true;
        }

        let config = Self { path, sections };
        if dirty && control.is_dir() {
            config.save()?;
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.sections)?;
        atomic_write(&self.path, content.as_bytes())
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        self.save()
    }

    /// Remove one key; empty sections are dropped from the document.
    pub fn unset(&mut self, section: &str, key: &str) -> Result<bool> {
        let Some(keys) = self.sections.get_mut(section) else {
            return Ok(false);
        };
        let existed = keys.remove(key).is_some();
        if keys.is_empty() {
            self.sections.remove(section);
        }
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// Flat `section.key = value` listing, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (section, keys) in &self.sections {
            for (key, value) in keys {
                out.push((format!("{section}.{key}"), value.clone()));
            }
        }
        out
    }

    #[must_use]
    pub fn default_branch(&self) -> &str {
        self.get("branch", "default").unwrap_or("main")
    }

    #[must_use]
    pub fn diff_context(&self) -> usize {
        self.get("diff", "context")
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::diff::DEFAULT_CONTEXT)
    }

    /// Author identity: `user.name <user.email>` when configured, env
    /// fallback otherwise.
    #[must_use]
    pub fn author(&self) -> String {
        match (self.get("user", "name"), self.get("user", "email")) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (Some(name), None) => name.to_owned(),
            _ => std::env::var("RIV_AUTHOR")
                .or_else(|_| std::env::var("USER"))
                .unwrap_or_else(|_| "unknown".to_owned()),
        }
    }
}

/// Split a CLI-style `section.key` into its two halves.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(s, k)| !s.is_empty() && !k.is_empty())
        .ok_or_else(|| Error::InvalidArgument(format!("config key '{key}' is not section.key")))
}
