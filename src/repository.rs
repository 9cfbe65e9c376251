use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::{hash_bytes, hash_to_hex, hex_to_hash, looks_like_hash, Hash};
use crate::ignore::{Ignore, IGNORE_FILE};
use crate::object::{encode_blob_into, Commit, Object, Tree, MODE_DIR};
use crate::refs::{self, Head};
use crate::storage::Storage;
use crate::util::{atomic_write, Xxh3HashSet};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONTROL_DIR: &str = ".riv";

/// A blob reachable from a flattened tree: full workspace-relative path
/// to `(hash, mode)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeItem {
    pub hash: Hash,
    pub mode: u32,
}

/// Handle to one workspace plus its control directory. All engine state
/// lives under `.riv/`; there are no process-wide singletons.
pub struct Repository {
    pub root: PathBuf,
    pub storage: Storage,
    pub ignore: Ignore,
    pub config: Config,
}

impl Repository {
    pub fn init(path: &Path) -> Result<Self> {
        let control = path.join(CONTROL_DIR);
        if control.exists() {
            return Err(Error::RepositoryExists(control));
        }

        fs::create_dir_all(control.join("objects")).with_path(&control)?;
        fs::create_dir_all(control.join("refs/heads")).with_path(&control)?;
        fs::create_dir_all(control.join("refs/tags")).with_path(&control)?;
        fs::create_dir_all(control.join("refs/remotes")).with_path(&control)?;

        let config = Config::load(&control)?;
        refs::set_head_to_branch(&control, config.default_branch())?;

        let root = path.canonicalize().with_path(path)?;
        let patterns = root.join(IGNORE_FILE);
        if !patterns.exists() {
            fs::write(
                &patterns,
                "# .rivignore: ignore rules (repo-root-relative)\n\
# Lines ending with / ignore a directory prefix.\n\
# * and ? are supported.\n\
\n\
.riv/\n\
.git/\n\
target/\n\
*.swp\n\
*.tmp\n",
            )
            .with_path(&patterns)?;
        }

        tracing::info!(root = %root.display(), "initialized repository");

        Ok(Self {
            ignore: Ignore::load(&root)?,
            storage: Storage::new(&control),
            config,
            root,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let control = path.join(CONTROL_DIR);
        if !control.is_dir() {
            return Err(Error::RepositoryNotFound);
        }

        let root = path.canonicalize().with_path(path)?;
        Ok(Self {
            ignore: Ignore::load(&root)?,
            storage: Storage::new(&control),
            config: Config::load(&control)?,
            root,
        })
    }

    #[inline]
    #[must_use]
    pub fn control_dir(&self) -> PathBuf {
        self.root.join(CONTROL_DIR)
    }

    //
    //
    // Objects
    //
    //

    pub fn read_object(&self, hash: &Hash) -> Result<Object> {
        let data = self.storage.get(hash)?;
        Object::decode(&data).map_err(|_| Error::CorruptObject(hash_to_hex(hash)))
    }

    pub fn write_object(&self, obj: &Object) -> Result<Hash> {
        let data = obj.encode();
        let hash = hash_bytes(&data);
        self.storage.put_with_hash(&hash, &data)?;
        Ok(hash)
    }

    pub fn write_blob(&self, bytes: &[u8]) -> Result<Hash> {
        let mut buf = Vec::with_capacity(bytes.len() + 13);
        encode_blob_into(bytes, &mut buf);
        let hash = hash_bytes(&buf);
        self.storage.put_with_hash(&hash, &buf)?;
        Ok(hash)
    }

    pub fn read_blob(&self, hash: &Hash) -> Result<Box<[u8]>> {
        Ok(self.read_object(hash)?.try_into_blob()?.data)
    }

    pub fn read_tree(&self, hash: &Hash) -> Result<Tree> {
        self.read_object(hash)?.try_into_tree()
    }

    pub fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        match self.read_object(hash) {
            Ok(obj) => obj
                .try_into_commit()
                .map_err(|_| Error::CommitMissing(hash_to_hex(hash))),
            Err(Error::ObjectMissing(hex)) => Err(Error::CommitMissing(hex)),
            Err(e) => Err(e),
        }
    }

    //
    //
    // Refs and HEAD
    //
    //

    pub fn read_ref(&self, name: &str) -> Result<Option<Hash>> {
        refs::read_ref(&self.control_dir(), name)
    }

    pub fn write_ref(&self, name: &str, hash: &Hash) -> Result<()> {
        refs::write_ref(&self.control_dir(), name, hash)
    }

    pub fn delete_ref(&self, name: &str) -> Result<bool> {
        refs::delete_ref(&self.control_dir(), name)
    }

    pub fn resolve_ref(&self, name: &str) -> Result<Option<Hash>> {
        refs::resolve(&self.control_dir(), name)
    }

    pub fn head(&self) -> Result<Head> {
        refs::read_head(&self.control_dir())
    }

    /// Commit HEAD currently points at; `None` while the current branch
    /// has no commits yet.
    pub fn head_commit(&self) -> Result<Option<Hash>> {
        Ok(self.head()?.commit())
    }

    /// Current branch name, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.head()?.branch().map(ToOwned::to_owned))
    }

    /// Move HEAD's target to a new commit: the checked-out branch when
    /// symbolic, HEAD itself when detached.
    pub fn advance_head(&self, commit: &Hash) -> Result<()> {
        match self.head()? {
            Head::Symbolic { target, .. } => refs::write_ref(&self.control_dir(), &target, commit),
            Head::Detached(_) => refs::set_head_detached(&self.control_dir(), commit),
        }
    }

    /// Resolve a revision string: `HEAD`, a branch, a tag, or a hex id.
    pub fn resolve_revision(&self, target: &str) -> Result<Hash> {
        if target == "HEAD" {
            return self
                .head_commit()?
                .ok_or_else(|| Error::InvalidArgument("HEAD has no commits yet".into()));
        }

        let branch_ref = format!("refs/heads/{target}");
        if let Some(hash) = self.read_ref(&branch_ref)? {
            return Ok(hash);
        }

        if let Some(hash) = crate::tag::peel(self, target)? {
            return Ok(hash);
        }

        if looks_like_hash(target) {
            let hash = hex_to_hash(target)?;
            if self.storage.exists(&hash) {
                return Ok(hash);
            }
        }

        Err(Error::InvalidArgument(format!(
            "unknown revision '{target}'"
        )))
    }

    //
    //
    // Merge state
    //
    //

    pub fn merge_head(&self) -> Result<Option<Hash>> {
        let path = self.control_dir().join("MERGE_HEAD");
        match fs::read_to_string(&path) {
            Ok(content) => hex_to_hash(content.trim()).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    pub fn set_merge_head(&self, hash: &Hash) -> Result<()> {
        atomic_write(
            &self.control_dir().join("MERGE_HEAD"),
            format!("{}\n", hash_to_hex(hash)).as_bytes(),
        )
    }

    pub fn clear_merge_head(&self) -> Result<()> {
        let path = self.control_dir().join("MERGE_HEAD");
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    //
    //
    // Graph walks
    //
    //

    /// Walk the commit graph from `start` over all parents, collecting
    /// reachable commit hashes.
    pub fn reachable_commits(&self, start: &Hash) -> Xxh3HashSet<Hash> {
        let mut visited = Xxh3HashSet::default();
        let mut stack = vec![*start];

        while let Some(hash) = stack.pop() {
            if visited.contains(&hash) {
                continue;
            }
            visited.insert(hash);

            if let Ok(commit) = self.read_commit(&hash) {
                stack.extend(commit.parents.iter().copied());
            }
        }

        visited
    }

    /// Flatten a tree to full-path blob entries. Iterative stack walk, no
    /// recursion.
    pub fn flatten_tree(&self, tree_hash: &Hash) -> Result<BTreeMap<String, TreeItem>> {
        struct Frame {
            tree: Tree,
            prefix: String,
        }

        let mut out = BTreeMap::new();
        let mut stack = vec![Frame {
            tree: self.read_tree(tree_hash)?,
            prefix: String::new(),
        }];

        while let Some(frame) = stack.pop() {
            for entry in &frame.tree {
                let path = if frame.prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", frame.prefix, entry.name)
                };

                if entry.mode == MODE_DIR {
                    stack.push(Frame {
                        tree: self.read_tree(&entry.hash)?,
                        prefix: path,
                    });
                } else {
                    out.insert(
                        path,
                        TreeItem {
                            hash: entry.hash,
                            mode: entry.mode,
                        },
                    );
                }
            }
        }

        Ok(out)
    }

    /// Tree of the given commit, flattened. An absent commit flattens to
    /// the empty mapping, which is the shape of an unborn branch.
    pub fn flatten_commit_tree(&self, commit: Option<&Hash>) -> Result<BTreeMap<String, TreeItem>> {
        match commit {
            Some(hash) => {
                let commit = self.read_commit(hash)?;
                self.flatten_tree(&commit.tree)
            }
            None => Ok(BTreeMap::new()),
        }
    }
}
