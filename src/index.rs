use crate::error::{Error, Result};
use crate::hash::{hash_to_hex, hex_to_hash, Hash};
use crate::ignore::Ignore;
use crate::lock::IndexLock;
use crate::object::{blob_object_hash, Object, Tree, TreeEntry, MODE_DIR, MODE_EXEC, MODE_FILE};
use crate::repository::Repository;
use crate::util::{atomic_write, Xxh3HashMap};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

/// Entry is part of the pending next commit.
pub const FLAG_STAGED: u8 = 1 << 0;
/// Entry holds conflict markers from an unresolved merge.
pub const FLAG_CONFLICT: u8 = 1 << 1;

// On-disk shape: a TOML document, one [[entry]] table per path, sorted
// by path:
//
// [[entry]]
// path = "src/a.rs"
// hash = "<hex>"
// size = 10
// mtime = 111
// mode = 33188
// staged = true
// conflict = false

#[derive(Serialize, Deserialize)]
struct EntryRecord {
    path: String,
    hash: String,
    size: u64,
    mtime: i64,
    mode: u32,
    staged: bool,
    conflict: bool,
}

#[derive(Serialize, Deserialize, Default)]
struct IndexDoc {
    #[serde(default)]
    entry: Vec<EntryRecord>,
}

/// The staging index: a flat mapping from workspace-relative path to the
/// blob that the next commit will contain, plus the stat triple used to
/// skip rehashing unchanged files. A commit flushes the entries into a
/// tree and clears the index, so an empty index means nothing staged;
/// consumers that need the full next-commit view seed it from HEAD via
/// [`Index::seed_if_empty`].
#[derive(Default)]
pub struct Index {
    pub count: usize,

    pub modes: Vec<u32>,
    pub hashes: Vec<Hash>,
    pub mtimes: Vec<i64>,
    pub sizes: Vec<u64>,
    pub flags: Vec<u8>,

    pub path_offsets: Vec<u32>,
    pub paths_blob: Vec<u8>,

    /// Path hash -> entry index (or indices on collision). No duplicate
    /// path storage.
    path_index: Xxh3HashMap<u64, Vec<usize>>,
}

pub struct IndexEntryRef<'a> {
    pub hash: &'a Hash,
    pub mtime: i64,
    pub size: u64,
    pub path: &'a str,

    pub mode: u32,
    pub flags: u8,
}

impl IndexEntryRef<'_> {
    #[inline]
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.flags & FLAG_STAGED != 0
    }

    #[inline]
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.flags & FLAG_CONFLICT != 0
    }
}

pub struct IndexIter<'index> {
    index: &'index Index,
    pos: usize,
}

impl<'index> Iterator for IndexIter<'index> {
    type Item = IndexEntryRef<'index>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.count {
            return None;
        }

        let e = IndexEntryRef {
            mode: self.index.modes[self.pos],
            hash: &self.index.hashes[self.pos],
            mtime: self.index.mtimes[self.pos],
            size: self.index.sizes[self.pos],
            flags: self.index.flags[self.pos],
            path: self.index.get_path(self.pos),
        };

        self.pos += 1;

        Some(e)
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = IndexEntryRef<'a>;
    type IntoIter = IndexIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Workspace classification relative to the index.
#[derive(Debug, Default)]
pub struct Changes {
    /// Entries marked for the next commit.
    pub staged: Vec<String>,
    /// On-disk content drifted from the indexed blob, not staged.
    pub modified: Vec<String>,
    /// Indexed path missing from the workspace.
    pub deleted: Vec<String>,
    /// Workspace paths absent from the index and not ignored.
    pub untracked: Vec<String>,
}

impl Index {
    /// Read the index under the lock. Absent file means an empty index.
    pub fn load(control: &Path) -> Result<Self> {
        let _lock = IndexLock::acquire(control)?;
        Self::read_unlocked(control)
    }

    /// Load, then seed from HEAD when empty: the next-commit view for
    /// status and staged-diff consumers. Never persisted by itself.
    pub fn load_effective(repo: &Repository) -> Result<Self> {
        let mut index = Self::load(&repo.control_dir())?;
        index.seed_if_empty(repo)?;
        Ok(index)
    }

    /// Persist under the lock with an atomic rewrite.
    pub fn save(&self, control: &Path) -> Result<()> {
        let _lock = IndexLock::acquire(control)?;
        self.write_unlocked(control)
    }

    /// One lock acquisition spanning the whole read-modify-write cycle.
    /// Concurrent callers serialize here; both see their effects persisted.
    pub fn update<T>(control: &Path, f: impl FnOnce(&mut Index) -> Result<T>) -> Result<T> {
        let _lock = IndexLock::acquire(control)?;
        let mut index = Self::read_unlocked(control)?;
        let out = f(&mut index)?;
        index.write_unlocked(control)?;
        Ok(out)
    }

    pub(crate) fn read_unlocked(control: &Path) -> Result<Self> {
        let path = control.join("index");
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) => return Err(Error::Io { path, source: e }),
        };
        Self::decode(&data)
    }

    pub(crate) fn write_unlocked(&self, control: &Path) -> Result<()> {
        atomic_write(&control.join("index"), &self.encode())
    }

    fn encode(&self) -> Vec<u8> {
        let mut order = (0..self.count).collect::<Vec<_>>();
        order.sort_unstable_by_key(|&i| self.get_path(i));

        let doc = IndexDoc {
            entry: order
                .iter()
                .map(|&i| EntryRecord {
                    path: self.get_path(i).to_owned(),
                    hash: hash_to_hex(&self.hashes[i]),
                    size: self.sizes[i],
                    mtime: self.mtimes[i],
                    mode: self.modes[i],
                    staged: self.flags[i] & FLAG_STAGED != 0,
                    conflict: self.flags[i] & FLAG_CONFLICT != 0,
                })
                .collect(),
        };

        toml::to_string(&doc)
            .expect("index document always serializes")
            .into_bytes()
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::CorruptIndex("not utf-8".to_owned()))?;
        let doc: IndexDoc =
            toml::from_str(text).map_err(|e| Error::CorruptIndex(e.to_string()))?;

        let mut index = Self::default();
        for record in doc.entry {
            let hash = hex_to_hash(&record.hash).map_err(|_| {
                Error::CorruptIndex(format!("bad blob hash for '{}'", record.path))
            })?;
            let mut flags = 0;
            if record.staged {
                flags |= FLAG_STAGED;
            }
            if record.conflict {
                flags |= FLAG_CONFLICT;
            }
            index.upsert(&record.path, hash, record.size, record.mtime, record.mode, flags);
        }
        Ok(index)
    }

    #[inline]
    fn path_hash(path: &str) -> u64 {
        xxh3_64(path.as_bytes())
    }

    #[inline]
    #[must_use]
    fn get_path_impl<'a>(
        count: usize,
        path_offsets: &[u32],
        paths_blob: &'a [u8],
        i: usize,
    ) -> &'a str {
        let start = path_offsets[i] as usize;
        let end = if i + 1 < count {
            path_offsets[i + 1] as usize
        } else {
            paths_blob.len()
        };

        std::str::from_utf8(&paths_blob[start..end]).expect("paths are utf-8 by construction")
    }

    #[inline]
    #[must_use]
    pub fn get_path(&self, i: usize) -> &str {
        Self::get_path_impl(self.count, &self.path_offsets, &self.paths_blob, i)
    }

    #[inline]
    #[must_use]
    pub fn find(&self, path: &str) -> Option<usize> {
        let h = Self::path_hash(path);
        let list = self.path_index.get(&h)?;
        list.iter().copied().find(|&i| self.get_path(i) == path)
    }

    /// Insert or overwrite one entry.
    pub fn upsert(&mut self, path: &str, hash: Hash, size: u64, mtime: i64, mode: u32, flags: u8) {
        let h = Self::path_hash(path);
        if let Some(i) = self
            .path_index
            .get(&h)
            .and_then(|list| list.iter().copied().find(|&idx| self.get_path(idx) == path))
        {
            self.modes[i] = mode;
            self.hashes[i] = hash;
            self.mtimes[i] = mtime;
            self.sizes[i] = size;
            self.flags[i] = flags;
            return;
        }

        self.modes.push(mode);
        self.hashes.push(hash);
        self.mtimes.push(mtime);
        self.sizes.push(size);
        self.flags.push(flags);
        self.path_offsets.push(self.paths_blob.len() as u32);
        self.paths_blob.extend_from_slice(path.as_bytes());
        self.path_index.entry(h).or_default().push(self.count);
        self.count += 1;
    }

    /// Insert from a workspace file's metadata.
    pub fn add_file(&mut self, path: &str, hash: Hash, meta: &fs::Metadata, flags: u8) {
        let mode = if is_executable(meta) { MODE_EXEC } else { MODE_FILE };
        self.upsert(path, hash, meta.len(), mtime_of(meta), mode, flags);
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let h = Self::path_hash(path);
        let (pos, i) = match self.path_index.get(&h) {
            Some(list) => {
                let Some(pos) = list.iter().position(|&idx| self.get_path(idx) == path) else {
                    return false;
                };
                (pos, list[pos])
            }
            None => return false,
        };

        self.modes.remove(i);
        self.hashes.remove(i);
        self.mtimes.remove(i);
        self.sizes.remove(i);
        self.flags.remove(i);

        let owned_path_offsets = core::mem::take(&mut self.path_offsets);
        let owned_path_blob = core::mem::take(&mut self.paths_blob);

        for index in (0..self.count).filter(|&j| j != i) {
            let p = Self::get_path_impl(self.count, &owned_path_offsets, &owned_path_blob, index);
            self.path_offsets.push(self.paths_blob.len() as u32);
            self.paths_blob.extend_from_slice(p.as_bytes());
        }

        self.count -= 1;
        let list = self.path_index.get_mut(&h).expect("entry was found above");
        list.remove(pos);
        if list.is_empty() {
            self.path_index.remove(&h);
        }

        for list in self.path_index.values_mut() {
            for idx in list.iter_mut() {
                if *idx > i {
                    *idx -= 1;
                }
            }
        }

        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    #[must_use]
    pub fn any_staged(&self) -> bool {
        self.flags.iter().any(|f| f & FLAG_STAGED != 0)
    }

    #[must_use]
    pub fn conflicted_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = (0..self.count)
            .filter(|&i| self.flags[i] & FLAG_CONFLICT != 0)
            .map(|i| self.get_path(i).to_owned())
            .collect();
        out.sort_unstable();
        out
    }

    pub fn mark_conflict(&mut self, path: &str) -> bool {
        match self.find(path) {
            Some(i) => {
                self.flags[i] |= FLAG_CONFLICT;
                true
            }
            None => false,
        }
    }

    // Fast dirty check: compare stat triple before hashing. Returns true
    // if the file MIGHT be modified (triggers a full content hash). Any
    // mismatch forces the rehash, so the fast path cannot lie.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, i: usize, metadata: &fs::Metadata) -> bool {
        let mode = if is_executable(metadata) { MODE_EXEC } else { MODE_FILE };
        self.mtimes[i] != mtime_of(metadata)
            || self.sizes[i] != metadata.len()
            || self.modes[i] != mode
    }

    #[inline]
    #[must_use]
    pub fn iter(&self) -> IndexIter<'_> {
        IndexIter { index: self, pos: 0 }
    }

    /// Classify the workspace against the index. For each entry the blob
    /// hash is recomputed from disk unless the stat triple matches.
    pub fn changes(&self, root: &Path, ignore: &Ignore) -> Changes {
        let mut changes = Changes::default();

        for i in 0..self.count {
            let path = self.get_path(i).to_owned();
            let staged = self.flags[i] & FLAG_STAGED != 0;
            if staged {
                changes.staged.push(path.clone());
            }

            let abs = root.join(&path);
            match fs::metadata(&abs) {
                Err(_) => changes.deleted.push(path),
                Ok(meta) => {
                    if !self.is_dirty(i, &meta) {
                        continue;
                    }
                    let Ok(data) = fs::read(&abs) else {
                        changes.deleted.push(path);
                        continue;
                    };
                    if blob_object_hash(&data) != self.hashes[i] && !staged {
                        changes.modified.push(path);
                    }
                }
            }
        }

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !ignore.is_ignored_abs(e.path()))
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if rel_str.is_empty() || ignore.is_ignored_rel(&rel_str) {
                continue;
            }
            if self.find(&rel_str).is_none() {
                changes.untracked.push(rel_str);
            }
        }

        changes.staged.sort_unstable();
        changes.modified.sort_unstable();
        changes.deleted.sort_unstable();
        changes.untracked.sort_unstable();
        changes
    }

    /// Build and persist tree objects from the entries, bottom-up.
    /// Returns the root tree hash.
    pub fn write_tree(&self, repo: &Repository) -> Result<Hash> {
        //
        // Sort entries by path, then consume contiguous slices per
        // directory in a single pass (iterative, no recursion).
        //
        let mut order = (0..self.count).collect::<Vec<_>>();
        order.sort_unstable_by_key(|&i| self.get_path(i));

        let sorted_paths = order.iter().map(|&i| self.get_path(i)).collect::<Vec<_>>();
        let sorted_modes = order.iter().map(|&i| self.modes[i]).collect::<Vec<_>>();
        let sorted_hashes = order.iter().map(|&i| self.hashes[i]).collect::<Vec<_>>();

        let (hash, _consumed) =
            build_tree(repo, &sorted_paths, &sorted_modes, &sorted_hashes)?;
        Ok(hash)
    }

    /// Replace the contents with the blobs of a committed tree. With
    /// `stat_from_disk` the entries record the workspace stat triple
    /// (files were just materialized); without it the recorded stats are
    /// zeroed so the next status is forced to rehash.
    pub fn replace_from_tree(
        &mut self,
        repo: &Repository,
        tree_hash: &Hash,
        stat_from_disk: bool,
    ) -> Result<()> {
        self.clear();

        for (path, item) in repo.flatten_tree(tree_hash)? {
            let (size, mtime) = if stat_from_disk {
                match fs::metadata(repo.root.join(&path)) {
                    Ok(meta) => (meta.len(), mtime_of(&meta)),
                    Err(_) => (0, 0),
                }
            } else {
                (0, 0)
            };
            self.upsert(&path, item.hash, size, mtime, item.mode, 0);
        }
        Ok(())
    }

    /// An empty index means nothing staged. Operations that need the
    /// full next-commit snapshot (staging, status, staged diff) call
    /// this first to fault the HEAD tree in as the baseline.
    pub fn seed_if_empty(&mut self, repo: &Repository) -> Result<()> {
        if self.count > 0 {
            return Ok(());
        }
        if let Some(head) = repo.head_commit()? {
            let commit = repo.read_commit(&head)?;
            self.replace_from_tree(repo, &commit.tree, false)?;
        }
        Ok(())
    }
}

/// Borrow `index` when it has entries, otherwise seed a HEAD-baseline
/// view into `slot` and borrow that. For callers already inside an
/// index lock, where [`Index::load_effective`] would deadlock.
pub(crate) fn effective_view<'a>(
    repo: &Repository,
    index: &'a Index,
    slot: &'a mut Option<Index>,
) -> Result<&'a Index> {
    if index.count > 0 {
        return Ok(index);
    }
    let mut seeded = Index::default();
    seeded.seed_if_empty(repo)?;
    Ok(slot.insert(seeded))
}

// Builds trees for the sorted entry slice; one frame per directory.
// Hot path for `riv commit`, kept iterative on purpose.
fn build_tree(
    repo: &Repository,
    paths: &[&str],
    modes: &[u32],
    hashes: &[Hash],
) -> Result<(Hash, usize)> {
    struct Frame<'a> {
        /// Directory prefix (repo-relative, no leading slash). Root is "".
        dir: &'a str,
        /// Index into `paths` where this directory starts.
        start: usize,
        /// Name used when adding this directory to its parent. Root has None.
        name_in_parent: Option<&'a str>,
        entries: Vec<TreeEntry>,
    }

    let mut stack: Vec<Frame<'_>> = vec![Frame {
        dir: "",
        start: 0,
        name_in_parent: None,
        entries: Vec::new(),
    }];

    let mut i = 0;

    loop {
        let (cur_dir, cur_dir_len) = {
            let f = stack.last().expect("non-empty stack");
            (f.dir, f.dir.len())
        };

        // Finish the current frame when the next path falls outside it.
        let finish_now = if i >= paths.len() {
            true
        } else if cur_dir.is_empty() {
            false
        } else {
            let path_norm = paths[i].trim_start_matches('/');
            !(path_norm.starts_with(cur_dir)
                && path_norm.as_bytes().get(cur_dir_len) == Some(&b'/'))
        };

        if finish_now {
            let done = stack.pop().expect("non-empty stack");

            let tree = Tree::from_entries(done.entries)?;
            let hash = repo.write_object(&Object::Tree(tree))?;
            let consumed = i - done.start;

            if let Some(parent) = stack.last_mut() {
                let name = done.name_in_parent.expect("non-root frame has a name");
                parent.entries.push(TreeEntry {
                    mode: MODE_DIR,
                    hash,
                    name: name.to_owned(),
                });
                continue;
            }

            return Ok((hash, consumed));
        }

        let path_norm = paths[i].trim_start_matches('/');
        let rel = if cur_dir.is_empty() {
            path_norm
        } else {
            &path_norm[cur_dir_len + 1..]
        };

        if rel.is_empty() {
            i += 1;
            continue;
        }

        match rel.find('/') {
            None => {
                // Direct file child.
                let top = stack.last_mut().expect("non-empty stack");
                top.entries.push(TreeEntry {
                    mode: modes[i],
                    hash: hashes[i],
                    name: rel.to_owned(),
                });
                i += 1;
            }
            Some(slash) => {
                // Subdirectory: push a frame and build it first (post-order).
                let subdir_name = &rel[..slash];
                if subdir_name.is_empty() {
                    i += 1;
                    continue;
                }

                let subdir_full = if cur_dir.is_empty() {
                    &path_norm[..slash]
                } else {
                    &path_norm[..cur_dir_len + 1 + slash]
                };

                stack.push(Frame {
                    dir: subdir_full,
                    start: i,
                    name_in_parent: Some(subdir_name),
                    entries: Vec::new(),
                });
            }
        }
    }
}

#[inline]
#[must_use]
pub fn mtime_of(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_: &fs::Metadata) -> bool {
    false
}
