use crate::error::{Error, Result};
use crate::hash::{hash_bytes, hash_to_hex, hex_to_hash, Hash};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const MODE_FILE: u32 = 0o100644;
pub const MODE_EXEC: u32 = 0o100755;
pub const MODE_DIR: u32 = 0o040000;

/// One immutable, content-addressed record. Every object file starts
/// with a one-line kind header; blob payloads are raw bytes, tree and
/// commit payloads are a TOML document with a fixed field order. The
/// hash of an object is the hash of this encoding, so re-encoding the
/// same logical object always yields the same bytes and the same id.
#[derive(Debug, Clone)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

#[derive(Serialize, Deserialize)]
struct TreeEntryRecord {
    name: String,
    mode: u32,
    hash: String,
}

#[derive(Serialize, Deserialize, Default)]
struct TreeDoc {
    #[serde(default)]
    entry: Vec<TreeEntryRecord>,
}

#[derive(Serialize, Deserialize)]
struct CommitDoc {
    tree: String,
    parents: Vec<String>,
    timestamp: i64,
    author: String,
    message: String,
}

impl Object {
    #[inline]
    pub fn try_as_commit(&self) -> Result<&Commit> {
        match self {
            Self::Commit(c) => Ok(c),
            _ => Err(Error::InvalidArgument("object is not a commit".into())),
        }
    }

    #[inline]
    pub fn try_as_tree(&self) -> Result<&Tree> {
        match self {
            Self::Tree(t) => Ok(t),
            _ => Err(Error::InvalidArgument("object is not a tree".into())),
        }
    }

    #[inline]
    pub fn try_as_blob(&self) -> Result<&Blob> {
        match self {
            Self::Blob(b) => Ok(b),
            _ => Err(Error::InvalidArgument("object is not a blob".into())),
        }
    }

    #[inline]
    pub fn try_into_commit(self) -> Result<Commit> {
        match self {
            Self::Commit(c) => Ok(c),
            _ => Err(Error::InvalidArgument("object is not a commit".into())),
        }
    }

    #[inline]
    pub fn try_into_tree(self) -> Result<Tree> {
        match self {
            Self::Tree(t) => Ok(t),
            _ => Err(Error::InvalidArgument("object is not a tree".into())),
        }
    }

    #[inline]
    pub fn try_into_blob(self) -> Result<Blob> {
        match self {
            Self::Blob(b) => Ok(b),
            _ => Err(Error::InvalidArgument("object is not a blob".into())),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Object::Blob(blob) => {
                let mut buf = Vec::with_capacity(blob.data.len() + 16);
                encode_blob_into(&blob.data, &mut buf);
                buf
            }
            Object::Tree(tree) => {
                let mut buf = b"tree\n".to_vec();
                buf.extend_from_slice(tree.to_text().as_bytes());
                buf
            }
            Object::Commit(commit) => {
                let mut buf = b"commit\n".to_vec();
                buf.extend_from_slice(commit.to_text().as_bytes());
                buf
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(Error::Malformed("missing object header"))?;
        let header = std::str::from_utf8(&data[..newline])
            .map_err(|_| Error::Malformed("invalid object header"))?;
        let body = &data[newline + 1..];

        if let Some(len) = header.strip_prefix("blob ") {
            let len: usize = len
                .parse()
                .map_err(|_| Error::Malformed("invalid blob length"))?;
            if body.len() != len {
                return Err(Error::Malformed("blob length mismatch"));
            }
            return Ok(Object::Blob(Blob {
                data: body.to_vec().into_boxed_slice(),
            }));
        }

        match header {
            "tree" => Ok(Object::Tree(Tree::from_text(body)?)),
            "commit" => Ok(Object::Commit(Commit::from_text(body)?)),
            _ => Err(Error::Malformed("unknown object kind")),
        }
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.encode())
    }
}

/// Encode raw file bytes as a blob object without constructing a `Blob`.
/// Hot path for staging: one copy into `buf`, no intermediate clone.
/// The payload after the header is byte-exact, never re-encoded.
#[inline]
pub fn encode_blob_into(data: &[u8], buf: &mut Vec<u8>) {
    buf.clear();
    buf.extend_from_slice(format!("blob {}\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
}

/// Object id of `data` stored as a blob.
#[inline]
#[must_use]
pub fn blob_object_hash(data: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(data.len() + 16);
    encode_blob_into(data, &mut buf);
    hash_bytes(&buf)
}

/// Opaque file contents. Binary-safe: the header carries the exact byte
/// length and the payload is stored verbatim.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Box<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub hash: Hash,
    pub name: String,
    pub mode: u32,
}

/// One directory level of a snapshot. Entries are held sorted by name,
/// so the serialized document is canonical and identity does not depend
/// on insertion order.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }
        entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(Error::InvalidArgument(format!(
                    "duplicate tree entry '{}'",
                    pair[0].name
                )));
            }
        }
        Ok(Tree { entries })
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    fn to_text(&self) -> String {
        let doc = TreeDoc {
            entry: self
                .entries
                .iter()
                .map(|e| TreeEntryRecord {
                    name: e.name.clone(),
                    mode: e.mode,
                    hash: hash_to_hex(&e.hash),
                })
                .collect(),
        };
        toml::to_string(&doc).expect("tree document always serializes")
    }

    fn from_text(body: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(body).map_err(|_| Error::Malformed("tree payload is not utf-8"))?;
        let doc: TreeDoc =
            toml::from_str(text).map_err(|_| Error::Malformed("invalid tree payload"))?;

        let entries = doc
            .entry
            .into_iter()
            .map(|record| {
                Ok(TreeEntry {
                    hash: hex_to_hash(&record.hash)
                        .map_err(|_| Error::Malformed("invalid hash in tree"))?,
                    name: record.name,
                    mode: record.mode,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Tree::from_entries(entries)
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Reject names that would break path reconstruction: tree entries are
/// single components, never paths.
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("empty tree entry name".into()));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidArgument(format!("invalid tree entry name '{name}'")));
    }
    if name.contains('/') {
        return Err(Error::InvalidArgument(format!(
            "tree entry name '{name}' contains a path separator"
        )));
    }
    if name.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(Error::InvalidArgument(format!(
            "tree entry name '{name}' contains control bytes"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub parents: SmallVec<[Hash; 2]>,
    pub timestamp: i64,
    pub author: Box<str>,
    pub message: Box<str>,

    pub tree: Hash,
}

impl Commit {
    fn to_text(&self) -> String {
        let doc = CommitDoc {
            tree: hash_to_hex(&self.tree),
            parents: self.parents.iter().map(hash_to_hex).collect(),
            timestamp: self.timestamp,
            author: self.author.to_string(),
            message: self.message.to_string(),
        };
        toml::to_string(&doc).expect("commit document always serializes")
    }

    fn from_text(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|_| Error::Malformed("commit payload is not utf-8"))?;
        let doc: CommitDoc =
            toml::from_str(text).map_err(|_| Error::Malformed("invalid commit payload"))?;

        let tree =
            hex_to_hash(&doc.tree).map_err(|_| Error::Malformed("invalid tree hash in commit"))?;
        let mut parents = SmallVec::with_capacity(doc.parents.len());
        for parent in &doc.parents {
            parents
                .push(hex_to_hash(parent).map_err(|_| Error::Malformed("invalid parent hash"))?);
        }

        Ok(Commit {
            tree,
            parents,
            timestamp: doc.timestamp,
            author: doc.author.into(),
            message: doc.message.into(),
        })
    }
}
