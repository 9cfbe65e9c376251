use crate::error::{Error, IoResultExt, Result};
use crate::hash::{hash_bytes, hash_to_hex, Hash};
use crate::util::sync_dir;

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Loose-object store: every object lives in its own file named by its
/// hash, sharded by the first two hex chars to keep directories narrow.
/// Objects are write-once; concurrent writers of the same bytes race to
/// an identical result.
pub struct Storage {
    objects_dir: PathBuf,
}

impl Storage {
    #[must_use]
    pub fn new(control_dir: &Path) -> Self {
        Self {
            objects_dir: control_dir.join("objects"),
        }
    }

    fn object_path(&self, hash: &Hash) -> PathBuf {
        let hex = hash_to_hex(hash);
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    #[inline]
    #[must_use]
    pub fn exists(&self, hash: &Hash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Hash the bytes, persist them if absent, return the hash. Idempotent.
    pub fn put(&self, data: &[u8]) -> Result<Hash> {
        let hash = hash_bytes(data);
        self.put_with_hash(&hash, data)?;
        Ok(hash)
    }

    /// Write-if-absent with the hash already computed by the caller.
    /// Durable before return: temp file + fsync + rename + directory fsync.
    pub fn put_with_hash(&self, hash: &Hash, data: &[u8]) -> Result<()> {
        let path = self.object_path(hash);
        if path.is_file() {
            return Ok(());
        }

        let dir = path.parent().expect("object path has a shard directory");
        fs::create_dir_all(dir).with_path(dir)?;

        // Unique per writer: parallel staging can race on identical blobs.
        let tmp = dir.join(format!(
            ".tmp-{}-{}-{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed),
            &hash_to_hex(hash)[..16]
        ));
        {
            let mut f = File::create(&tmp).with_path(&tmp)?;
            f.write_all(data).with_path(&tmp)?;
            f.sync_all().with_path(&tmp)?;
        }
        fs::rename(&tmp, &path).with_path(&path)?;
        sync_dir(dir)
    }

    /// Read back encoded object bytes, verifying the content hash against
    /// the file name.
    pub fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let path = self.object_path(hash);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ObjectMissing(hash_to_hex(hash)));
            }
            Err(e) => return Err(Error::Io { path, source: e }),
        };

        if hash_bytes(&data) != *hash {
            return Err(Error::CorruptObject(hash_to_hex(hash)));
        }
        Ok(data)
    }
}
