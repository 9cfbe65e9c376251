use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use xxhash_rust::xxh3::Xxh3DefaultBuilder;

use crate::error::{Error, IoResultExt, Result};

pub type Xxh3HashMap<K, V> = HashMap<K, V, Xxh3DefaultBuilder>;
pub type Xxh3HashSet<K> = HashSet<K, Xxh3DefaultBuilder>;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Atomic file replacement: temp in the same directory, fsync, rename,
/// fsync the directory. First rename wins under concurrent writers.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidArgument(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent).with_path(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("no file name in {}", path.display())))?
        .to_string_lossy()
        .into_owned();
    let tmp = parent.join(format!(
        ".{file_name}.tmp-{}-{}",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    {
        let mut f = File::create(&tmp).with_path(&tmp)?;
        f.write_all(content).with_path(&tmp)?;
        f.sync_all().with_path(&tmp)?;
    }
    fs::rename(&tmp, path).with_path(path)?;
    sync_dir(parent)
}

pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir).with_path(dir)?.sync_all().with_path(dir)?;
    }
    Ok(())
}
