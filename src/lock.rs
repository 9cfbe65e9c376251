//! Advisory file lock guarding the staging index. Every read-modify-write
//! cycle on `index` runs with this held, including across processes.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const LOCK_RETRIES: u32 = 5;
const LOCK_RETRY_BASE: Duration = Duration::from_millis(50);

/// A holder that stopped refreshing its lock for this long is presumed
/// dead and the lock is stolen.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    /// Acquire `<control>/index.lock`, retrying with exponential back-off.
    pub fn acquire(control: &Path) -> Result<Self> {
        let path = control.join("index.lock");
        let mut delay = LOCK_RETRY_BASE;

        for attempt in 0..=LOCK_RETRIES {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        tracing::warn!(lock = %path.display(), "breaking stale index lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if attempt < LOCK_RETRIES {
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                }
                Err(e) => {
                    return Err(Error::Io {
                        path: path.clone(),
                        source: e,
                    });
                }
            }
        }

        Err(Error::LockTimeout)
    }
}

fn lock_is_stale(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        // Vanished between the failed create and now; next attempt decides.
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
