use std::path::PathBuf;

/// Error taxonomy for engine operations. Internal helpers return these;
/// user-facing entry points surface exactly one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a riv repository (missing .riv directory)")]
    RepositoryNotFound,

    #[error("repository already exists at {0}")]
    RepositoryExists(PathBuf),

    #[error("malformed HEAD: {0}")]
    InvalidHead(String),

    #[error("object not found: {0}")]
    ObjectMissing(String),

    #[error("corrupt object {0}: content does not match its hash")]
    CorruptObject(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("commit not found: {0}")]
    CommitMissing(String),

    #[error("ref already exists: {0}")]
    RefExists(String),

    #[error("ref not found: {0}")]
    RefMissing(String),

    #[error("cannot delete branch '{0}': it is currently checked out")]
    BranchInUse(String),

    #[error("merge conflicts in: {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    #[error("uncommitted changes would be lost; commit them or force the operation")]
    DirtyWorkspace,

    #[error("timed out waiting for the index lock")]
    LockTimeout,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("truncated or malformed data: {0}")]
    Malformed(&'static str),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach the offending path to raw io errors.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
