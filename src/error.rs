//! Error types for the storage-target filesystem layer

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the storage-target filesystem layer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Mountpath Registry Errors
    // =========================================================================
    /// Path does not exist or is not a directory
    #[error("fspath {path:?} does not exist or is not a directory: {reason}")]
    PathNotFound { path: PathBuf, reason: String },

    /// OS-level filesystem identity probe failed
    #[error("cannot probe filesystem of fspath {path:?}: {reason}")]
    ProbeFailure { path: PathBuf, reason: String },

    /// Path already registered as available
    #[error("tried to add already registered mountpath: {path:?}")]
    DuplicateMountpath { path: PathBuf },

    /// Filesystem identity already claimed by another mountpath
    #[error("tried to add path {path:?} but same fsid {fsid} was already registered by {owner:?}")]
    FsidCollision {
        path: PathBuf,
        owner: PathBuf,
        fsid: String,
    },

    /// Path unknown to the registry
    #[error("mountpath {path:?} is neither available nor disabled")]
    MountpathNotFound { path: PathBuf },

    /// No mountpaths supplied at startup
    #[error("FATAL: no fspaths configured - a storage target needs at least one mountpath")]
    EmptyConfiguration,

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the node must stop when it sees this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EmptyConfiguration)
    }

    /// The mountpath the error refers to, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::PathNotFound { path, .. }
            | Error::ProbeFailure { path, .. }
            | Error::DuplicateMountpath { path }
            | Error::FsidCollision { path, .. }
            | Error::MountpathNotFound { path } => Some(path),
            _ => None,
        }
    }
}
