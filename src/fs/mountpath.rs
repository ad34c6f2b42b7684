//! Mountpath descriptors
//!
//! A mountpath is a local directory serviced by exactly one local filesystem.
//! Mountpaths of the form `<filesystem-mountpoint>/a/b/c` are supported; what
//! matters is that different mountpaths map onto different filesystems.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::probe::FsIdentity;

// =============================================================================
// Filesystem Identity
// =============================================================================

/// Opaque identity of a mounted filesystem instance.
///
/// Two directories with equal `FsId` live on the same physical filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsId(pub u64);

impl fmt::Display for FsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for FsId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// =============================================================================
// Mountpath Info
// =============================================================================

/// Descriptor of one registered mountpath.
///
/// Built once when the mountpath is added and never mutated afterwards. The
/// registry hands out `Arc<MountpathInfo>` so the same descriptor is shared by
/// every snapshot that contains the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountpathInfo {
    /// Cleaned absolute directory path
    pub path: PathBuf,
    /// Identity of the backing filesystem
    pub fsid: FsId,
    /// Filesystem type, e.g. `ext4` or `xfs`
    pub fs_type: String,
    /// Source of the mount containing the path, e.g. `/dev/sda1`
    pub fs_name: String,
}

impl MountpathInfo {
    /// Create a descriptor from a cleaned path and its probed identity
    pub fn new(path: PathBuf, identity: FsIdentity) -> Self {
        Self {
            path,
            fsid: identity.fsid,
            fs_type: identity.fs_type,
            fs_name: identity.fs_name,
        }
    }
}

impl fmt::Display for MountpathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (fs={}, type={}, fsid={})",
            self.path.display(),
            self.fs_name,
            self.fs_type,
            self.fsid
        )
    }
}

// =============================================================================
// Path Cleaning
// =============================================================================

/// Lexically clean a mountpath.
///
/// Relative paths are anchored at the current working directory, `.` and
/// repeated or trailing separators are dropped and `..` is resolved against
/// the preceding component. Symlinks are left alone: a mountpath whose disk
/// has gone away must still be addressable by the name it was added under.
pub fn clean_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let anchored;
    let path = if path.is_relative() {
        match std::env::current_dir() {
            Ok(cwd) => {
                anchored = cwd.join(path);
                anchored.as_path()
            }
            Err(_) => path,
        }
    } else {
        path
    };

    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => cleaned.push(prefix.as_os_str()),
            Component::RootDir => cleaned.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            Component::Normal(name) => cleaned.push(name),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}
