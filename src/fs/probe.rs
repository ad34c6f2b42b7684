//! Filesystem Probing
//!
//! The registry never talks to the OS directly: it asks an [`FsProbe`] whether
//! a directory exists, which filesystem backs it and how full that filesystem
//! is. [`SystemProbe`] answers from `statvfs(2)` and the kernel mount table;
//! [`StaticProbe`] answers from an in-memory table and is what tests use to
//! get deterministic filesystem ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::mountpath::{clean_path, FsId};
use crate::error::{Error, Result};

/// Default location of the kernel mount table
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/self/mounts";

/// Reported when the mount table has no entry covering a path
pub const UNKNOWN_FS: &str = "unknown";

// =============================================================================
// Probe Results
// =============================================================================

/// Identity of the filesystem backing a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsIdentity {
    /// Filesystem id
    pub fsid: FsId,
    /// Filesystem type, e.g. `ext4`
    pub fs_type: String,
    /// Mount source, e.g. `/dev/nvme0n1p1`
    pub fs_name: String,
}

impl FsIdentity {
    /// Identity with only an fsid known
    pub fn with_fsid(fsid: impl Into<FsId>) -> Self {
        Self {
            fsid: fsid.into(),
            fs_type: UNKNOWN_FS.to_string(),
            fs_name: UNKNOWN_FS.to_string(),
        }
    }
}

/// Space accounting of the filesystem backing a directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsUsage {
    /// Total size in bytes
    pub total_bytes: u64,
    /// Free bytes, including blocks reserved for root
    pub free_bytes: u64,
    /// Bytes available to unprivileged writers
    pub available_bytes: u64,
}

impl FsUsage {
    /// Bytes in use
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

// =============================================================================
// Probe Port
// =============================================================================

/// OS seam used by the mountpath registry and the capacity scan
pub trait FsProbe: Send + Sync {
    /// Fail with `PathNotFound` unless `path` is an existing directory
    fn check_dir(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::PathNotFound {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(Error::PathNotFound {
                path: path.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(())
    }

    /// Identify the filesystem backing `path`
    fn probe(&self, path: &Path) -> Result<FsIdentity>;

    /// Report space usage of the filesystem backing `path`
    fn usage(&self, path: &Path) -> Result<FsUsage>;
}

fn probe_failure(path: &Path, reason: impl ToString) -> Error {
    Error::ProbeFailure {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Mount Table
// =============================================================================

/// One line of the kernel mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount source (device or pseudo-filesystem name)
    pub source: String,
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem type
    pub fs_type: String,
}

/// Parse the `/proc/mounts` format.
///
/// Malformed lines are skipped. Octal escapes (`\040` for space etc.) in the
/// source and mount point are decoded.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                source: unescape_mount_field(source),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Find the mount covering `path`: the longest mount point that is a prefix of
/// it. Among equal mount points the later entry wins, since it shadows the
/// earlier one.
pub fn find_mount<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    let mut best: Option<&MountEntry> = None;
    for entry in entries {
        if !path.starts_with(&entry.mount_point) {
            continue;
        }
        let depth = entry.mount_point.components().count();
        match best {
            Some(current) if current.mount_point.components().count() > depth => {}
            _ => best = Some(entry),
        }
    }
    best
}

// =============================================================================
// System Probe
// =============================================================================

/// Probe backed by `statvfs(2)` and the kernel mount table
#[derive(Debug, Clone)]
pub struct SystemProbe {
    mount_table: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    /// Probe reading `/proc/self/mounts`
    pub fn new() -> Self {
        Self::with_mount_table(DEFAULT_MOUNT_TABLE)
    }

    /// Probe reading an alternative mount table file
    pub fn with_mount_table(mount_table: impl Into<PathBuf>) -> Self {
        Self {
            mount_table: mount_table.into(),
        }
    }

    /// Resolve (source, type) of the mount covering `path`.
    ///
    /// The mount table is informational, so an unreadable table or a path it
    /// does not cover yields `unknown` rather than an error.
    #[cfg_attr(not(unix), allow(dead_code))]
    fn lookup_mount(&self, path: &Path) -> (String, String) {
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let content = match std::fs::read_to_string(&self.mount_table) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(
                    "cannot read mount table {}: {}",
                    self.mount_table.display(),
                    e
                );
                return (UNKNOWN_FS.to_string(), UNKNOWN_FS.to_string());
            }
        };

        let entries = parse_mount_table(&content);
        match find_mount(&entries, &resolved) {
            Some(entry) => (entry.source.clone(), entry.fs_type.clone()),
            None => (UNKNOWN_FS.to_string(), UNKNOWN_FS.to_string()),
        }
    }
}

#[cfg(unix)]
impl FsProbe for SystemProbe {
    fn probe(&self, path: &Path) -> Result<FsIdentity> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|e| probe_failure(path, e))?;
        let (fs_name, fs_type) = self.lookup_mount(path);

        Ok(FsIdentity {
            fsid: FsId(stat.filesystem_id() as u64),
            fs_type,
            fs_name,
        })
    }

    fn usage(&self, path: &Path) -> Result<FsUsage> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|e| probe_failure(path, e))?;
        let fragment = stat.fragment_size() as u64;

        Ok(FsUsage {
            total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
            free_bytes: (stat.blocks_free() as u64).saturating_mul(fragment),
            available_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
        })
    }
}

#[cfg(not(unix))]
impl FsProbe for SystemProbe {
    fn probe(&self, path: &Path) -> Result<FsIdentity> {
        Err(probe_failure(path, "filesystem identity is not supported on this platform"))
    }

    fn usage(&self, path: &Path) -> Result<FsUsage> {
        Err(probe_failure(path, "filesystem usage is not supported on this platform"))
    }
}

// =============================================================================
// Static Probe
// =============================================================================

#[derive(Debug, Clone)]
struct StaticEntry {
    identity: FsIdentity,
    usage: FsUsage,
    failing: bool,
}

/// In-memory probe for tests and dry runs.
///
/// Only paths registered through [`StaticProbe::insert`] exist; each carries
/// the identity and usage it was given. Paths are cleaned on the way in so
/// lookups match what the registry asks for.
#[derive(Debug, Default)]
pub struct StaticProbe {
    entries: RwLock<HashMap<PathBuf, StaticEntry>>,
}

impl StaticProbe {
    /// Create an empty probe
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticProbe::insert`]
    pub fn with(self, path: impl AsRef<Path>, fsid: u64) -> Self {
        self.insert(path, FsIdentity::with_fsid(fsid));
        self
    }

    /// Make `path` an existing directory on a filesystem with `identity`
    pub fn insert(&self, path: impl AsRef<Path>, identity: FsIdentity) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(clean_path(path))
            .or_insert_with(|| StaticEntry {
                identity: identity.clone(),
                usage: FsUsage::default(),
                failing: false,
            });
        entry.identity = identity;
    }

    /// Set the usage reported for `path`
    pub fn set_usage(&self, path: impl AsRef<Path>, usage: FsUsage) {
        if let Some(entry) = self.entries.write().get_mut(&clean_path(path)) {
            entry.usage = usage;
        }
    }

    /// Make probes of `path` fail while the directory keeps existing
    pub fn set_failing(&self, path: impl AsRef<Path>, failing: bool) {
        if let Some(entry) = self.entries.write().get_mut(&clean_path(path)) {
            entry.failing = failing;
        }
    }

    fn lookup(&self, path: &Path) -> Result<StaticEntry> {
        let entry = self
            .entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| probe_failure(path, "no such filesystem"))?;
        if entry.failing {
            return Err(probe_failure(path, "injected probe failure"));
        }
        Ok(entry)
    }
}

impl FsProbe for StaticProbe {
    fn check_dir(&self, path: &Path) -> Result<()> {
        if self.entries.read().contains_key(path) {
            Ok(())
        } else {
            Err(Error::PathNotFound {
                path: path.to_path_buf(),
                reason: "no such directory".to_string(),
            })
        }
    }

    fn probe(&self, path: &Path) -> Result<FsIdentity> {
        self.lookup(path).map(|entry| entry.identity)
    }

    fn usage(&self, path: &Path) -> Result<FsUsage> {
        self.lookup(path).map(|entry| entry.usage)
    }
}
