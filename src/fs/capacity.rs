//! Capacity accounting over available mountpaths

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::probe::FsUsage;
use super::registry::MountedFs;

/// Usage of one available mountpath
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountpathCapacity {
    /// Mountpath
    pub path: PathBuf,
    /// Usage of its filesystem
    pub usage: FsUsage,
}

/// A mountpath whose usage could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityFailure {
    /// Mountpath
    pub path: PathBuf,
    /// Probe error
    pub reason: String,
}

/// Capacity of a storage target at one instant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Per-mountpath usage, sorted by path
    pub mountpaths: Vec<MountpathCapacity>,
    /// Mountpaths whose usage probe failed
    pub failed: Vec<CapacityFailure>,
}

impl CapacityReport {
    /// Sum of filesystem sizes
    pub fn total_bytes(&self) -> u64 {
        self.mountpaths.iter().map(|m| m.usage.total_bytes).sum()
    }

    /// Sum of bytes in use
    pub fn used_bytes(&self) -> u64 {
        self.mountpaths.iter().map(|m| m.usage.used_bytes()).sum()
    }

    /// Sum of bytes writable by the target
    pub fn available_bytes(&self) -> u64 {
        self.mountpaths.iter().map(|m| m.usage.available_bytes).sum()
    }

    /// Used share of total capacity, 0-100
    pub fn used_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 * 100.0 / total as f64
    }

    /// True when there is nothing to write to
    pub fn is_empty(&self) -> bool {
        self.mountpaths.is_empty()
    }
}

/// Measure every available mountpath of one registry snapshot.
///
/// Disabled mountpaths are not counted. A failed usage probe is recorded in
/// the report instead of aborting the scan.
pub fn scan(mfs: &MountedFs) -> CapacityReport {
    let current = mfs.mountpaths();
    let mut report = CapacityReport::default();

    for mpath in current.available().values() {
        match mfs.probe().usage(&mpath.path) {
            Ok(usage) => report.mountpaths.push(MountpathCapacity {
                path: mpath.path.clone(),
                usage,
            }),
            Err(e) => {
                warn!("cannot read usage of mountpath {}: {}", mpath.path.display(), e);
                report.failed.push(CapacityFailure {
                    path: mpath.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report.mountpaths.sort_by(|a, b| a.path.cmp(&b.path));
    report.failed.sort_by(|a, b| a.path.cmp(&b.path));
    report
}
