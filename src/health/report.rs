//! Node Health Report
//!
//! What the health endpoints answer. Everything is derived from one registry
//! snapshot, so a report never mixes states from before and after a
//! mutation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::fs::{FsId, MountedFs, MountpathState, Mountpaths};

/// Overall condition of a storage target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Every mountpath is available
    Healthy,
    /// Some mountpaths are disabled but data can still be stored
    Degraded,
    /// No mountpath can take data
    Unhealthy,
}

impl HealthStatus {
    /// Status of a target with the given mountpaths
    pub fn of(mountpaths: &Mountpaths) -> Self {
        if mountpaths.is_out_of_capacity() {
            HealthStatus::Unhealthy
        } else if mountpaths.num_disabled() > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// One registered mountpath as shown in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountpathReport {
    pub path: PathBuf,
    pub state: MountpathState,
    pub fsid: FsId,
    pub fs_type: String,
    pub fs_name: String,
}

/// Full health report of a storage target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Derived from the mountpath counts
    pub status: HealthStatus,
    pub num_available: usize,
    pub num_disabled: usize,
    /// Sorted by path
    pub mountpaths: Vec<MountpathReport>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthReport {
    /// Build a report from one snapshot
    pub fn new(mountpaths: &Mountpaths, uptime: Duration) -> Self {
        let mut entries: Vec<MountpathReport> = mountpaths
            .iter()
            .map(|(state, mpath)| MountpathReport {
                path: mpath.path.clone(),
                state,
                fsid: mpath.fsid,
                fs_type: mpath.fs_type.clone(),
                fs_name: mpath.fs_name.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Self {
            status: HealthStatus::of(mountpaths),
            num_available: mountpaths.num_available(),
            num_disabled: mountpaths.num_disabled(),
            mountpaths: entries,
            version: crate::VERSION.to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Liveness and readiness of a storage target.
///
/// Live until shutdown begins; ready while at least one mountpath is
/// available.
pub struct NodeHealth {
    start_time: Instant,
    live: AtomicBool,
    mfs: Arc<MountedFs>,
}

impl NodeHealth {
    pub fn new(mfs: Arc<MountedFs>) -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
            mfs,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Cleared when shutdown begins
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        !self.mfs.mountpaths().is_out_of_capacity()
    }

    /// Report over the current snapshot
    pub fn report(&self) -> HealthReport {
        HealthReport::new(&self.mfs.mountpaths(), self.uptime())
    }
}
