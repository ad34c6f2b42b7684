//! Mountpath Health
//!
//! Keeps the registry honest about which mountpaths can take data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   disable / enable   ┌──────────────────┐
//! │ MountpathHealthChecker   │─────────────────────▶│    MountedFs     │
//! │ (write/read/delete check │                      │                  │
//! │  per mountpath, periodic)│                      └────────┬─────────┘
//! └──────────────────────────┘                               │ snapshot
//!                                                            ▼
//!                                                   ┌──────────────────┐
//!                                                   │ NodeHealth       │
//!                                                   │ (liveness,       │
//!                                                   │  readiness)      │
//!                                                   └──────────────────┘
//! ```

mod checker;
mod report;

pub use checker::{
    CheckFuture, DiskCheck, MountpathCheckResult, MountpathHealth, MountpathHealthChecker,
    ScratchFileCheck, SCRATCH_FILE_PREFIX,
};
pub use report::{HealthReport, HealthStatus, MountpathReport, NodeHealth};
