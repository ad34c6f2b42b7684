//! Storage-Target Filesystem Layer
//!
//! Tracks the local mountpaths a storage target persists objects on.
//!
//! # Terminology
//!
//! - a mountpath is a local directory serviced by a local filesystem;
//! - mountpath and filesystem are 1-to-1: different mountpaths map onto
//!   different filesystems (unless the fsid check is turned off, e.g. for
//!   loopback test setups);
//! - mountpaths of the form `<filesystem-mountpoint>/a/b/c` are supported.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           MountedFs                              │
//! │   writers ──▶ Mutex<fsid index> ──▶ copy, validate, publish      │
//! │                                          │                       │
//! │   readers ◀── ArcSwap<Mountpaths> ◀──────┘                       │
//! │               (available, disabled)                              │
//! └──────────────────────────────────────────────────────────────────┘
//!            │                                   ▲
//!            ▼                                   │
//!      FsProbe (statvfs, mount table)     health checker, capacity scan
//! ```

pub mod capacity;
pub mod mountpath;
pub mod probe;
pub mod registry;

mod proptest;

pub use capacity::{scan, CapacityFailure, CapacityReport, MountpathCapacity};
pub use mountpath::{clean_path, FsId, MountpathInfo};
pub use probe::{FsIdentity, FsProbe, FsUsage, StaticProbe, SystemProbe};
pub use registry::{MountedFs, MountpathMap, MountpathState, Mountpaths};
