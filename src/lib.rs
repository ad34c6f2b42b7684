//! targetfs - Storage-Target Filesystem Layer
//!
//! The part of an object-storage target that decides which local mountpaths
//! may hold object data. Every object PUT and GET consults the mountpath
//! registry, so reads are lock-free; administrative and health-check
//! mutations are serialized and published atomically.
//!
//! # Architecture
//!
//! ```text
//! node startup ──▶ MountedFs::init ──▶ MountedFs ◀── health checker
//!                                        │   ▲
//!                     object placement ◀─┘   └── operator add/remove
//!                     capacity scan
//! ```
//!
//! # Modules
//!
//! - [`config`] - Node configuration (YAML + CLI)
//! - [`error`] - Error types
//! - [`fs`] - Mountpath registry, filesystem probing and capacity
//! - [`health`] - Mountpath health checker and node health reports
//! - [`metrics`] - Prometheus metrics

pub mod config;
pub mod error;
pub mod fs;
pub mod health;
pub mod metrics;

// Re-export commonly used types
pub use config::{HealthCheckConfig, NodeConfig};
pub use error::{Error, Result};
pub use fs::{FsId, FsProbe, MountedFs, MountpathInfo, Mountpaths, StaticProbe, SystemProbe};
pub use health::{MountpathHealthChecker, NodeHealth};
pub use metrics::RegistryMetrics;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
