//! Node Configuration
//!
//! A storage target is configured from an optional YAML file plus command-line
//! flags. The file looks like:
//!
//! ```yaml
//! mountpaths:
//!   - /mnt/disk1/targetfs
//!   - /mnt/disk2/targetfs
//! check_fsid: true
//! health_check:
//!   enabled: true
//!   interval_secs: 30
//!   failure_threshold: 3
//!   check_timeout_ms: 10000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mountpath health checker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the checker at all
    pub enabled: bool,
    /// Seconds between check rounds
    pub interval_secs: u64,
    /// Consecutive failures before a mountpath is disabled
    pub failure_threshold: u32,
    /// Milliseconds a single mountpath check may take before it counts as failed
    pub check_timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            failure_threshold: 3,
            check_timeout_ms: 10_000,
        }
    }
}

impl HealthCheckConfig {
    /// Interval between check rounds
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Time limit of one mountpath check
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

/// Storage target configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Mountpath directories, registered in order
    pub mountpaths: Vec<PathBuf>,
    /// Reject mountpaths sharing a filesystem
    pub check_fsid: bool,
    /// Health checker settings
    pub health_check: HealthCheckConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mountpaths: Vec::new(),
            check_fsid: true,
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Append mountpaths given on the command line, skipping repeats
    pub fn merge_mountpaths<I, P>(&mut self, extra: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in extra {
            let path = path.into();
            if !self.mountpaths.contains(&path) {
                self.mountpaths.push(path);
            }
        }
    }

    /// Reject configurations a target cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.mountpaths.is_empty() {
            return Err(Error::EmptyConfiguration);
        }
        if self.health_check.enabled {
            if self.health_check.interval_secs == 0 {
                return Err(Error::Config(
                    "health_check.interval_secs must be positive".to_string(),
                ));
            }
            if self.health_check.failure_threshold == 0 {
                return Err(Error::Config(
                    "health_check.failure_threshold must be positive".to_string(),
                ));
            }
            if self.health_check.check_timeout_ms == 0 {
                return Err(Error::Config(
                    "health_check.check_timeout_ms must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
