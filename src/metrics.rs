//! Prometheus Metrics
//!
//! Exposes the state of the mountpath registry in the Prometheus text format.
//! Metrics live in a registry owned by [`RegistryMetrics`] rather than the
//! process-global default, so several targets can run in one process.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::fs::Mountpaths;

/// Mountpath moved from disabled to available
pub const TRANSITION_ENABLE: &str = "enable";

/// Mountpath moved from available to disabled
pub const TRANSITION_DISABLE: &str = "disable";

/// Registry and health-check metrics of one storage target
#[derive(Clone)]
pub struct RegistryMetrics {
    registry: Registry,
    available: IntGauge,
    disabled: IntGauge,
    transitions: IntCounterVec,
    health_check_failures: IntCounter,
}

impl std::fmt::Debug for RegistryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryMetrics")
            .field("available", &self.available.get())
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", e))
}

impl RegistryMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let available = IntGauge::new(
            "targetfs_mountpaths_available",
            "Number of mountpaths available for data",
        )
        .map_err(metrics_error)?;
        let disabled = IntGauge::new(
            "targetfs_mountpaths_disabled",
            "Number of disabled mountpaths",
        )
        .map_err(metrics_error)?;
        let transitions = IntCounterVec::new(
            Opts::new(
                "targetfs_mountpath_transitions_total",
                "Mountpath enable/disable transitions made by the health checker",
            ),
            &["transition"],
        )
        .map_err(metrics_error)?;
        let health_check_failures = IntCounter::new(
            "targetfs_health_check_failures_total",
            "Failed mountpath read/write checks",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(available.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(disabled.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(transitions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(health_check_failures.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            available,
            disabled,
            transitions,
            health_check_failures,
        })
    }

    /// Refresh gauges from a registry snapshot
    pub fn observe(&self, mountpaths: &Mountpaths) {
        self.available.set(mountpaths.num_available() as i64);
        self.disabled.set(mountpaths.num_disabled() as i64);
    }

    /// Count a health-checker transition
    pub fn record_transition(&self, transition: &str) {
        self.transitions.with_label_values(&[transition]).inc();
    }

    /// Count a failed mountpath check
    pub fn record_health_check_failure(&self) {
        self.health_check_failures.inc();
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}
