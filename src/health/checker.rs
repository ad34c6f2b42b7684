//! Mountpath Health Checker
//!
//! Periodically writes, reads back and deletes a small file on every
//! registered mountpath. A mountpath that fails `failure_threshold` checks in
//! a row is disabled; a disabled mountpath that passes a check is enabled
//! again. A check that does not finish within `check_timeout` is a failure,
//! so a hung disk is disabled like a broken one.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::HealthCheckConfig;
use crate::fs::{MountedFs, MountpathState};
use crate::metrics::{RegistryMetrics, TRANSITION_DISABLE, TRANSITION_ENABLE};

/// Prefix of the scratch files written by the checker
pub const SCRATCH_FILE_PREFIX: &str = ".targetfs-health";

/// Future returned by a [`DiskCheck`]; `Err` carries the failure reason
pub type CheckFuture = Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>>;

/// One liveness test of a mountpath directory
pub trait DiskCheck: Send + Sync {
    /// Test `path`, resolving to `Err(reason)` when it is unusable
    fn check(&self, path: &Path) -> CheckFuture;
}

/// Write, read back and delete a scratch file under the mountpath
#[derive(Debug, Clone, Copy, Default)]
pub struct ScratchFileCheck;

impl DiskCheck for ScratchFileCheck {
    fn check(&self, path: &Path) -> CheckFuture {
        Box::pin(write_read_delete(path.to_path_buf()))
    }
}

/// Health-check history of one mountpath
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountpathHealth {
    /// Failed checks since the last success
    pub consecutive_failures: u32,
    /// When the last check finished
    pub last_checked: Option<DateTime<Utc>>,
    /// Error of the last failed check
    pub last_error: Option<String>,
}

/// Outcome of checking one mountpath
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountpathCheckResult {
    /// Mountpath checked
    pub path: PathBuf,
    /// State after the check was acted on
    pub state: MountpathState,
    /// Failed checks in a row, zero after a success
    pub consecutive_failures: u32,
    /// Why the check failed
    pub error: Option<String>,
    /// Time the check took
    pub duration_ms: u64,
}

impl MountpathCheckResult {
    /// Whether the check passed
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Background checker driving [`MountedFs::disable`] and [`MountedFs::enable`]
pub struct MountpathHealthChecker {
    mfs: Arc<MountedFs>,
    config: HealthCheckConfig,
    check: Arc<dyn DiskCheck>,
    states: DashMap<PathBuf, MountpathHealth>,
    metrics: Option<RegistryMetrics>,
}

impl MountpathHealthChecker {
    /// Create a checker over a registry using [`ScratchFileCheck`]
    pub fn new(mfs: Arc<MountedFs>, config: HealthCheckConfig) -> Self {
        Self {
            mfs,
            config,
            check: Arc::new(ScratchFileCheck),
            states: DashMap::new(),
            metrics: None,
        }
    }

    /// Test mountpaths with `check` instead of the scratch file
    pub fn with_check(mut self, check: Arc<dyn DiskCheck>) -> Self {
        self.check = check;
        self
    }

    /// Report failures and transitions to `metrics`
    pub fn with_metrics(mut self, metrics: RegistryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run check rounds until `shutdown` is cancelled.
    ///
    /// Scratch files left by a previous process are removed first. Shutdown
    /// is only observed between rounds: dropping a check midway would leave
    /// its scratch file on the mountpath.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting mountpath health checker with {:?}", self.config);

        self.sweep_scratch_files().await;
        let mut tick = interval(self.config.interval());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Mountpath health checker shutting down");
                    break;
                }
                _ = tick.tick() => {}
            }

            let results = self.check_all().await;
            debug!(
                "Checked {} mountpaths, {} failed",
                results.len(),
                results.iter().filter(|r| !r.passed()).count()
            );
        }
    }

    /// Check every registered mountpath once
    pub async fn check_all(&self) -> Vec<MountpathCheckResult> {
        let current = self.mfs.mountpaths();
        self.states.retain(|path, _| current.contains(path));

        let targets: Vec<(MountpathState, PathBuf)> = current
            .iter()
            .map(|(state, mpath)| (state, mpath.path.clone()))
            .collect();
        drop(current);

        let limit = self.config.check_timeout();
        let mut results = Vec::with_capacity(targets.len());
        for (state, path) in targets {
            let started = Instant::now();
            let outcome = match timeout(limit, self.check.check(&path)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(format!("check of {} timed out after {:?}", path.display(), limit)),
            };
            let mut result = self.record(&path, state, outcome);
            result.duration_ms = started.elapsed().as_millis() as u64;
            results.push(result);
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe(&self.mfs.mountpaths());
        }
        results.sort_by(|a, b| a.path.cmp(&b.path));
        results
    }

    /// Delete scratch files an interrupted or timed-out check left behind.
    /// Returns how many were removed.
    pub async fn sweep_scratch_files(&self) -> usize {
        let paths: Vec<PathBuf> = self
            .mfs
            .mountpaths()
            .iter()
            .map(|(_, mpath)| mpath.path.clone())
            .collect();

        let limit = self.config.check_timeout();
        let mut removed = 0;
        for path in paths {
            match timeout(limit, remove_scratch_files(&path)).await {
                Ok(Ok(count)) => removed += count,
                Ok(Err(e)) => debug!("cannot sweep {}: {}", path.display(), e),
                Err(_) => warn!("sweeping {} timed out after {:?}", path.display(), limit),
            }
        }

        if removed > 0 {
            info!("Removed {} stale health-check files", removed);
        }
        removed
    }

    /// Health history of every tracked mountpath
    pub fn status(&self) -> HashMap<PathBuf, MountpathHealth> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn record(
        &self,
        path: &Path,
        state: MountpathState,
        outcome: std::result::Result<(), String>,
    ) -> MountpathCheckResult {
        let failures = {
            let mut health = self.states.entry(path.to_path_buf()).or_default();
            health.last_checked = Some(Utc::now());
            match &outcome {
                Ok(()) => {
                    health.consecutive_failures = 0;
                    health.last_error = None;
                }
                Err(e) => {
                    health.consecutive_failures += 1;
                    health.last_error = Some(e.clone());
                }
            }
            health.consecutive_failures
        };

        let state = match (&outcome, state) {
            (Ok(()), MountpathState::Available) => MountpathState::Available,
            (Ok(()), MountpathState::Disabled) => {
                let (enabled, exists) = self.mfs.enable(path);
                info!(
                    "mountpath {} passed health check: enabled={}, exists={}",
                    path.display(),
                    enabled,
                    exists
                );
                if enabled {
                    self.record_transition(TRANSITION_ENABLE);
                    MountpathState::Available
                } else {
                    MountpathState::Disabled
                }
            }
            (Err(e), state) => {
                warn!(
                    "mountpath {} failed health check ({} in a row): {}",
                    path.display(),
                    failures,
                    e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_health_check_failure();
                }

                if state == MountpathState::Available && failures >= self.config.failure_threshold {
                    let (disabled, exists) = self.mfs.disable(path);
                    warn!(
                        "disabling mountpath {}: disabled={}, exists={}",
                        path.display(),
                        disabled,
                        exists
                    );
                    if disabled {
                        self.record_transition(TRANSITION_DISABLE);
                        MountpathState::Disabled
                    } else {
                        state
                    }
                } else {
                    state
                }
            }
        };

        MountpathCheckResult {
            path: path.to_path_buf(),
            state,
            consecutive_failures: failures,
            error: outcome.err(),
            duration_ms: 0,
        }
    }

    fn record_transition(&self, transition: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(transition);
        }
    }
}

async fn write_read_delete(path: PathBuf) -> std::result::Result<(), String> {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let file = path.join(format!("{}-{}-{}", SCRATCH_FILE_PREFIX, std::process::id(), stamp));
    let payload = format!("targetfs health check {}", stamp).into_bytes();

    let result = async {
        tokio::fs::write(&file, &payload)
            .await
            .map_err(|e| format!("write {}: {}", file.display(), e))?;
        let read = tokio::fs::read(&file)
            .await
            .map_err(|e| format!("read {}: {}", file.display(), e))?;
        if read != payload {
            return Err(format!("read back {} differs from what was written", file.display()));
        }
        Ok(())
    }
    .await;

    if let Err(e) = tokio::fs::remove_file(&file).await {
        if result.is_ok() {
            return Err(format!("remove {}: {}", file.display(), e));
        }
    }
    result
}

async fn remove_scratch_files(dir: &Path) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(SCRATCH_FILE_PREFIX)
        {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
