//! Mountpath Registry Integration Tests
//!
//! End-to-end scenarios against the public API:
//! - Scenarios with deterministic filesystem ids (static probe)
//! - Real directories probed through the OS
//! - Registry, health checker and capacity scan working together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_matches::assert_matches;

use targetfs::fs::{FsId, MountedFs, MountpathState, StaticProbe};
use targetfs::Error;

fn sorted(paths: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = paths.collect();
    paths.sort();
    paths
}

// =============================================================================
// Registry Scenarios
// =============================================================================

mod scenario_tests {
    use super::*;

    fn scenario_a() -> MountedFs {
        let probe = StaticProbe::new()
            .with("/mnt/a", 1)
            .with("/mnt/b", 1)
            .with("/mnt/c", 1);
        let mfs = MountedFs::with_probe(Arc::new(probe));
        mfs.add("/mnt/a").expect("add /mnt/a");
        mfs
    }

    #[test]
    fn test_scenario_a_add() {
        let mfs = scenario_a();
        let current = mfs.mountpaths();

        assert_eq!(
            sorted(current.available().keys().cloned()),
            vec![PathBuf::from("/mnt/a")]
        );
        assert!(current.disabled().is_empty());
    }

    #[test]
    fn test_scenario_b_fsid_collision() {
        let mfs = scenario_a();
        let before = mfs.mountpaths();

        let err = mfs.add("/mnt/b").unwrap_err();
        assert_matches!(&err, Error::FsidCollision { owner, .. } => {
            assert_eq!(owner, Path::new("/mnt/a"));
        });
        assert!(err.to_string().contains("/mnt/a"));
        assert_eq!(err.path(), Some(Path::new("/mnt/b")));

        let after = mfs.mountpaths();
        assert_eq!(
            sorted(before.available().keys().cloned()),
            sorted(after.available().keys().cloned())
        );
        assert!(after.disabled().is_empty());
    }

    #[test]
    fn test_scenario_c_disable() {
        let mfs = scenario_a();
        assert_eq!(mfs.disable("/mnt/a"), (true, true));

        let current = mfs.mountpaths();
        assert!(current.available().is_empty());
        assert_eq!(
            sorted(current.disabled().keys().cloned()),
            vec![PathBuf::from("/mnt/a")]
        );
    }

    #[test]
    fn test_scenario_d_enable() {
        let mfs = scenario_a();
        mfs.disable("/mnt/a");
        assert_eq!(mfs.enable("/mnt/a"), (true, true));

        let current = mfs.mountpaths();
        assert_eq!(current.state(Path::new("/mnt/a")), Some(MountpathState::Available));
        assert!(current.disabled().is_empty());
        assert_eq!(current.available()[Path::new("/mnt/a")].fsid, FsId(1));
    }

    #[test]
    fn test_scenario_e_remove_then_reuse_fsid() {
        let mfs = scenario_a();
        mfs.remove("/mnt/a").expect("remove /mnt/a");
        mfs.add("/mnt/c").expect("add /mnt/c on the released filesystem");

        assert_eq!(
            sorted(mfs.mountpaths().available().keys().cloned()),
            vec![PathBuf::from("/mnt/c")]
        );
    }

    #[test]
    fn test_scenario_f_empty_initialize() {
        let mfs = MountedFs::with_probe(Arc::new(StaticProbe::new()));
        let err = mfs.init(Vec::<&str>::new()).unwrap_err();
        assert_matches!(err, Error::EmptyConfiguration);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_idempotent_noops() {
        let mfs = scenario_a();
        assert_eq!(mfs.enable("/mnt/a"), (false, true));
        mfs.disable("/mnt/a");
        assert_eq!(mfs.disable("/mnt/a"), (false, true));

        let current = mfs.mountpaths();
        assert_eq!(current.num_available(), 0);
        assert_eq!(current.num_disabled(), 1);
    }
}

// =============================================================================
// Real Filesystem Tests
// =============================================================================

#[cfg(target_os = "linux")]
mod system_probe_tests {
    use super::*;

    #[test]
    fn test_directories_on_one_filesystem_collide() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();

        let mfs = MountedFs::new();
        let added = mfs.add(&a).unwrap();
        assert_eq!(added.path, a);

        assert_matches!(mfs.add(&b), Err(Error::FsidCollision { owner, .. }) => {
            assert_eq!(owner, a);
        });
    }

    #[test]
    fn test_fsid_check_off_allows_shared_filesystem() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();

        let mfs = MountedFs::new();
        mfs.set_fsid_check(false);
        mfs.init([&a, &b]).unwrap();

        let current = mfs.mountpaths();
        assert_eq!(current.num_available(), 2);
        assert_eq!(current.available()[&a].fsid, current.available()[&b].fsid);
    }

    #[test]
    fn test_missing_and_non_directory_paths() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let mfs = MountedFs::new();
        assert_matches!(mfs.add(root.path().join("nope")), Err(Error::PathNotFound { .. }));
        assert_matches!(mfs.add(&file), Err(Error::PathNotFound { .. }));
        assert!(mfs.mountpaths().is_out_of_capacity());
    }

    #[test]
    fn test_remove_after_directory_vanished() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        std::fs::create_dir(&a).unwrap();

        let mfs = MountedFs::new();
        mfs.add(&a).unwrap();
        std::fs::remove_dir(&a).unwrap();

        assert_eq!(mfs.disable(&a), (true, true));
        mfs.remove(&a).unwrap();
        assert_eq!(mfs.mountpaths().iter().count(), 0);
    }
}

// =============================================================================
// Health Checker and Capacity
// =============================================================================

mod health_tests {
    use super::*;
    use targetfs::config::HealthCheckConfig;
    use targetfs::fs::{scan, FsIdentity, FsUsage};
    use targetfs::health::{HealthStatus, MountpathHealthChecker, NodeHealth};

    #[tokio::test]
    async fn test_failed_disk_is_disabled_and_recovers() {
        let good = tempfile::tempdir().unwrap();
        let flaky_root = tempfile::tempdir().unwrap();
        let flaky = flaky_root.path().join("disk");
        std::fs::create_dir(&flaky).unwrap();

        let probe = Arc::new(StaticProbe::new());
        probe.insert(good.path(), FsIdentity::with_fsid(1u64));
        probe.insert(&flaky, FsIdentity::with_fsid(2u64));
        probe.set_usage(
            good.path(),
            FsUsage {
                total_bytes: 1 << 30,
                free_bytes: 1 << 29,
                available_bytes: 1 << 29,
            },
        );

        let mfs = Arc::new(MountedFs::with_probe(probe.clone()));
        mfs.init([good.path(), flaky.as_path()]).unwrap();

        let checker = MountpathHealthChecker::new(
            Arc::clone(&mfs),
            HealthCheckConfig {
                failure_threshold: 1,
                ..Default::default()
            },
        );
        let node = NodeHealth::new(Arc::clone(&mfs));

        // The disk goes away
        std::fs::remove_dir(&flaky).unwrap();
        checker.check_all().await;

        assert_eq!(mfs.mountpaths().state(&flaky), Some(MountpathState::Disabled));
        assert_eq!(node.report().status, HealthStatus::Degraded);
        assert!(node.is_ready());

        let capacity = scan(&mfs);
        assert_eq!(capacity.mountpaths.len(), 1);
        assert_eq!(capacity.total_bytes(), 1 << 30);

        // ...and comes back
        std::fs::create_dir(&flaky).unwrap();
        checker.check_all().await;

        assert_eq!(mfs.mountpaths().state(&flaky), Some(MountpathState::Available));
        assert_eq!(node.report().status, HealthStatus::Healthy);
    }
}
