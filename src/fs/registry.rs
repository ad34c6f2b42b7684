//! Mountpath Registry
//!
//! Tracks which local mountpaths a storage target may use and publishes them
//! as an immutable (available, disabled) snapshot pair.
//!
//! # Concurrency
//!
//! Every object PUT/GET asks the registry where to go, so reads must never
//! wait. Readers do a single atomic load of the published [`Mountpaths`]
//! (`ArcSwap`); they take no lock. Writers (add, remove, enable, disable,
//! fsid-check toggle) serialize on one mutex that also guards the fsid index.
//! A writer copies the current maps, validates and mutates the copy, and
//! publishes it with one atomic store. A reader therefore sees either the
//! state before a mutation or the state after it, never a mix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::mountpath::{clean_path, FsId, MountpathInfo};
use super::probe::{FsProbe, SystemProbe};
use crate::error::{Error, Result};

/// Mapping of cleaned mountpath to its descriptor
pub type MountpathMap = HashMap<PathBuf, Arc<MountpathInfo>>;

// =============================================================================
// Snapshot Pair
// =============================================================================

/// Where a mountpath currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountpathState {
    /// Used to store data
    Available,
    /// Failed a health check or was disabled by an operator
    Disabled,
}

impl std::fmt::Display for MountpathState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountpathState::Available => write!(f, "available"),
            MountpathState::Disabled => write!(f, "disabled"),
        }
    }
}

/// Immutable snapshot of the registry.
///
/// A path is in at most one of the two maps. The snapshot never changes after
/// it is published; later mutations publish a new one.
#[derive(Debug, Clone, Default)]
pub struct Mountpaths {
    available: MountpathMap,
    disabled: MountpathMap,
}

impl Mountpaths {
    /// Mountpaths used to store data
    pub fn available(&self) -> &MountpathMap {
        &self.available
    }

    /// Mountpaths temporarily out of service
    pub fn disabled(&self) -> &MountpathMap {
        &self.disabled
    }

    /// Number of available mountpaths
    pub fn num_available(&self) -> usize {
        self.available.len()
    }

    /// Number of disabled mountpaths
    pub fn num_disabled(&self) -> usize {
        self.disabled.len()
    }

    /// True when no mountpath can take data
    pub fn is_out_of_capacity(&self) -> bool {
        self.available.is_empty()
    }

    /// Look a mountpath up in either map
    pub fn get(&self, path: &Path) -> Option<(MountpathState, &Arc<MountpathInfo>)> {
        if let Some(mpath) = self.available.get(path) {
            return Some((MountpathState::Available, mpath));
        }
        self.disabled
            .get(path)
            .map(|mpath| (MountpathState::Disabled, mpath))
    }

    /// Whether the mountpath is registered, available or disabled
    pub fn contains(&self, path: &Path) -> bool {
        self.available.contains_key(path) || self.disabled.contains_key(path)
    }

    /// State of a mountpath, if registered
    pub fn state(&self, path: &Path) -> Option<MountpathState> {
        self.get(path).map(|(state, _)| state)
    }

    /// All registered mountpaths with their state
    pub fn iter(&self) -> impl Iterator<Item = (MountpathState, &Arc<MountpathInfo>)> {
        self.available
            .values()
            .map(|mpath| (MountpathState::Available, mpath))
            .chain(
                self.disabled
                    .values()
                    .map(|mpath| (MountpathState::Disabled, mpath)),
            )
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Writer-side state, guarded by the registry mutex
#[derive(Debug)]
struct FsIdIndex {
    /// Which path claims each filesystem
    fs_ids: HashMap<FsId, PathBuf>,
    /// Reject a second mountpath on an already claimed filesystem
    check_fsid: bool,
}

/// Mountpath registry of one storage target.
///
/// Constructed explicitly by node startup and shared as `Arc<MountedFs>` with
/// every component that needs it.
pub struct MountedFs {
    probe: Arc<dyn FsProbe>,
    index: Mutex<FsIdIndex>,
    mountpaths: ArcSwap<Mountpaths>,
}

impl std::fmt::Debug for MountedFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.mountpaths();
        f.debug_struct("MountedFs")
            .field("available", &current.num_available())
            .field("disabled", &current.num_disabled())
            .field("check_fsid", &self.fsid_check_enabled())
            .finish()
    }
}

impl Default for MountedFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MountedFs {
    /// Create an empty registry probing the real OS
    pub fn new() -> Self {
        Self::with_probe(Arc::new(SystemProbe::new()))
    }

    /// Create an empty registry with a custom probe
    pub fn with_probe(probe: Arc<dyn FsProbe>) -> Self {
        Self {
            probe,
            index: Mutex::new(FsIdIndex {
                fs_ids: HashMap::new(),
                check_fsid: true,
            }),
            mountpaths: ArcSwap::from_pointee(Mountpaths::default()),
        }
    }

    /// Probe used by this registry
    pub fn probe(&self) -> &Arc<dyn FsProbe> {
        &self.probe
    }

    /// Register the configured mountpaths at startup.
    ///
    /// An empty list is fatal ([`Error::EmptyConfiguration`]). Otherwise paths
    /// are added in order and the first failure is returned; paths added
    /// before it stay registered.
    pub fn init<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<P> = paths.into_iter().collect();
        if paths.is_empty() {
            return Err(Error::EmptyConfiguration);
        }

        for path in paths {
            self.add(path)?;
        }
        Ok(())
    }

    /// Add a mountpath, making it available.
    ///
    /// Re-adding a disabled path replaces its stale descriptor with a freshly
    /// probed one and makes it available; re-adding an available path fails.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<Arc<MountpathInfo>> {
        let path = clean_path(path);
        self.probe.check_dir(&path)?;
        let identity = self.probe.probe(&path)?;
        let mpath = Arc::new(MountpathInfo::new(path, identity));

        let mut index = self.index.lock();
        let (mut available, mut disabled) = self.mountpaths_copy();

        if available.contains_key(&mpath.path) {
            return Err(Error::DuplicateMountpath {
                path: mpath.path.clone(),
            });
        }

        if index.check_fsid {
            if let Some(owner) = index.fs_ids.get(&mpath.fsid) {
                if owner != &mpath.path {
                    return Err(Error::FsidCollision {
                        path: mpath.path.clone(),
                        owner: owner.clone(),
                        fsid: mpath.fsid.to_string(),
                    });
                }
            }
        }

        if let Some(stale) = disabled.remove(&mpath.path) {
            release_fsid(&mut index.fs_ids, &stale, &available, &disabled);
            info!(
                "replacing disabled mountpath {} with {}",
                stale.path.display(),
                mpath
            );
        }

        index.fs_ids.insert(mpath.fsid, mpath.path.clone());
        available.insert(mpath.path.clone(), Arc::clone(&mpath));
        self.publish(available, disabled);

        info!("added mountpath {}", mpath);
        Ok(mpath)
    }

    /// Remove a mountpath, whether available or disabled.
    ///
    /// Removing the last available mountpath succeeds but leaves the target
    /// with no usable capacity, which is logged as an error.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<Arc<MountpathInfo>> {
        let path = clean_path(path);

        let mut index = self.index.lock();
        let (mut available, mut disabled) = self.mountpaths_copy();

        let (mpath, was_available) = match available.remove(&path) {
            Some(mpath) => (mpath, true),
            None => match disabled.remove(&path) {
                Some(mpath) => (mpath, false),
                None => return Err(Error::MountpathNotFound { path }),
            },
        };

        release_fsid(&mut index.fs_ids, &mpath, &available, &disabled);
        let last_available = was_available && available.is_empty();
        self.publish(available, disabled);

        if last_available {
            error!("removed last available mountpath: {}", mpath.path.display());
        } else {
            info!("removed mountpath {}", mpath.path.display());
        }
        Ok(mpath)
    }

    /// Move a disabled mountpath back to available.
    ///
    /// Returns `(enabled, exists)`: `enabled` is true if the path moved,
    /// `exists` is true if the registry knows the path at all. The descriptor
    /// is reused as is; the fsid was reserved when the path was added.
    pub fn enable(&self, path: impl AsRef<Path>) -> (bool, bool) {
        let path = clean_path(path);

        let _index = self.index.lock();
        let (mut available, mut disabled) = self.mountpaths_copy();
        if available.contains_key(&path) {
            return (false, true);
        }
        let Some(mpath) = disabled.remove(&path) else {
            return (false, false);
        };

        available.insert(path.clone(), mpath);
        self.publish(available, disabled);

        info!("enabled mountpath {}", path.display());
        (true, true)
    }

    /// Move an available mountpath to disabled.
    ///
    /// Returns `(disabled, exists)` with the same meaning as [`enable`]. The
    /// fsid stays claimed while the path is disabled.
    ///
    /// [`enable`]: MountedFs::enable
    pub fn disable(&self, path: impl AsRef<Path>) -> (bool, bool) {
        let path = clean_path(path);

        let _index = self.index.lock();
        let (mut available, mut disabled) = self.mountpaths_copy();
        if disabled.contains_key(&path) {
            return (false, true);
        }
        let Some(mpath) = available.remove(&path) else {
            return (false, false);
        };

        disabled.insert(path.clone(), mpath);
        let none_left = available.is_empty();
        self.publish(available, disabled);

        if none_left {
            warn!("disabled last available mountpath: {}", path.display());
        } else {
            info!("disabled mountpath {}", path.display());
        }
        (true, true)
    }

    /// Current snapshot of available and disabled mountpaths.
    ///
    /// One atomic load, no locking. The returned snapshot stays valid and
    /// unchanged however the registry mutates afterwards.
    pub fn mountpaths(&self) -> Arc<Mountpaths> {
        self.mountpaths.load_full()
    }

    /// Enable or disable rejection of mountpaths sharing a filesystem.
    ///
    /// Existing registrations are not re-validated.
    pub fn set_fsid_check(&self, enabled: bool) {
        let mut index = self.index.lock();
        if index.check_fsid != enabled {
            info!("fsid check {}", if enabled { "enabled" } else { "disabled" });
        }
        index.check_fsid = enabled;
    }

    /// Whether mountpaths sharing a filesystem are rejected
    pub fn fsid_check_enabled(&self) -> bool {
        self.index.lock().check_fsid
    }

    /// Path currently claiming `fsid`, if any
    pub fn fsid_owner(&self, fsid: FsId) -> Option<PathBuf> {
        self.index.lock().fs_ids.get(&fsid).cloned()
    }

    /// Shallow copy of the current maps; descriptors are shared
    fn mountpaths_copy(&self) -> (MountpathMap, MountpathMap) {
        let current = self.mountpaths.load();
        (current.available.clone(), current.disabled.clone())
    }

    fn publish(&self, available: MountpathMap, disabled: MountpathMap) {
        self.mountpaths
            .store(Arc::new(Mountpaths { available, disabled }));
    }
}

/// Drop the claim `mpath` holds on its fsid.
///
/// With the fsid check off several paths can share a filesystem; when the
/// owner goes away the claim passes to one of the remaining paths.
fn release_fsid(
    fs_ids: &mut HashMap<FsId, PathBuf>,
    mpath: &MountpathInfo,
    available: &MountpathMap,
    disabled: &MountpathMap,
) {
    if fs_ids.get(&mpath.fsid) != Some(&mpath.path) {
        return;
    }

    let heir = available
        .values()
        .chain(disabled.values())
        .find(|other| other.fsid == mpath.fsid && other.path != mpath.path);
    match heir {
        Some(other) => {
            fs_ids.insert(mpath.fsid, other.path.clone());
        }
        None => {
            fs_ids.remove(&mpath.fsid);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::probe::{FsIdentity, StaticProbe};
    use assert_matches::assert_matches;

    fn registry(probe: StaticProbe) -> (MountedFs, Arc<StaticProbe>) {
        let probe = Arc::new(probe);
        (MountedFs::with_probe(probe.clone()), probe)
    }

    fn paths(map: &MountpathMap) -> Vec<String> {
        let mut paths: Vec<String> = map.keys().map(|p| p.display().to_string()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_init_empty_is_fatal() {
        let (mfs, _) = registry(StaticProbe::new());
        let err = mfs.init(Vec::<PathBuf>::new()).unwrap_err();
        assert_matches!(err, Error::EmptyConfiguration);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_init_stops_at_first_failure() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/c", 3));
        let err = mfs.init(["/mnt/a", "/mnt/b", "/mnt/c"]).unwrap_err();
        assert_matches!(err, Error::PathNotFound { .. });

        let current = mfs.mountpaths();
        assert_eq!(paths(current.available()), vec!["/mnt/a"]);
    }

    #[test]
    fn test_init_adds_in_order() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 2));
        mfs.init(["/mnt/a", "/mnt/b"]).unwrap();
        assert_eq!(mfs.mountpaths().num_available(), 2);
    }

    #[test]
    fn test_add_then_query() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1));
        let mpath = mfs.add("/mnt/a").unwrap();
        assert_eq!(mpath.fsid, FsId(1));

        let current = mfs.mountpaths();
        assert_eq!(paths(current.available()), vec!["/mnt/a"]);
        assert!(current.disabled().is_empty());
        assert_eq!(mfs.fsid_owner(FsId(1)), Some(PathBuf::from("/mnt/a")));
    }

    #[test]
    fn test_add_cleans_path() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1));
        mfs.add("/mnt//a/").unwrap();
        assert!(mfs.mountpaths().available().contains_key(Path::new("/mnt/a")));
        assert_matches!(mfs.add("/mnt/./a"), Err(Error::DuplicateMountpath { .. }));
    }

    #[test]
    fn test_add_missing_dir() {
        let (mfs, _) = registry(StaticProbe::new());
        assert_matches!(mfs.add("/mnt/nope"), Err(Error::PathNotFound { path, .. }) => {
            assert_eq!(path, PathBuf::from("/mnt/nope"));
        });
    }

    #[test]
    fn test_add_probe_failure() {
        let (mfs, probe) = registry(StaticProbe::new().with("/mnt/a", 1));
        probe.set_failing("/mnt/a", true);
        assert_matches!(mfs.add("/mnt/a"), Err(Error::ProbeFailure { .. }));
        assert_eq!(mfs.mountpaths().num_available(), 0);
    }

    #[test]
    fn test_add_duplicate_available() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1));
        mfs.add("/mnt/a").unwrap();
        assert_matches!(mfs.add("/mnt/a"), Err(Error::DuplicateMountpath { .. }));
    }

    #[test]
    fn test_fsid_collision_leaves_state_unchanged() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 1));
        mfs.add("/mnt/a").unwrap();
        let before = mfs.mountpaths();

        assert_matches!(
            mfs.add("/mnt/b"),
            Err(Error::FsidCollision { path, owner, .. }) => {
                assert_eq!(path, PathBuf::from("/mnt/b"));
                assert_eq!(owner, PathBuf::from("/mnt/a"));
            }
        );

        let after = mfs.mountpaths();
        assert_eq!(paths(before.available()), paths(after.available()));
        assert!(after.disabled().is_empty());
        assert_eq!(mfs.fsid_owner(FsId(1)), Some(PathBuf::from("/mnt/a")));
    }

    #[test]
    fn test_fsid_check_disabled_allows_shared_filesystem() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 1));
        mfs.set_fsid_check(false);
        assert!(!mfs.fsid_check_enabled());

        mfs.add("/mnt/a").unwrap();
        mfs.add("/mnt/b").unwrap();
        assert_eq!(paths(mfs.mountpaths().available()), vec!["/mnt/a", "/mnt/b"]);
    }

    #[test]
    fn test_fsid_claim_passes_on_when_owner_removed() {
        let (mfs, _) = registry(
            StaticProbe::new()
                .with("/mnt/a", 1)
                .with("/mnt/b", 1)
                .with("/mnt/c", 1),
        );
        mfs.set_fsid_check(false);
        mfs.add("/mnt/a").unwrap();
        mfs.add("/mnt/b").unwrap();
        mfs.remove("/mnt/b").unwrap();

        assert_eq!(mfs.fsid_owner(FsId(1)), Some(PathBuf::from("/mnt/a")));

        mfs.set_fsid_check(true);
        assert_matches!(mfs.add("/mnt/c"), Err(Error::FsidCollision { .. }));
    }

    #[test]
    fn test_disable_and_enable() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1));
        mfs.add("/mnt/a").unwrap();
        let before = mfs.mountpaths().available()[Path::new("/mnt/a")].clone();

        assert_eq!(mfs.disable("/mnt/a"), (true, true));
        let current = mfs.mountpaths();
        assert!(current.available().is_empty());
        assert_eq!(paths(current.disabled()), vec!["/mnt/a"]);

        assert_eq!(mfs.enable("/mnt/a"), (true, true));
        let current = mfs.mountpaths();
        assert_eq!(paths(current.available()), vec!["/mnt/a"]);
        assert!(current.disabled().is_empty());

        let after = &current.available()[Path::new("/mnt/a")];
        assert!(Arc::ptr_eq(&before, after));
    }

    #[test]
    fn test_enable_disable_noops() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1));
        mfs.add("/mnt/a").unwrap();

        assert_eq!(mfs.enable("/mnt/a"), (false, true));
        assert_eq!(mfs.disable("/mnt/a/"), (true, true));
        assert_eq!(mfs.disable("/mnt/a"), (false, true));
        assert_eq!(mfs.mountpaths().num_disabled(), 1);

        assert_eq!(mfs.enable("/mnt/x"), (false, false));
        assert_eq!(mfs.disable("/mnt/x"), (false, false));
    }

    #[test]
    fn test_disabled_path_keeps_fsid_claim() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 1));
        mfs.add("/mnt/a").unwrap();
        mfs.disable("/mnt/a");

        assert_matches!(mfs.add("/mnt/b"), Err(Error::FsidCollision { .. }));
    }

    #[test]
    fn test_readd_disabled_replaces_descriptor() {
        let (mfs, probe) = registry(StaticProbe::new().with("/mnt/a", 1));
        mfs.add("/mnt/a").unwrap();
        mfs.disable("/mnt/a");

        probe.insert(
            "/mnt/a",
            FsIdentity {
                fsid: FsId(9),
                fs_type: "xfs".into(),
                fs_name: "/dev/sdz".into(),
            },
        );
        let mpath = mfs.add("/mnt/a").unwrap();
        assert_eq!(mpath.fsid, FsId(9));

        let current = mfs.mountpaths();
        assert_eq!(current.state(Path::new("/mnt/a")), Some(MountpathState::Available));
        assert_eq!(current.num_disabled(), 0);
        assert_eq!(mfs.fsid_owner(FsId(1)), None);
        assert_eq!(mfs.fsid_owner(FsId(9)), Some(PathBuf::from("/mnt/a")));
    }

    #[test]
    fn test_remove_available_and_disabled() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 2));
        mfs.init(["/mnt/a", "/mnt/b"]).unwrap();
        mfs.disable("/mnt/b");

        mfs.remove("/mnt/b").unwrap();
        mfs.remove("/mnt/a").unwrap();

        let current = mfs.mountpaths();
        assert!(current.is_out_of_capacity());
        assert_eq!(current.num_disabled(), 0);
        assert_eq!(mfs.fsid_owner(FsId(1)), None);
        assert_eq!(mfs.fsid_owner(FsId(2)), None);
    }

    #[test]
    fn test_remove_unknown() {
        let (mfs, _) = registry(StaticProbe::new());
        assert_matches!(
            mfs.remove("/mnt/a"),
            Err(Error::MountpathNotFound { path }) => assert_eq!(path, PathBuf::from("/mnt/a"))
        );
    }

    #[test]
    fn test_remove_frees_fsid() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/c", 1));
        mfs.add("/mnt/a").unwrap();
        mfs.remove("/mnt/a").unwrap();
        mfs.add("/mnt/c").unwrap();
        assert_eq!(paths(mfs.mountpaths().available()), vec!["/mnt/c"]);
    }

    #[test]
    fn test_snapshot_is_stable_after_mutation() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 2));
        mfs.add("/mnt/a").unwrap();
        let old = mfs.mountpaths();

        mfs.add("/mnt/b").unwrap();
        mfs.disable("/mnt/a");

        assert_eq!(paths(old.available()), vec!["/mnt/a"]);
        assert!(old.disabled().is_empty());

        let new = mfs.mountpaths();
        assert_eq!(paths(new.available()), vec!["/mnt/b"]);
        assert_eq!(paths(new.disabled()), vec!["/mnt/a"]);
    }

    #[test]
    fn test_snapshot_iter_and_get() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 2));
        mfs.init(["/mnt/a", "/mnt/b"]).unwrap();
        mfs.disable("/mnt/b");

        let current = mfs.mountpaths();
        assert_eq!(current.iter().count(), 2);
        let (state, mpath) = current.get(Path::new("/mnt/b")).unwrap();
        assert_eq!(state, MountpathState::Disabled);
        assert_eq!(mpath.fsid, FsId(2));
        assert!(current.get(Path::new("/mnt/c")).is_none());
    }

    #[test]
    fn test_snapshot_contains_both_states() {
        let (mfs, _) = registry(StaticProbe::new().with("/mnt/a", 1).with("/mnt/b", 2));
        mfs.init(["/mnt/a", "/mnt/b"]).unwrap();
        mfs.disable("/mnt/b");

        let current = mfs.mountpaths();
        assert!(current.contains(Path::new("/mnt/a")));
        assert!(current.contains(Path::new("/mnt/b")));
        assert!(!current.contains(Path::new("/mnt/c")));

        mfs.remove("/mnt/b").unwrap();
        assert!(current.contains(Path::new("/mnt/b")));
        assert!(!mfs.mountpaths().contains(Path::new("/mnt/b")));
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let probe = StaticProbe::new();
        for i in 0..8u64 {
            probe.insert(format!("/mnt/{}", i), FsIdentity::with_fsid(i));
        }
        let mfs = Arc::new(MountedFs::with_probe(Arc::new(probe)));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let mfs = Arc::clone(&mfs);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    let mut reads = 0u64;
                    loop {
                        let current = mfs.mountpaths();
                        for path in current.available().keys() {
                            assert!(!current.disabled().contains_key(path));
                        }
                        reads += 1;
                        if stop.load(std::sync::atomic::Ordering::Relaxed) {
                            break reads;
                        }
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            for i in 0..8 {
                let path = format!("/mnt/{}", i);
                mfs.add(&path).unwrap();
                mfs.disable(&path);
                mfs.enable(&path);
            }
            for i in 0..8 {
                mfs.remove(format!("/mnt/{}", i)).unwrap();
            }
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert!(mfs.mountpaths().is_out_of_capacity());
    }
}
