//! Property-Based Tests for the Mountpath Registry
//!
//! Drives the registry with random operation sequences and checks it against
//! a plain model.
//!
//! # Test Properties
//!
//! 1. **Uniqueness**: a path is never both available and disabled
//! 2. **Fsid dedup**: with the check on, one path per filesystem
//! 3. **Dedup bypass**: with the check off, shared filesystems all register
//! 4. **Round trip**: disable then enable keeps the same descriptor
//! 5. **Release**: removing a path frees its filesystem for another path

#![cfg(test)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use proptest::prelude::*;

use super::mountpath::FsId;
use super::probe::StaticProbe;
use super::registry::{MountedFs, MountpathState};
use crate::error::Error;

const PATHS: usize = 6;
const FILESYSTEMS: u64 = 4;

fn path(i: usize) -> PathBuf {
    PathBuf::from(format!("/mnt/mp{}", i))
}

fn fsid_of(i: usize) -> u64 {
    i as u64 % FILESYSTEMS
}

fn registry() -> MountedFs {
    let probe = StaticProbe::new();
    let probe = (0..PATHS).fold(probe, |probe, i| probe.with(path(i), fsid_of(i)));
    MountedFs::with_probe(Arc::new(probe))
}

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(usize),
    Remove(usize),
    Enable(usize),
    Disable(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PATHS).prop_map(Op::Add),
        (0..PATHS).prop_map(Op::Remove),
        (0..PATHS).prop_map(Op::Enable),
        (0..PATHS).prop_map(Op::Disable),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..60)
}

// =============================================================================
// Reference Model
// =============================================================================

#[derive(Default)]
struct Model {
    states: HashMap<PathBuf, MountpathState>,
    owners: HashMap<u64, PathBuf>,
}

impl Model {
    /// Expected outcome: `Ok(changed)` or the error kind name
    fn apply(&mut self, op: Op) -> std::result::Result<(bool, bool), &'static str> {
        match op {
            Op::Add(i) => {
                let p = path(i);
                let fsid = fsid_of(i);
                if self.states.get(&p) == Some(&MountpathState::Available) {
                    return Err("duplicate");
                }
                if matches!(self.owners.get(&fsid), Some(owner) if owner != &p) {
                    return Err("collision");
                }
                self.owners.insert(fsid, p.clone());
                self.states.insert(p, MountpathState::Available);
                Ok((true, true))
            }
            Op::Remove(i) => {
                let p = path(i);
                if self.states.remove(&p).is_none() {
                    return Err("not_found");
                }
                self.owners.remove(&fsid_of(i));
                Ok((true, true))
            }
            Op::Enable(i) => Ok(self.transition(i, MountpathState::Available)),
            Op::Disable(i) => Ok(self.transition(i, MountpathState::Disabled)),
        }
    }

    fn transition(&mut self, i: usize, to: MountpathState) -> (bool, bool) {
        match self.states.get_mut(&path(i)) {
            None => (false, false),
            Some(state) if *state == to => (false, true),
            Some(state) => {
                *state = to;
                (true, true)
            }
        }
    }
}

fn run(mfs: &MountedFs, op: Op) -> std::result::Result<(bool, bool), &'static str> {
    let kind = |e: Error| match e {
        Error::DuplicateMountpath { .. } => "duplicate",
        Error::FsidCollision { .. } => "collision",
        Error::MountpathNotFound { .. } => "not_found",
        _ => "other",
    };
    match op {
        Op::Add(i) => mfs.add(path(i)).map(|_| (true, true)).map_err(kind),
        Op::Remove(i) => mfs.remove(path(i)).map(|_| (true, true)).map_err(kind),
        Op::Enable(i) => Ok(mfs.enable(path(i))),
        Op::Disable(i) => Ok(mfs.disable(path(i))),
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the registry matches the model and a path never sits in both maps.
    #[test]
    fn prop_registry_matches_model(ops in ops_strategy()) {
        let mfs = registry();
        let mut model = Model::default();

        for op in ops {
            prop_assert_eq!(run(&mfs, op), model.apply(op), "op {:?}", op);

            let current = mfs.mountpaths();
            for p in current.available().keys() {
                prop_assert!(!current.disabled().contains_key(p));
            }
            prop_assert_eq!(current.num_available() + current.num_disabled(), model.states.len());
            for (p, state) in &model.states {
                prop_assert_eq!(current.state(p), Some(*state));
            }
        }
    }

    /// Property: with the check on, every registered filesystem has exactly one claimant.
    #[test]
    fn prop_fsid_claims_unique(ops in ops_strategy()) {
        let mfs = registry();
        for op in ops {
            let _ = run(&mfs, op);
        }

        let current = mfs.mountpaths();
        let mut seen: HashMap<FsId, &Path> = HashMap::new();
        for (_, mpath) in current.iter() {
            prop_assert!(seen.insert(mpath.fsid, &mpath.path).is_none());
            prop_assert_eq!(mfs.fsid_owner(mpath.fsid), Some(mpath.path.clone()));
        }
        for fsid in 0..FILESYSTEMS {
            if !seen.contains_key(&FsId(fsid)) {
                prop_assert_eq!(mfs.fsid_owner(FsId(fsid)), None);
            }
        }
    }

    /// Property: with the check off, every path registers even on a shared filesystem.
    #[test]
    fn prop_fsid_check_off_accepts_all(count in 1..PATHS) {
        let probe = (0..count).fold(StaticProbe::new(), |probe, i| probe.with(path(i), 42));
        let mfs = MountedFs::with_probe(Arc::new(probe));
        mfs.set_fsid_check(false);

        mfs.init((0..count).map(path)).unwrap();
        prop_assert_eq!(mfs.mountpaths().num_available(), count);
    }

    /// Property: disable then enable restores the identical descriptor.
    #[test]
    fn prop_disable_enable_round_trip(i in 0..PATHS) {
        let mfs = registry();
        let added = mfs.add(path(i)).unwrap();

        prop_assert_eq!(mfs.disable(path(i)), (true, true));
        prop_assert_eq!(mfs.enable(path(i)), (true, true));

        let current = mfs.mountpaths();
        let restored = &current.available()[&path(i)];
        prop_assert!(Arc::ptr_eq(&added, restored));
        prop_assert_eq!(restored.fsid, FsId(fsid_of(i)));
    }

    /// Property: after removing a path, another path on the same filesystem can be added.
    #[test]
    fn prop_remove_releases_fsid(i in 0..2usize) {
        let mfs = registry();
        let sibling = i + FILESYSTEMS as usize;

        mfs.add(path(i)).unwrap();
        prop_assert!(mfs.add(path(sibling)).is_err());
        mfs.remove(path(i)).unwrap();
        prop_assert!(mfs.add(path(sibling)).is_ok());
    }
}
