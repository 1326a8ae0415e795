//! Coordinator-free slot allocation.
//!
//! Every holder of slot `s` owns a marker file `<prefix><glyph(s)>.<pid>` in
//! a shared directory. A candidate is claimed by creating our own marker
//! with exclusive-create semantics, then checking for markers of the same
//! slot left by other pids. Markers of dead pids are removed on the spot;
//! a marker of a live pid means the slot is taken and our marker is
//! withdrawn. A slot is therefore only reused once its previous holder is
//! gone.

use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use pops_exec::probe_alive;
use pops_model::{PopsConfig, Slot};
use tracing::{debug, trace, warn};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct SlotAllocator {
    lock_dir: PathBuf,
    prefix: String,
    max_slots: u32,
    owner: i32,
}

impl SlotAllocator {
    pub fn new(lock_dir: impl Into<PathBuf>, prefix: impl Into<String>, max_slots: u32) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            prefix: prefix.into(),
            max_slots,
            owner: std::process::id() as i32,
        }
    }

    pub fn from_config(cfg: &PopsConfig) -> Self {
        Self::new(cfg.lock_dir(), cfg.lock_prefix.clone(), cfg.max_slots)
    }

    /// Claim slots on behalf of another process id.
    pub fn with_owner(mut self, pid: i32) -> Self {
        self.owner = pid;
        self
    }

    pub fn owner(&self) -> i32 {
        self.owner
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Claim the lowest free slot.
    ///
    /// The returned lease frees the slot when released or dropped.
    pub fn acquire(&self) -> CoreResult<SlotLease> {
        for slot in Slot::pool(self.max_slots) {
            let Some(path) = self.try_create_marker(slot)? else {
                continue;
            };
            if self.has_live_competitor(slot)? {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(target: "pops.core.slot", marker = %path.display(), error = %e, "failed to withdraw marker");
                }
                continue;
            }
            debug!(target: "pops.core.slot", %slot, owner = self.owner, "slot acquired");
            return Ok(SlotLease {
                slot,
                marker: path,
                released: false,
            });
        }
        Err(CoreError::NoSlotAvailable)
    }

    /// Free `slot` held by this allocator's owner.
    pub fn release(&self, slot: Slot) -> CoreResult<()> {
        let path = self.marker_path(slot, self.owner);
        fs::remove_file(&path).map_err(CoreError::file(&path))?;
        debug!(target: "pops.core.slot", %slot, owner = self.owner, "slot released");
        Ok(())
    }

    pub fn marker_path(&self, slot: Slot, pid: i32) -> PathBuf {
        self.lock_dir
            .join(format!("{}{}.{}", self.prefix, slot.glyph(), pid))
    }

    /// Pids currently holding a marker for `slot`, live or not.
    pub fn holders(&self, slot: Slot) -> CoreResult<Vec<i32>> {
        let marker_stem = format!("{}{}.", self.prefix, slot.glyph());
        let entries = fs::read_dir(&self.lock_dir).map_err(CoreError::file(&self.lock_dir))?;

        let mut pids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Anything whose suffix is not a plain decimal pid is not a marker.
            if let Some(pid) = name
                .strip_prefix(&marker_stem)
                .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|rest| rest.parse::<i32>().ok())
            {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn try_create_marker(&self, slot: Slot) -> CoreResult<Option<PathBuf>> {
        let path = self.marker_path(slot, self.owner);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o666)
            .open(&path)
        {
            Ok(_) => Ok(Some(path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                trace!(target: "pops.core.slot", %slot, "own marker exists");
                Ok(None)
            }
            Err(e) => Err(CoreError::File { path, source: e }),
        }
    }

    fn has_live_competitor(&self, slot: Slot) -> CoreResult<bool> {
        for pid in self.holders(slot)? {
            if pid == self.owner {
                continue;
            }
            if probe_alive(pid) {
                trace!(target: "pops.core.slot", %slot, pid, "slot in use");
                return Ok(true);
            }
            let stale = self.marker_path(slot, pid);
            match fs::remove_file(&stale) {
                Ok(()) => debug!(target: "pops.core.slot", %slot, pid, "reclaimed stale marker"),
                // Another acquirer may have removed it first, or it is not ours to delete.
                Err(e) => debug!(target: "pops.core.slot", marker = %stale.display(), error = %e, "stale marker not removed"),
            }
        }
        Ok(false)
    }
}

/// Exclusive claim on one slot; frees it on [`SlotLease::release`] or drop.
#[derive(Debug)]
pub struct SlotLease {
    slot: Slot,
    marker: PathBuf,
    released: bool,
}

impl SlotLease {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    pub fn release(mut self) -> CoreResult<()> {
        self.released = true;
        match fs::remove_file(&self.marker) {
            Ok(()) => {
                debug!(target: "pops.core.slot", slot = %self.slot, "slot released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::File {
                path: self.marker.clone(),
                source: e,
            }),
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match fs::remove_file(&self.marker) {
            Ok(()) => debug!(target: "pops.core.slot", slot = %self.slot, "slot released on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "pops.core.slot", marker = %self.marker.display(), error = %e, "failed to release slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn allocator(dir: &tempfile::TempDir, max: u32) -> SlotAllocator {
        SlotAllocator::new(dir.path(), "AIPS", max)
    }

    fn dead_pid() -> i32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        pid
    }

    fn slot(n: u32) -> Slot {
        Slot::new(n).unwrap()
    }

    #[test]
    fn lowest_free_slot_first() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);

        let a = alloc.acquire().unwrap();
        let b = alloc.acquire().unwrap();
        assert_eq!(a.slot(), slot(1));
        assert_eq!(b.slot(), slot(2));
        assert!(a.marker().ends_with(format!("AIPS1.{}", alloc.owner())));
    }

    #[test]
    fn release_makes_slot_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);

        let a = alloc.acquire().unwrap();
        a.release().unwrap();
        let again = alloc.acquire().unwrap();
        assert_eq!(again.slot(), slot(1));

        alloc.release(again.slot()).unwrap();
        assert!(alloc.holders(slot(1)).unwrap().is_empty());
        // The lease finds its marker already gone and stays quiet.
        drop(again);
    }

    #[test]
    fn drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);
        {
            let _lease = alloc.acquire().unwrap();
            assert_eq!(alloc.holders(slot(1)).unwrap().len(), 1);
        }
        assert!(alloc.holders(slot(1)).unwrap().is_empty());
    }

    #[test]
    fn live_holder_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let live = allocator(&dir, 35);
        let _held = live.acquire().unwrap();

        let other = allocator(&dir, 35).with_owner(live.owner() + 100_000);
        let lease = other.acquire().unwrap();
        assert_eq!(lease.slot(), slot(2));
        // The withdrawn claim on slot 1 left nothing behind.
        assert_eq!(other.holders(slot(1)).unwrap(), vec![live.owner()]);
    }

    #[test]
    fn stale_marker_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);
        let pid = dead_pid();
        fs::write(alloc.marker_path(slot(1), pid), b"").unwrap();

        let lease = alloc.acquire().unwrap();
        assert_eq!(lease.slot(), slot(1));
        assert!(!alloc.marker_path(slot(1), pid).exists());
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);
        fs::write(dir.path().join("AIPS1.notapid"), b"").unwrap();
        fs::write(dir.path().join("AIPS12.1"), b"").unwrap();
        let pid = dead_pid();
        let signed = dir.path().join(format!("AIPS1.+{pid}"));
        fs::write(&signed, b"").unwrap();
        fs::write(dir.path().join("AIPS1.-5"), b"").unwrap();
        fs::write(alloc.marker_path(slot(1), pid), b"").unwrap();

        // Only the plain decimal name counts; its pid is dead, so it is reclaimed.
        assert_eq!(alloc.holders(slot(1)).unwrap(), vec![pid]);
        assert_eq!(alloc.acquire().unwrap().slot(), slot(1));
        assert!(!alloc.marker_path(slot(1), pid).exists());
        assert!(signed.exists());
        assert!(dir.path().join("AIPS1.-5").exists());
    }

    #[test]
    fn exhausted_pool() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 2);
        let _a = alloc.acquire().unwrap();
        let _b = alloc.acquire().unwrap();

        let other = allocator(&dir, 2).with_owner(alloc.owner() + 100_000);
        let err = other.acquire().unwrap_err();
        assert!(matches!(err, CoreError::NoSlotAvailable));
        assert!(err.is_retryable());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn concurrent_acquirers_get_disjoint_slots() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator(&dir, 35);

        let leases: Vec<SlotLease> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16).map(|_| s.spawn(|| alloc.acquire().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let slots: HashSet<Slot> = leases.iter().map(SlotLease::slot).collect();
        assert_eq!(slots.len(), leases.len());
    }

    #[test]
    fn live_owners_racing_get_disjoint_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut owners: Vec<std::process::Child> = (0..8)
            .map(|_| std::process::Command::new("sleep").arg("30").spawn().unwrap())
            .collect();
        let allocators: Vec<SlotAllocator> = owners
            .iter()
            .map(|c| allocator(&dir, 35).with_owner(c.id() as i32))
            .collect();

        let results: Vec<CoreResult<SlotLease>> = std::thread::scope(|s| {
            let handles: Vec<_> = allocators
                .iter()
                .map(|a| s.spawn(move || a.acquire()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut leases = Vec::new();
        for r in results {
            match r {
                Ok(lease) => leases.push(lease),
                // Symmetric collisions may push a racer off the end of the pool.
                Err(e) => assert!(matches!(e, CoreError::NoSlotAvailable), "{e}"),
            }
        }
        assert!(!leases.is_empty());
        let slots: HashSet<Slot> = leases.iter().map(SlotLease::slot).collect();
        assert_eq!(slots.len(), leases.len());
        // Withdrawn claims leave no marker behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), leases.len());

        drop(leases);
        for c in &mut owners {
            c.kill().unwrap();
            c.wait().unwrap();
        }
    }

    #[test]
    fn missing_lock_dir_is_an_error() {
        let alloc = SlotAllocator::new("/nonexistent/lock/dir", "AIPS", 3);
        assert!(matches!(alloc.acquire(), Err(CoreError::File { .. })));
    }
}
