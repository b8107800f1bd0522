//! Pool-side free list of sectors
//!
//! Membership changes are O(1): removal only drops the member flag, and stale
//! stack entries are skipped (and periodically compacted) when the list is
//! scanned.

use crate::sector::{SectorAllocator, SectorManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Sectors eligible to serve allocations, most recently added first
#[derive(Default)]
pub struct PoolFreeList {
    inner: Mutex<FreeListInner>,
    trimmed_bytes: AtomicU64,
}

#[derive(Default)]
struct FreeListInner {
    /// `(sector, epoch)` in insertion order
    stack: Vec<(u32, u64)>,
    /// Epoch of each sector's current membership
    member: Vec<Option<u64>>,
    next_epoch: u64,
    len: usize,
}

impl FreeListInner {
    fn add(&mut self, sector: u32) {
        let idx = sector as usize;
        if self.member.len() <= idx {
            self.member.resize(idx + 1, None);
        }
        if self.member[idx].is_some() {
            return;
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.member[idx] = Some(epoch);
        self.stack.push((sector, epoch));
        self.len += 1;

        if self.stack.len() > 2 * self.len + 16 {
            let member = &self.member;
            self.stack
                .retain(|&(s, e)| member.get(s as usize).copied().flatten() == Some(e));
        }
    }

    fn remove(&mut self, sector: u32) {
        if let Some(slot) = self.member.get_mut(sector as usize) {
            if slot.take().is_some() {
                self.len -= 1;
            }
        }
    }
}

impl PoolFreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current members, most recently made eligible first
    pub fn candidates(&self) -> Vec<u32> {
        let inner = self.inner.lock();
        inner
            .stack
            .iter()
            .rev()
            .filter(|&&(s, e)| inner.member.get(s as usize).copied().flatten() == Some(e))
            .map(|&(s, _)| s)
            .collect()
    }

    pub fn contains(&self, sector: u32) -> bool {
        let inner = self.inner.lock();
        inner
            .member
            .get(sector as usize)
            .is_some_and(|m| m.is_some())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left unused by sectors that ran out of tag-blocks
    pub fn trimmed_bytes(&self) -> u64 {
        self.trimmed_bytes.load(Ordering::Relaxed)
    }

    /// Forget every member
    pub fn reset(&self) {
        *self.inner.lock() = FreeListInner::default();
    }
}

impl SectorManager for PoolFreeList {
    fn add_to_free_list(&self, sector: &SectorAllocator) {
        self.inner.lock().add(sector.index());
        debug!(sector = sector.index(), "Sector added to free list");
    }

    fn remove_from_free_list(&self, sector: &SectorAllocator) {
        self.inner.lock().remove(sector.index());
        debug!(sector = sector.index(), "Sector removed from free list");
    }

    fn trim_sector(&self, unused_bytes: usize, sector: &SectorAllocator) {
        self.trimmed_bytes
            .fetch_add(unused_bytes as u64, Ordering::Relaxed);
        info!(sector = sector.index(), unused_bytes, "Sector trimmed");
    }
}
