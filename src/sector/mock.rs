//! Recording collaborators for testing
//!
//! These record every callback a sector makes so tests can assert on the
//! free-list protocol without a real pool.

use super::allocator::SectorAllocator;
use super::manager::{SectorManager, WriteCacheManager};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Free-list callback observed by [`RecordingSectorManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeListEvent {
    Added(u32),
    Removed(u32),
    Trimmed { sector: u32, unused_bytes: usize },
}

/// In-memory sector manager that tracks membership and records events
#[derive(Clone, Default)]
pub struct RecordingSectorManager {
    members: Arc<Mutex<HashSet<u32>>>,
    events: Arc<Mutex<Vec<FreeListEvent>>>,
}

impl RecordingSectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sector is currently on the free list
    pub fn contains(&self, sector: u32) -> bool {
        self.members.lock().contains(&sector)
    }

    /// Every callback received so far, in order
    pub fn events(&self) -> Vec<FreeListEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}

impl SectorManager for RecordingSectorManager {
    fn add_to_free_list(&self, sector: &SectorAllocator) {
        self.members.lock().insert(sector.index());
        self.events.lock().push(FreeListEvent::Added(sector.index()));
    }

    fn remove_from_free_list(&self, sector: &SectorAllocator) {
        self.members.lock().remove(&sector.index());
        self.events.lock().push(FreeListEvent::Removed(sector.index()));
    }

    fn trim_sector(&self, unused_bytes: usize, sector: &SectorAllocator) {
        self.events.lock().push(FreeListEvent::Trimmed {
            sector: sector.index(),
            unused_bytes,
        });
    }
}

/// Write cache that remembers which physical addresses were dropped
#[derive(Clone, Default)]
pub struct RecordingWriteCache {
    pending: Arc<Mutex<HashSet<u64>>>,
    removed: Arc<Mutex<Vec<u64>>>,
}

impl RecordingWriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a write to `physical_addr` is buffered
    pub fn buffer_write(&self, physical_addr: u64) {
        self.pending.lock().insert(physical_addr);
    }

    pub fn is_pending(&self, physical_addr: u64) -> bool {
        self.pending.lock().contains(&physical_addr)
    }

    /// Addresses the allocator asked to drop
    pub fn removed(&self) -> Vec<u64> {
        self.removed.lock().clone()
    }
}

impl WriteCacheManager for RecordingWriteCache {
    fn remove_write_to_addr(&self, physical_addr: u64) -> bool {
        self.removed.lock().push(physical_addr);
        self.pending.lock().remove(&physical_addr)
    }
}
