//! Scoped allocation contexts

use super::manager::{allocation_size, ContextId, Shared};
use super::{MemoryManager, SlotView};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Child scope of a memory manager
///
/// Allocations made through a context are tracked against it and released
/// together by [`clear`](MemoryManager::clear). Contexts nest: a context's
/// counters and `clear` cover its descendants. Session and commit controls
/// stay on [`SectorMemoryManager`](super::SectorMemoryManager).
pub struct AllocationContext {
    shared: Arc<Shared>,
    id: ContextId,
}

impl AllocationContext {
    pub(crate) fn new(shared: Arc<Shared>, id: ContextId) -> Self {
        Self { shared, id }
    }

    /// Unique identifier of this context
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether `addr` was allocated through this context or a descendant
    pub fn owns(&self, addr: i64) -> bool {
        self.shared.owns(self.id, addr)
    }

    /// Whether the context is still attached to its manager
    pub fn is_attached(&self) -> bool {
        self.shared.contains_context(self.id)
    }

    /// Release every allocation and remove this context and its descendants
    pub fn detach(self) -> Result<()> {
        self.shared.detach_context(self.id)
    }
}

impl MemoryManager for AllocationContext {
    fn allocate(&self, nbytes: usize, blocking: bool) -> Result<i64> {
        self.shared.allocate(self.id, nbytes, blocking)
    }

    fn allocate_bytes(&self, data: &[u8], blocking: bool) -> Result<i64> {
        self.shared.allocate_bytes(self.id, data, blocking)
    }

    fn get(&self, addr: i64) -> Result<SlotView<'_>> {
        self.shared.get(addr)
    }

    fn write(&self, addr: i64, data: &[u8]) -> Result<()> {
        self.shared.write(addr, data)
    }

    fn free(&self, addr: i64) -> Result<()> {
        self.shared.free(addr, Some(self.id))
    }

    fn clear(&self) -> Result<()> {
        self.shared.clear(self.id)
    }

    fn create_allocation_context(&self) -> Result<AllocationContext> {
        let id = self.shared.create_context(self.id)?;
        Ok(AllocationContext::new(Arc::clone(&self.shared), id))
    }

    fn allocation_size(&self, addr: i64) -> Result<usize> {
        allocation_size(addr)
    }

    fn allocation_count(&self) -> u64 {
        self.shared.totals(self.id).0
    }

    fn user_bytes(&self) -> u64 {
        self.shared.totals(self.id).1
    }

    fn slot_bytes(&self) -> u64 {
        self.shared.totals(self.id).2
    }
}

impl fmt::Debug for AllocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationContext")
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryManagerConfig;
    use crate::error::Error;
    use crate::memory::SectorMemoryManager;

    fn manager() -> SectorMemoryManager {
        SectorMemoryManager::with_heap_pool(MemoryManagerConfig::new(1024 * 1024, 4)).unwrap()
    }

    #[test]
    fn test_counters_cover_descendants() {
        let mm = manager();
        let parent = mm.create_allocation_context().unwrap();
        let child = parent.create_allocation_context().unwrap();

        parent.allocate(10, false).unwrap();
        child.allocate(200, false).unwrap();
        mm.allocate(1, false).unwrap();

        assert_eq!(child.allocation_count(), 1);
        assert_eq!(child.slot_bytes(), 256);
        assert_eq!(parent.allocation_count(), 2);
        assert_eq!(parent.user_bytes(), 210);
        assert_eq!(parent.slot_bytes(), 64 + 256);
        assert_eq!(mm.allocation_count(), 3);
    }

    #[test]
    fn test_free_requires_ownership() {
        let mm = manager();
        let a = mm.create_allocation_context().unwrap();
        let b = mm.create_allocation_context().unwrap();
        let child = a.create_allocation_context().unwrap();

        let addr = child.allocate(32, false).unwrap();
        assert!(a.owns(addr));
        assert!(!b.owns(addr));
        assert!(matches!(b.free(addr), Err(Error::ProtocolViolation(_))));

        a.free(addr).unwrap();
        assert_eq!(child.allocation_count(), 0);
    }

    #[test]
    fn test_clear_leaves_siblings_and_root() {
        let mm = manager();
        let a = mm.create_allocation_context().unwrap();
        let b = mm.create_allocation_context().unwrap();

        let mine = a.allocate_bytes(b"mine", false).unwrap();
        let theirs = b.allocate_bytes(b"theirs", false).unwrap();
        let root = mm.allocate_bytes(b"root", false).unwrap();

        a.clear().unwrap();
        assert_eq!(a.allocation_count(), 0);
        assert!(mm.get(mine).is_err());
        assert_eq!(mm.read(theirs).unwrap(), b"theirs");
        assert_eq!(mm.read(root).unwrap(), b"root");

        // the context stays usable after clear
        a.allocate(8, false).unwrap();
        assert_eq!(a.allocation_count(), 1);
    }

    #[test]
    fn test_detach_removes_subtree() {
        let mm = manager();
        let parent = mm.create_allocation_context().unwrap();
        let child = parent.create_allocation_context().unwrap();
        let addr = child.allocate(16, false).unwrap();

        parent.detach().unwrap();
        assert!(!child.is_attached());
        assert!(mm.get(addr).is_err());
        assert_eq!(mm.allocation_count(), 0);
        assert!(matches!(
            child.allocate(16, false),
            Err(Error::UnknownContext(_))
        ));
    }
}
