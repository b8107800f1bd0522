//! Memory manager façade
//!
//! # Architecture
//!
//! ```text
//! SectorMemoryManager (root context)
//!   ├─→ PoolFreeList        sectors eligible to allocate, MRU first
//!   ├─→ Sector #0 → SectorAllocator + 64 MiB region
//!   ├─→ Sector #1 → SectorAllocator + 64 MiB region
//!   └─→ AllocationContext
//!        └─→ AllocationContext
//! ```
//!
//! Façade addresses are `i64`: the sector address in the high 32 bits and the
//! application byte length in the low 32 bits.

pub mod buffer_pool;
pub mod context;
pub mod free_list;
pub mod manager;

pub use buffer_pool::{BufferPool, HeapBufferPool};
pub use context::AllocationContext;
pub use free_list::PoolFreeList;
pub use manager::{MemoryManagerStats, SectorMemoryManager};

use crate::error::Result;

/// Read-only view onto an allocation
///
/// Holds a shared lock on the owning sector's region only; allocation
/// bookkeeping never waits for it. Writes into that sector and a root
/// `clear` wait until the view is dropped.
pub type SlotView<'a> = parking_lot::MappedRwLockReadGuard<'a, [u8]>;

/// Allocation scope: the root manager or one of its allocation contexts
pub trait MemoryManager {
    /// Allocate `nbytes`, waiting for capacity when `blocking` is set
    ///
    /// Fails with `ResourceExhausted` when non-blocking and every sector is saturated.
    fn allocate(&self, nbytes: usize, blocking: bool) -> Result<i64>;

    /// Allocate and copy `data` into the new slot
    fn allocate_bytes(&self, data: &[u8], blocking: bool) -> Result<i64>;

    /// View the allocation at `addr`
    ///
    /// Do not write into the same sector or clear the root from the thread
    /// holding the view.
    fn get(&self, addr: i64) -> Result<SlotView<'_>>;

    /// Overwrite the allocation at `addr`; `data` must be exactly its length
    fn write(&self, addr: i64, data: &[u8]) -> Result<()>;

    /// Copy of the allocation at `addr`
    fn read(&self, addr: i64) -> Result<Vec<u8>> {
        self.get(addr).map(|view| view.to_vec())
    }

    /// Release `addr`
    fn free(&self, addr: i64) -> Result<()>;

    /// Release every allocation in this scope and its child contexts
    fn clear(&self) -> Result<()>;

    /// Create a child scope
    fn create_allocation_context(&self) -> Result<AllocationContext>;

    /// Application byte length of `addr`
    fn allocation_size(&self, addr: i64) -> Result<usize>;

    /// Allocations in this scope, including child contexts
    fn allocation_count(&self) -> u64;

    /// Application bytes in this scope, including child contexts
    fn user_bytes(&self) -> u64;

    /// Slot bytes in this scope, including child contexts
    fn slot_bytes(&self) -> u64;
}
