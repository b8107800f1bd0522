//! Collaborator traits a sector calls back into

use super::allocator::SectorAllocator;

/// Pool-side view of sector availability
///
/// A [`SectorAllocator`] reports its own free-list membership changes through
/// this trait and never inspects sibling sectors.
pub trait SectorManager: Send + Sync {
    /// The sector can serve every size class again
    fn add_to_free_list(&self, sector: &SectorAllocator);

    /// The sector can no longer serve at least one size class
    fn remove_from_free_list(&self, sector: &SectorAllocator);

    /// The sector ran out of tag-blocks with `unused_bytes` of its region untouched
    fn trim_sector(&self, unused_bytes: usize, sector: &SectorAllocator);
}

/// Buffered-write cache sitting in front of the backing store
pub trait WriteCacheManager: Send + Sync {
    /// Drop any pending write at `physical_addr`; returns whether one was dropped
    fn remove_write_to_addr(&self, physical_addr: u64) -> bool;
}
