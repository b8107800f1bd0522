//! Bitmap allocator for a single sector
//!
//! A sector is carved into tag-blocks of 32 equally sized slots. Each slot
//! has three state bits:
//!
//! ```text
//! live       allocated and visible to new readers
//! transient  reserved in the current epoch (live + freed-but-held slots)
//! committed  live as of the last commit
//! ```
//!
//! `live ⊆ transient` and `committed ⊆ transient` hold at all times. New
//! allocations only take slots clear in `transient`, which keeps slots of the
//! last committed snapshot resolvable until the session is released.

use super::address::SectorAddr;
use super::bits::TagBits;
use super::manager::{SectorManager, WriteCacheManager};
use super::size_class::{initial_reserve_bytes, SizeClass, SLOTS_PER_BLOCK};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Bytes of sector metadata the tag-block table has to fit in
pub const META_SIZE: usize = 8192;

/// Tag-blocks per sector: index, address and checksum words, then 4 bytes of
/// bits plus a 1 byte tag per block
pub const MAX_TAG_BLOCKS: usize = (META_SIZE - 12) / (4 + 1);

/// Free slots per tag-block every class needs before a sector rejoins the free list
pub const DEFAULT_FREE_LIST_THRESHOLD: u32 = 2;

/// Entry in a sector's tag-block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagBlock {
    Unassigned,
    Assigned {
        class: SizeClass,
        /// Byte offset of the block's first slot within the sector
        base_offset: usize,
    },
}

/// Outcome of trying to append a tag-block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Grown,
    /// Region bytes exhausted
    SectorFull,
    /// Tag-block table exhausted
    BitsExhausted,
}

#[derive(Debug, Default, Clone, Copy)]
struct ClassCounters {
    free: u32,
    /// Tag-blocks assigned to the class
    total: u32,
    allocations: u64,
    recycles: u64,
}

/// Allocator for one fixed-capacity sector
pub struct SectorAllocator {
    index: u32,
    start_address: u64,
    max_sector_size: usize,
    /// Bytes covered by assigned tag-blocks
    allocated_bytes: usize,
    blocks: Vec<TagBlock>,
    live: Vec<TagBits>,
    transient: Vec<TagBits>,
    committed: Vec<TagBits>,
    counters: [ClassCounters; SizeClass::COUNT],
    on_free_list: bool,
    preserve_session: bool,
    trimmed: bool,
    free_list_threshold: u32,
    manager: Arc<dyn SectorManager>,
    writes: Option<Arc<dyn WriteCacheManager>>,
}

impl SectorAllocator {
    /// Create a sector with one tag-block per size class and put it on the free list
    ///
    /// # Arguments
    /// * `index` - Sector index encoded into every address it hands out
    /// * `start_address` - Physical address of the sector's first byte
    /// * `max_sector_size` - Byte capacity of the backing region
    pub fn new(
        index: u32,
        start_address: u64,
        max_sector_size: usize,
        manager: Arc<dyn SectorManager>,
        writes: Option<Arc<dyn WriteCacheManager>>,
    ) -> Result<Self> {
        if index as usize >= super::address::MAX_SECTORS {
            return Err(Error::Config(format!(
                "Sector index {} exceeds the addressable maximum {}",
                index,
                super::address::MAX_SECTORS - 1
            )));
        }
        if max_sector_size < initial_reserve_bytes() {
            return Err(Error::Config(format!(
                "Sector size {} is below the initial reserve of {} bytes",
                max_sector_size,
                initial_reserve_bytes()
            )));
        }

        let mut sector = Self {
            index,
            start_address,
            max_sector_size,
            allocated_bytes: 0,
            blocks: Vec::with_capacity(SizeClass::COUNT),
            live: Vec::with_capacity(SizeClass::COUNT),
            transient: Vec::with_capacity(SizeClass::COUNT),
            committed: Vec::with_capacity(SizeClass::COUNT),
            counters: [ClassCounters::default(); SizeClass::COUNT],
            on_free_list: false,
            preserve_session: false,
            trimmed: false,
            free_list_threshold: DEFAULT_FREE_LIST_THRESHOLD,
            manager,
            writes,
        };

        for class in SizeClass::ALL {
            let growth = sector.add_new_tag(class);
            debug_assert_eq!(growth, Growth::Grown);
        }

        info!(
            sector = index,
            start_address,
            max_sector_size,
            "Initialized sector"
        );

        sector.on_free_list = true;
        sector.manager.add_to_free_list(&sector);

        Ok(sector)
    }

    /// Override the per-block free slot count required to rejoin the free list
    pub fn set_free_list_threshold(&mut self, threshold: u32) {
        self.free_list_threshold = threshold;
    }

    /// Allocate a slot for `size` bytes
    ///
    /// Returns `Ok(None)` when the sector cannot serve the size class.
    pub fn alloc(&mut self, size: usize) -> Result<Option<SectorAddr>> {
        let class = SizeClass::for_size(size)?;
        debug_assert!(class.can_fit(size));
        let ci = class.index();

        if self.counters[ci].free == 0 && !self.grow_or_evict(class) {
            return Ok(None);
        }

        for word in 0..self.blocks.len() {
            match self.blocks[word] {
                TagBlock::Assigned { class: c, .. } if c == class => {}
                _ => continue,
            }

            let Some(b) = self.transient[word].first_zero() else {
                continue;
            };

            self.live[word].set(b);
            self.transient[word].set(b);
            self.counters[ci].free -= 1;
            self.counters[ci].allocations += 1;

            if self.counters[ci].free == 0 {
                self.grow_or_evict(class);
            }

            let addr = SectorAddr::new(self.index, word as u32 * TagBits::WIDTH + b);
            trace!(%addr, size, %class, "Allocated slot");
            return Ok(Some(addr));
        }

        warn!(
            sector = self.index,
            %class,
            free = self.counters[ci].free,
            "Free count claims capacity but no clear bit was found"
        );
        Ok(None)
    }

    /// Release the slot at `bit`
    ///
    /// The slot is recycled immediately unless it belongs to the committed
    /// baseline or the session is preserved; in those cases it stays reserved
    /// until [`commit`](Self::commit) or [`release_session`](Self::release_session).
    pub fn free(&mut self, bit: u32) -> Result<()> {
        let (word, b) = split(bit);
        let class = match self.tag_block(word) {
            TagBlock::Assigned { class, .. } => class,
            TagBlock::Unassigned => {
                return Err(Error::ProtocolViolation(format!(
                    "Free of unassigned slot {} in sector {}",
                    bit, self.index
                )))
            }
        };

        if !self.live[word].test(b) {
            return Err(Error::ProtocolViolation(format!(
                "Request to free bit not set: sector {} bit {} (double free or never allocated)",
                self.index, bit
            )));
        }

        let physical = self.physical_address(bit);
        self.live[word].clear(b);

        if !self.committed[word].test(b) && !self.preserve_session {
            self.transient[word].clear(b);
            let counters = &mut self.counters[class.index()];
            counters.free += 1;
            counters.recycles += 1;
            trace!(sector = self.index, bit, %class, "Recycled slot");
        } else {
            trace!(sector = self.index, bit, %class, "Deferred slot recycling");
        }

        if let (Some(writes), Some(physical)) = (&self.writes, physical) {
            if writes.remove_write_to_addr(physical) {
                trace!(physical, "Removed pending write to freed slot");
            }
        }

        self.maybe_rejoin_free_list();
        Ok(())
    }

    /// Byte offset of `bit` within the sector
    pub fn bit_to_offset(&self, bit: u32) -> Option<usize> {
        let (word, b) = split(bit);
        match self.tag_block(word) {
            TagBlock::Assigned { class, base_offset } => {
                Some(base_offset + b as usize * class.size())
            }
            TagBlock::Unassigned => None,
        }
    }

    /// Slot size in bytes of `bit`
    pub fn slot_size(&self, bit: u32) -> Option<usize> {
        match self.tag_block(split(bit).0) {
            TagBlock::Assigned { class, .. } => Some(class.size()),
            TagBlock::Unassigned => None,
        }
    }

    /// Absolute address of `bit`, or `None` once the slot is no longer reserved
    pub fn physical_address(&self, bit: u32) -> Option<u64> {
        if !self.is_gettable(bit) {
            return None;
        }
        self.bit_to_offset(bit)
            .map(|offset| self.start_address + offset as u64)
    }

    /// Snapshot `live` as the committed baseline
    pub fn commit(&mut self) {
        self.committed.clone_from(&self.live);
        if !self.preserve_session {
            self.transient.clone_from(&self.live);
        }
        self.debug_check_bitmaps();
        self.recount_free();
        debug!(sector = self.index, preserved = self.preserve_session, "Committed sector");
        self.maybe_rejoin_free_list();
    }

    /// Hold freed slots reserved until [`release_session`](Self::release_session)
    pub fn preserve_session_data(&mut self) {
        self.preserve_session = true;
    }

    /// End session preservation
    ///
    /// Slots freed since the last commit leave the committed baseline, then
    /// `transient` is recomputed as `committed | live`. Without intervening
    /// frees this leaves `transient` unchanged.
    pub fn release_session(&mut self) {
        for word in 0..self.blocks.len() {
            self.committed[word] = self.committed[word].intersect(self.live[word]);
            self.transient[word] = self.committed[word].union(self.live[word]);
        }
        self.preserve_session = false;
        self.debug_check_bitmaps();
        self.recount_free();
        debug!(sector = self.index, "Released sector session");
        self.maybe_rejoin_free_list();
    }

    /// Whether every size class has at least `threshold` free slots per tag-block
    pub fn has_free(&self, threshold: u32) -> bool {
        self.counters
            .iter()
            .all(|c| c.free >= threshold * c.total)
    }

    pub fn is_committed(&self, bit: u32) -> bool {
        self.test(&self.committed, bit)
    }

    pub fn is_gettable(&self, bit: u32) -> bool {
        self.test(&self.transient, bit)
    }

    pub fn is_live(&self, bit: u32) -> bool {
        self.test(&self.live, bit)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    pub fn max_sector_size(&self) -> usize {
        self.max_sector_size
    }

    pub fn is_on_free_list(&self) -> bool {
        self.on_free_list
    }

    pub fn is_session_preserved(&self) -> bool {
        self.preserve_session
    }

    /// Tag-block table entry `block`
    pub fn tag_block(&self, block: usize) -> TagBlock {
        self.blocks.get(block).copied().unwrap_or(TagBlock::Unassigned)
    }

    pub fn tag_block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn free_count(&self, class: SizeClass) -> u32 {
        self.counters[class.index()].free
    }

    /// Slots assigned to `class` across all its tag-blocks
    pub fn total_slots(&self, class: SizeClass) -> u32 {
        self.counters[class.index()].total * SLOTS_PER_BLOCK as u32
    }

    pub fn live_count(&self, class: SizeClass) -> u32 {
        self.count_class(&self.live, class)
    }

    /// Slots unavailable to new allocations, live or held for a snapshot
    pub fn reserved_count(&self, class: SizeClass) -> u32 {
        self.count_class(&self.transient, class)
    }

    pub fn stats(&self) -> SectorStats {
        let classes = SizeClass::ALL
            .iter()
            .map(|&class| {
                let counters = self.counters[class.index()];
                SizeClassStats {
                    slot_size: class.size(),
                    total_slots: self.total_slots(class),
                    free_slots: counters.free,
                    live_slots: self.live_count(class),
                    reserved_slots: self.reserved_count(class),
                    allocations: counters.allocations,
                    recycles: counters.recycles,
                }
            })
            .collect();

        SectorStats {
            index: self.index,
            start_address: self.start_address,
            on_free_list: self.on_free_list,
            tag_blocks: self.blocks.len(),
            allocated_bytes: self.allocated_bytes,
            max_sector_size: self.max_sector_size,
            classes,
        }
    }

    fn add_new_tag(&mut self, class: SizeClass) -> Growth {
        if self.blocks.len() >= MAX_TAG_BLOCKS {
            debug!(sector = self.index, %class, "No tag-block added: sector bits exhausted");
            return Growth::BitsExhausted;
        }

        let block_bytes = class.block_bytes();
        if self.allocated_bytes + block_bytes > self.max_sector_size {
            debug!(sector = self.index, %class, "No tag-block added: sector size exhausted");
            return Growth::SectorFull;
        }

        self.blocks.push(TagBlock::Assigned {
            class,
            base_offset: self.allocated_bytes,
        });
        self.live.push(TagBits::EMPTY);
        self.transient.push(TagBits::EMPTY);
        self.committed.push(TagBits::EMPTY);
        self.allocated_bytes += block_bytes;

        let counters = &mut self.counters[class.index()];
        counters.free += SLOTS_PER_BLOCK as u32;
        counters.total += 1;

        trace!(sector = self.index, %class, blocks = self.blocks.len(), "Added tag-block");
        Growth::Grown
    }

    /// Add a tag-block for `class`, leaving the free list if that is impossible
    fn grow_or_evict(&mut self, class: SizeClass) -> bool {
        match self.add_new_tag(class) {
            Growth::Grown => return true,
            Growth::SectorFull => {}
            Growth::BitsExhausted => {
                if !self.trimmed {
                    self.trimmed = true;
                    let unused = self.max_sector_size - self.allocated_bytes;
                    info!(sector = self.index, unused, "Trimming sector");
                    self.manager.trim_sector(unused, self);
                }
            }
        }

        if self.on_free_list {
            self.on_free_list = false;
            info!(sector = self.index, stats = %self, "Removing sector from free list");
            self.manager.remove_from_free_list(self);
        }
        false
    }

    fn maybe_rejoin_free_list(&mut self) {
        if !self.on_free_list && self.has_free(self.free_list_threshold) {
            self.on_free_list = true;
            info!(sector = self.index, stats = %self, "Returning sector to free list");
            self.manager.add_to_free_list(self);
        }
    }

    /// Rebuild free counters from `transient`, crediting reclaimed slots as recycles
    fn recount_free(&mut self) {
        for class in SizeClass::ALL {
            let counters = &mut self.counters[class.index()];
            let free = counters.total * SLOTS_PER_BLOCK as u32
                - count_class(&self.blocks, &self.transient, class);
            debug_assert!(free >= counters.free);
            counters.recycles += u64::from(free.saturating_sub(counters.free));
            counters.free = free;
        }
    }

    /// `live` and `committed` must both stay within `transient`
    fn debug_check_bitmaps(&self) {
        for word in 0..self.blocks.len() {
            debug_assert!(self.live[word].is_subset_of(&self.transient[word]));
            debug_assert!(self.committed[word].is_subset_of(&self.transient[word]));
        }
    }

    fn count_class(&self, bits: &[TagBits], class: SizeClass) -> u32 {
        count_class(&self.blocks, bits, class)
    }

    fn test(&self, bits: &[TagBits], bit: u32) -> bool {
        let (word, b) = split(bit);
        bits.get(word).is_some_and(|w| w.test(b))
    }
}

impl fmt::Display for SectorAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.counters {
            write!(
                f,
                "({})[T{},A{},F{},R{}]",
                c.free / c.total.max(1),
                c.total * SLOTS_PER_BLOCK as u32,
                c.allocations,
                c.free,
                c.recycles
            )?;
        }
        Ok(())
    }
}

impl fmt::Debug for SectorAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectorAllocator")
            .field("index", &self.index)
            .field("start_address", &self.start_address)
            .field("tag_blocks", &self.blocks.len())
            .field("on_free_list", &self.on_free_list)
            .field("preserve_session", &self.preserve_session)
            .finish()
    }
}

fn split(bit: u32) -> (usize, u32) {
    ((bit / TagBits::WIDTH) as usize, bit % TagBits::WIDTH)
}

fn count_class(blocks: &[TagBlock], bits: &[TagBits], class: SizeClass) -> u32 {
    blocks
        .iter()
        .zip(bits)
        .filter(|(block, _)| matches!(block, TagBlock::Assigned { class: c, .. } if *c == class))
        .map(|(_, bits)| bits.count())
        .sum()
}

/// Statistics for one sector
#[derive(Debug, Clone, Serialize)]
pub struct SectorStats {
    pub index: u32,
    pub start_address: u64,
    pub on_free_list: bool,
    pub tag_blocks: usize,
    pub allocated_bytes: usize,
    pub max_sector_size: usize,
    pub classes: Vec<SizeClassStats>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SizeClassStats {
    pub slot_size: usize,
    pub total_slots: u32,
    pub free_slots: u32,
    pub live_slots: u32,
    pub reserved_slots: u32,
    pub allocations: u64,
    pub recycles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::mock::{FreeListEvent, RecordingSectorManager, RecordingWriteCache};
    use crate::sector::size_class::BLOB_SIZE;
    use std::collections::HashSet;

    const SECTOR_SIZE: usize = 1024 * 1024;

    fn new_sector(size: usize) -> (SectorAllocator, RecordingSectorManager) {
        let pool = RecordingSectorManager::new();
        let sector = SectorAllocator::new(0, 0, size, Arc::new(pool.clone()), None).unwrap();
        (sector, pool)
    }

    fn assert_accounting(sector: &SectorAllocator) {
        for class in SizeClass::ALL {
            assert_eq!(
                sector.free_count(class) + sector.reserved_count(class),
                sector.total_slots(class),
                "accounting broken for {}",
                class
            );
            assert!(sector.live_count(class) <= sector.reserved_count(class));
        }
    }

    #[test]
    fn test_new_sector_joins_free_list() {
        let (sector, pool) = new_sector(SECTOR_SIZE);
        assert!(sector.is_on_free_list());
        assert!(pool.contains(0));
        assert_eq!(sector.tag_block_count(), SizeClass::COUNT);
        for class in SizeClass::ALL {
            assert_eq!(sector.free_count(class), 32);
            assert_eq!(sector.total_slots(class), 32);
        }
        assert_eq!(sector.tag_block(SizeClass::COUNT), TagBlock::Unassigned);
    }

    #[test]
    fn test_rejects_undersized_region() {
        let pool = RecordingSectorManager::new();
        let result = SectorAllocator::new(0, 0, initial_reserve_bytes() - 1, Arc::new(pool), None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_growth_on_class_exhaustion() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let mut seen = HashSet::new();

        for i in 0..40 {
            let addr = sector.alloc(64).unwrap().expect("sector has capacity");
            assert!(seen.insert(addr), "duplicate address {}", addr);
            if i == 31 {
                assert_eq!(sector.tag_block_count(), SizeClass::COUNT + 1);
            }
            assert_accounting(&sector);
        }

        assert_eq!(seen.len(), 40);
        assert_eq!(sector.free_count(SizeClass::B64), 24);
        assert_eq!(sector.total_slots(SizeClass::B64), 64);
    }

    #[test]
    fn test_free_without_commit_recycles_immediately() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let before = sector.free_count(SizeClass::B64);

        let addrs: Vec<_> = (0..10).map(|_| sector.alloc(64).unwrap().unwrap()).collect();
        assert_eq!(sector.free_count(SizeClass::B64), before - 10);

        for addr in &addrs {
            sector.free(addr.bit).unwrap();
            assert_accounting(&sector);
            assert!(!sector.is_gettable(addr.bit));
        }

        assert_eq!(sector.free_count(SizeClass::B64), before);
        assert_eq!(sector.stats().classes[0].recycles, 10);
    }

    #[test]
    fn test_committed_frees_wait_for_session_release() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let addrs: Vec<_> = (0..5).map(|_| sector.alloc(100).unwrap().unwrap()).collect();
        sector.commit();

        let after_commit = sector.free_count(SizeClass::B128);
        for addr in &addrs[..3] {
            sector.free(addr.bit).unwrap();
            assert!(sector.is_gettable(addr.bit));
            assert!(sector.is_committed(addr.bit));
        }
        assert_eq!(sector.free_count(SizeClass::B128), after_commit);
        assert_accounting(&sector);

        sector.release_session();
        assert_eq!(sector.free_count(SizeClass::B128), after_commit + 3);
        for addr in &addrs[..3] {
            assert!(!sector.is_gettable(addr.bit));
        }
        for addr in &addrs[3..] {
            assert!(sector.is_gettable(addr.bit));
            assert!(sector.is_live(addr.bit));
        }
        assert_accounting(&sector);
    }

    #[test]
    fn test_preserved_session_defers_uncommitted_frees() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        sector.preserve_session_data();

        let addr = sector.alloc(64).unwrap().unwrap();
        let before = sector.free_count(SizeClass::B64);
        sector.free(addr.bit).unwrap();

        assert_eq!(sector.free_count(SizeClass::B64), before);
        assert!(sector.is_gettable(addr.bit));

        // A new allocation must not reuse the held slot
        let other = sector.alloc(64).unwrap().unwrap();
        assert_ne!(other, addr);

        sector.release_session();
        assert!(!sector.is_session_preserved());
        assert_eq!(sector.free_count(SizeClass::B64), before);
        assert!(!sector.is_gettable(addr.bit));
        assert_accounting(&sector);
    }

    #[test]
    fn test_commit_without_session_reclaims_held_slots() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let addr = sector.alloc(64).unwrap().unwrap();
        sector.commit();
        sector.free(addr.bit).unwrap();
        assert!(sector.is_gettable(addr.bit));

        sector.commit();
        assert!(!sector.is_gettable(addr.bit));
        assert!(!sector.is_committed(addr.bit));
        assert_eq!(sector.free_count(SizeClass::B64), 32);
    }

    #[test]
    fn test_release_session_is_idempotent_without_frees() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let addrs: Vec<_> = (0..6).map(|_| sector.alloc(300).unwrap().unwrap()).collect();
        sector.commit();
        sector.alloc(300).unwrap().unwrap();

        let gettable: Vec<_> = (0..64).map(|bit| sector.is_gettable(bit + 96)).collect();
        let free = sector.free_count(SizeClass::B512);
        sector.release_session();

        let after: Vec<_> = (0..64).map(|bit| sector.is_gettable(bit + 96)).collect();
        assert_eq!(gettable, after);
        assert_eq!(sector.free_count(SizeClass::B512), free);
        assert!(addrs.iter().all(|a| sector.is_committed(a.bit)));
    }

    #[test]
    fn test_double_free_is_protocol_violation() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let addr = sector.alloc(64).unwrap().unwrap();
        sector.free(addr.bit).unwrap();

        let err = sector.free(addr.bit).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));

        let err = sector.free(10_000).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn test_oversized_request_leaves_state_untouched() {
        let (mut sector, pool) = new_sector(SECTOR_SIZE);
        pool.clear_events();

        assert_eq!(
            sector.alloc(BLOB_SIZE + 1),
            Err(Error::InvalidSize {
                size: BLOB_SIZE + 1,
                max: BLOB_SIZE
            })
        );
        assert!(sector.alloc(0).is_err());
        for class in SizeClass::ALL {
            assert_eq!(sector.free_count(class), 32);
            assert_eq!(sector.live_count(class), 0);
        }
        assert!(pool.events().is_empty());
    }

    #[test]
    fn test_offsets_follow_tag_blocks() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        let first = sector.alloc(64).unwrap().unwrap();
        let second = sector.alloc(64).unwrap().unwrap();
        assert_eq!(sector.bit_to_offset(first.bit), Some(0));
        assert_eq!(sector.bit_to_offset(second.bit), Some(64));

        // Second block is the 128-byte class, starting after 32 x 64 bytes
        let wide = sector.alloc(128).unwrap().unwrap();
        assert_eq!(wide.bit, 32);
        assert_eq!(sector.bit_to_offset(wide.bit), Some(2048));
        assert_eq!(sector.slot_size(wide.bit), Some(128));

        let blob = sector.alloc(BLOB_SIZE).unwrap().unwrap();
        assert_eq!(sector.slot_size(blob.bit), Some(BLOB_SIZE));
        assert_eq!(
            sector.bit_to_offset(blob.bit),
            Some(initial_reserve_bytes() - SizeClass::Blob.block_bytes())
        );
        assert_eq!(sector.bit_to_offset(10_000), None);
    }

    #[test]
    fn test_physical_address_guards_freed_slots() {
        let pool = RecordingSectorManager::new();
        let mut sector =
            SectorAllocator::new(3, 3 * SECTOR_SIZE as u64, SECTOR_SIZE, Arc::new(pool), None)
                .unwrap();
        let addr = sector.alloc(64).unwrap().unwrap();
        assert_eq!(addr.sector, 3);

        let second = sector.alloc(64).unwrap().unwrap();
        assert_eq!(
            sector.physical_address(second.bit),
            Some(3 * SECTOR_SIZE as u64 + 64)
        );

        sector.free(second.bit).unwrap();
        assert_eq!(sector.physical_address(second.bit), None);
        assert!(sector.physical_address(addr.bit).is_some());
    }

    #[test]
    fn test_full_sector_leaves_and_rejoins_free_list() {
        let (mut sector, pool) = new_sector(initial_reserve_bytes());
        let addrs: Vec<_> = (0..32).map(|_| sector.alloc(64).unwrap().unwrap()).collect();

        assert!(!sector.is_on_free_list());
        assert!(!pool.contains(0));
        assert_eq!(pool.events().last(), Some(&FreeListEvent::Removed(0)));
        assert_eq!(sector.alloc(64).unwrap(), None);

        // Other classes still serve, but the sector stays off the list
        assert!(sector.alloc(128).unwrap().is_some());

        sector.free(addrs[0].bit).unwrap();
        assert!(!sector.is_on_free_list());
        sector.free(addrs[1].bit).unwrap();
        assert!(sector.is_on_free_list());
        assert!(pool.contains(0));
    }

    #[test]
    fn test_threshold_is_tunable() {
        let (mut sector, pool) = new_sector(initial_reserve_bytes());
        sector.set_free_list_threshold(4);
        let addrs: Vec<_> = (0..32).map(|_| sector.alloc(64).unwrap().unwrap()).collect();

        for addr in &addrs[..3] {
            sector.free(addr.bit).unwrap();
        }
        assert!(!pool.contains(0));
        sector.free(addrs[3].bit).unwrap();
        assert!(pool.contains(0));
    }

    #[test]
    fn test_tag_table_exhaustion_trims_once() {
        let (mut sector, pool) = new_sector(64 * 1024 * 1024);
        let capacity = (MAX_TAG_BLOCKS - SizeClass::COUNT + 1) * SLOTS_PER_BLOCK;

        for _ in 0..capacity {
            sector.alloc(64).unwrap().expect("bits remain");
        }
        assert_eq!(sector.tag_block_count(), MAX_TAG_BLOCKS);
        assert_eq!(sector.alloc(64).unwrap(), None);
        assert_eq!(sector.alloc(64).unwrap(), None);

        let trims: Vec<_> = pool
            .events()
            .into_iter()
            .filter(|e| matches!(e, FreeListEvent::Trimmed { .. }))
            .collect();
        let used = initial_reserve_bytes()
            + (MAX_TAG_BLOCKS - SizeClass::COUNT) * SizeClass::B64.block_bytes();
        assert_eq!(
            trims,
            vec![FreeListEvent::Trimmed {
                sector: 0,
                unused_bytes: 64 * 1024 * 1024 - used
            }]
        );
        assert!(!pool.contains(0));
    }

    #[test]
    fn test_free_drops_pending_write() {
        let pool = RecordingSectorManager::new();
        let cache = RecordingWriteCache::new();
        let mut sector = SectorAllocator::new(
            0,
            4096,
            SECTOR_SIZE,
            Arc::new(pool),
            Some(Arc::new(cache.clone())),
        )
        .unwrap();

        sector.alloc(64).unwrap().unwrap();
        let addr = sector.alloc(64).unwrap().unwrap();
        let physical = sector.physical_address(addr.bit).unwrap();
        cache.buffer_write(physical);

        sector.free(addr.bit).unwrap();
        assert_eq!(cache.removed(), vec![4096 + 64]);
        assert!(!cache.is_pending(physical));
    }

    #[test]
    fn test_display_summarises_classes() {
        let (mut sector, _pool) = new_sector(SECTOR_SIZE);
        sector.alloc(64).unwrap();
        let summary = sector.to_string();
        assert!(summary.starts_with("(31)[T32,A1,F31,R0]"));
        assert_eq!(summary.matches('[').count(), SizeClass::COUNT);
    }
}
