//! Sector-backed memory manager

use super::buffer_pool::{BufferPool, HeapBufferPool};
use super::context::AllocationContext;
use super::free_list::PoolFreeList;
use super::{MemoryManager, SlotView};
use crate::config::MemoryManagerConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::sector::address::{pack, unpack, SectorAddr};
use crate::sector::{SectorAllocator, SectorManager, SectorStats, SizeClass, WriteCacheManager};
use prometheus::core::{AtomicU64, GenericGauge};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) type ContextId = Uuid;

/// Context owning allocations made directly on the manager
pub(crate) const ROOT_CONTEXT: ContextId = Uuid::nil();

/// Sector count above which `commit` fans out across threads
const PARALLEL_COMMIT_THRESHOLD: usize = 16;

/// Backing region of one sector slot, `None` until the sector exists
type RegionSlot = RwLock<Option<Box<[u8]>>>;

struct Allocation {
    context: ContextId,
    nbytes: u32,
    slot_size: u32,
}

#[derive(Default)]
struct ContextNode {
    parent: Option<ContextId>,
    children: Vec<ContextId>,
    addrs: HashSet<i32>,
    user_bytes: u64,
    slot_bytes: u64,
}

/// Gauge values this manager last contributed to the process-wide metrics
#[derive(Debug, Default, Clone, Copy)]
struct Reported {
    sectors: u64,
    slot_bytes: u64,
    user_bytes: u64,
}

struct PoolState {
    sectors: Vec<SectorAllocator>,
    /// Live allocations by sector address
    allocations: HashMap<i32, Allocation>,
    contexts: HashMap<ContextId, ContextNode>,
    preserve_session: bool,
    user_bytes: u64,
    slot_bytes: u64,
    reported: Reported,
}

impl PoolState {
    fn new() -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(ROOT_CONTEXT, ContextNode::default());
        Self {
            sectors: Vec::new(),
            allocations: HashMap::new(),
            contexts,
            preserve_session: false,
            user_bytes: 0,
            slot_bytes: 0,
            reported: Reported::default(),
        }
    }

    fn ensure_context(&self, id: ContextId) -> Result<()> {
        if self.contexts.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::UnknownContext(id.to_string()))
        }
    }

    /// `id` and all its descendants
    fn subtree(&self, id: ContextId) -> Vec<ContextId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.contexts.get(&next) {
                stack.extend(node.children.iter().copied());
                out.push(next);
            }
        }
        out
    }

    fn in_subtree(&self, mut node: ContextId, root: ContextId) -> bool {
        loop {
            if node == root {
                return true;
            }
            match self.contexts.get(&node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn record(&mut self, context: ContextId, addr: i32, nbytes: u32, slot_size: u32) {
        if let Some(node) = self.contexts.get_mut(&context) {
            node.addrs.insert(addr);
            node.user_bytes += u64::from(nbytes);
            node.slot_bytes += u64::from(slot_size);
        }
        self.user_bytes += u64::from(nbytes);
        self.slot_bytes += u64::from(slot_size);
        self.allocations.insert(
            addr,
            Allocation {
                context,
                nbytes,
                slot_size,
            },
        );
    }

    fn forget(&mut self, addr: i32) {
        let Some(allocation) = self.allocations.remove(&addr) else {
            return;
        };
        if let Some(node) = self.contexts.get_mut(&allocation.context) {
            node.addrs.remove(&addr);
            node.user_bytes -= u64::from(allocation.nbytes);
            node.slot_bytes -= u64::from(allocation.slot_size);
        }
        self.user_bytes -= u64::from(allocation.nbytes);
        self.slot_bytes -= u64::from(allocation.slot_size);
    }

    fn totals(&self, id: ContextId) -> (u64, u64, u64) {
        self.subtree(id)
            .iter()
            .filter_map(|id| self.contexts.get(id))
            .fold((0, 0, 0), |(count, user, slot), node| {
                (
                    count + node.addrs.len() as u64,
                    user + node.user_bytes,
                    slot + node.slot_bytes,
                )
            })
    }

    /// Push this manager's change since the last publish into the shared gauges
    fn publish_gauges(&mut self) {
        let now = Reported {
            sectors: self.sectors.len() as u64,
            slot_bytes: self.slot_bytes,
            user_bytes: self.user_bytes,
        };
        adjust_gauge(&metrics::SECTOR_COUNT, self.reported.sectors, now.sectors);
        adjust_gauge(&metrics::SLOT_BYTES, self.reported.slot_bytes, now.slot_bytes);
        adjust_gauge(&metrics::USER_BYTES, self.reported.user_bytes, now.user_bytes);
        self.reported = now;
    }
}

/// Gauges are shared by every manager in the process, so only deltas are applied
fn adjust_gauge(gauge: &GenericGauge<AtomicU64>, old: u64, new: u64) {
    if new > old {
        gauge.add(new - old);
    } else if old > new {
        gauge.sub(old - new);
    }
}

/// State shared between the manager and its allocation contexts
pub(crate) struct Shared {
    config: MemoryManagerConfig,
    state: Mutex<PoolState>,
    /// Indexed by sector; locked apart from `state` so views never block bookkeeping
    regions: Box<[RegionSlot]>,
    /// Signalled whenever capacity may have been released
    capacity: Condvar,
    free_list: Arc<PoolFreeList>,
    buffer_pool: Arc<dyn BufferPool>,
    writes: Option<Arc<dyn WriteCacheManager>>,
}

impl Shared {
    pub(crate) fn allocate(&self, context: ContextId, nbytes: usize, blocking: bool) -> Result<i64> {
        SizeClass::for_size(nbytes)?;

        let mut state = self.state.lock();
        state.ensure_context(context)?;

        let mut blocked = false;
        loop {
            if let Some(addr) = self.try_allocate(&mut state, nbytes)? {
                let raw = addr.encode();
                let slot_size = state.sectors[addr.sector as usize]
                    .slot_size(addr.bit)
                    .unwrap_or_default();
                state.record(context, raw, nbytes as u32, slot_size as u32);

                metrics::ALLOCATIONS_TOTAL.inc();
                state.publish_gauges();
                debug!(%addr, nbytes, %context, "Allocated");
                return Ok(pack(raw, nbytes as u32));
            }

            if state.sectors.len() < self.config.max_sectors && self.add_sector(&mut state)? {
                continue;
            }

            if !blocking {
                metrics::EXHAUSTED_ALLOCATIONS_TOTAL.inc();
                warn!(
                    nbytes,
                    sectors = state.sectors.len(),
                    max_sectors = self.config.max_sectors,
                    "Allocation refused: no sector capacity"
                );
                return Err(Error::ResourceExhausted {
                    sectors: state.sectors.len(),
                    max_sectors: self.config.max_sectors,
                });
            }

            if !blocked {
                blocked = true;
                metrics::BLOCKED_ALLOCATIONS_TOTAL.inc();
                debug!(nbytes, "Waiting for sector capacity");
            }
            self.capacity.wait(&mut state);
            state.ensure_context(context)?;
        }
    }

    pub(crate) fn allocate_bytes(&self, context: ContextId, data: &[u8], blocking: bool) -> Result<i64> {
        let addr = self.allocate(context, data.len(), blocking)?;
        self.write(addr, data)?;
        Ok(addr)
    }

    /// Try every free-list sector, most recently eligible first
    fn try_allocate(&self, state: &mut PoolState, nbytes: usize) -> Result<Option<SectorAddr>> {
        for index in self.free_list.candidates() {
            let Some(sector) = state.sectors.get_mut(index as usize) else {
                continue;
            };
            if let Some(addr) = sector.alloc(nbytes)? {
                return Ok(Some(addr));
            }
        }
        Ok(None)
    }

    /// Back a new sector with a pool region; `false` when the pool has none
    fn add_sector(&self, state: &mut PoolState) -> Result<bool> {
        let Some(region) = self.buffer_pool.acquire()? else {
            debug!(sectors = state.sectors.len(), "Buffer pool has no free region");
            return Ok(false);
        };

        let sector_size = self.config.sector_size;
        if region.len() != sector_size {
            let len = region.len();
            self.buffer_pool.release(region);
            return Err(Error::BufferPool(format!(
                "Region of {} bytes does not match sector size {}",
                len, sector_size
            )));
        }

        let index = state.sectors.len() as u32;
        let Some(slot) = self.regions.get(index as usize) else {
            self.buffer_pool.release(region);
            return Ok(false);
        };
        let start_address = u64::from(index) * sector_size as u64;
        let manager: Arc<dyn SectorManager> = self.free_list.clone();
        let mut allocator = match SectorAllocator::new(
            index,
            start_address,
            sector_size,
            manager,
            self.writes.clone(),
        ) {
            Ok(allocator) => allocator,
            Err(e) => {
                self.buffer_pool.release(region);
                return Err(e);
            }
        };
        allocator.set_free_list_threshold(self.config.free_list_threshold);
        if state.preserve_session {
            allocator.preserve_session_data();
        }

        *slot.write() = Some(region);
        state.sectors.push(allocator);
        info!(
            sector = index,
            start_address,
            sectors = state.sectors.len(),
            "Created sector"
        );
        state.publish_gauges();
        Ok(true)
    }

    /// Resolve `addr` to `(sector, offset, len)` while holding the state lock
    fn locate(&self, addr: i64) -> Result<(usize, usize, usize)> {
        let (raw, nbytes) = unpack(addr);
        let decoded = SectorAddr::decode(raw).ok_or(Error::InvalidAddress(addr))?;
        let len = nbytes as usize;

        let state = self.state.lock();
        let allocator = state
            .sectors
            .get(decoded.sector as usize)
            .ok_or(Error::InvalidAddress(addr))?;
        if !allocator.is_gettable(decoded.bit) {
            return Err(Error::InvalidAddress(addr));
        }
        let slot_size = allocator
            .slot_size(decoded.bit)
            .ok_or(Error::InvalidAddress(addr))?;
        if len == 0 || len > slot_size {
            return Err(Error::InvalidAddress(addr));
        }
        let offset = allocator
            .bit_to_offset(decoded.bit)
            .ok_or(Error::InvalidAddress(addr))?;
        Ok((decoded.sector as usize, offset, len))
    }

    pub(crate) fn get(&self, addr: i64) -> Result<SlotView<'_>> {
        let (index, offset, len) = self.locate(addr)?;
        let slot = self.regions.get(index).ok_or(Error::InvalidAddress(addr))?;

        // recursive so a thread already holding a view never queues behind a writer
        RwLockReadGuard::try_map(slot.read_recursive(), |region| {
            region.as_deref().map(|r| &r[offset..offset + len])
        })
        .map_err(|_| Error::InvalidAddress(addr))
    }

    /// Copy `data` into the allocation at `addr`; the length must match exactly
    pub(crate) fn write(&self, addr: i64, data: &[u8]) -> Result<()> {
        let (index, offset, len) = self.locate(addr)?;
        if data.len() != len {
            return Err(Error::InvalidSize {
                size: data.len(),
                max: len,
            });
        }
        let slot = self.regions.get(index).ok_or(Error::InvalidAddress(addr))?;
        let mut guard = slot.write();
        let region = guard.as_deref_mut().ok_or(Error::InvalidAddress(addr))?;
        region[offset..offset + len].copy_from_slice(data);
        Ok(())
    }

    /// Free `addr`; when `scope` is given the address must belong to that context's subtree
    pub(crate) fn free(&self, addr: i64, scope: Option<ContextId>) -> Result<()> {
        let (raw, _) = unpack(addr);
        let decoded = SectorAddr::decode(raw)
            .ok_or_else(|| Error::ProtocolViolation(format!("Free of foreign address {}", addr)))?;

        let mut state = self.state.lock();
        if let Some(scope) = scope {
            state.ensure_context(scope)?;
            let owned = state
                .allocations
                .get(&raw)
                .is_some_and(|a| state.in_subtree(a.context, scope));
            if !owned {
                return Err(Error::ProtocolViolation(format!(
                    "Address {} is not owned by context {}",
                    addr, scope
                )));
            }
        }

        state
            .sectors
            .get_mut(decoded.sector as usize)
            .ok_or_else(|| {
                Error::ProtocolViolation(format!(
                    "Free of address {} in unknown sector {}",
                    addr, decoded.sector
                ))
            })?
            .free(decoded.bit)?;
        state.forget(raw);

        metrics::FREES_TOTAL.inc();
        state.publish_gauges();
        debug!(%decoded, "Freed");
        drop(state);

        self.capacity.notify_all();
        Ok(())
    }

    pub(crate) fn clear(&self, context: ContextId) -> Result<()> {
        let mut state = self.state.lock();
        self.clear_locked(&mut state, context)?;
        drop(state);

        self.capacity.notify_all();
        Ok(())
    }

    fn clear_locked(&self, state: &mut PoolState, context: ContextId) -> Result<()> {
        state.ensure_context(context)?;

        if context == ROOT_CONTEXT {
            self.clear_all(state);
            return Ok(());
        }

        let addrs: Vec<i32> = state
            .subtree(context)
            .iter()
            .filter_map(|id| state.contexts.get(id))
            .flat_map(|node| node.addrs.iter().copied())
            .collect();

        for &raw in &addrs {
            if let Some(decoded) = SectorAddr::decode(raw) {
                if let Some(sector) = state.sectors.get_mut(decoded.sector as usize) {
                    sector.free(decoded.bit)?;
                }
            }
            state.forget(raw);
            metrics::FREES_TOTAL.inc();
        }

        state.publish_gauges();
        debug!(%context, released = addrs.len(), "Cleared allocation context");
        Ok(())
    }

    /// Drop every allocation and hand all regions back to the buffer pool
    fn clear_all(&self, state: &mut PoolState) {
        let released = state.allocations.len();
        state.allocations.clear();
        for node in state.contexts.values_mut() {
            node.addrs.clear();
            node.user_bytes = 0;
            node.slot_bytes = 0;
        }
        state.user_bytes = 0;
        state.slot_bytes = 0;

        let sectors = state.sectors.len();
        state.sectors.clear();
        self.release_regions();
        self.free_list.reset();

        state.publish_gauges();
        info!(sectors, released, "Cleared memory manager");
    }

    pub(crate) fn create_context(&self, parent: ContextId) -> Result<ContextId> {
        let mut state = self.state.lock();
        state.ensure_context(parent)?;

        let id = Uuid::new_v4();
        state.contexts.insert(
            id,
            ContextNode {
                parent: Some(parent),
                ..ContextNode::default()
            },
        );
        if let Some(node) = state.contexts.get_mut(&parent) {
            node.children.push(id);
        }

        debug!(context = %id, %parent, "Created allocation context");
        Ok(id)
    }

    /// Clear `context` and remove it and its descendants from the tree
    pub(crate) fn detach_context(&self, context: ContextId) -> Result<()> {
        if context == ROOT_CONTEXT {
            return Err(Error::ProtocolViolation(
                "The root context cannot be detached".to_string(),
            ));
        }

        let mut state = self.state.lock();
        self.clear_locked(&mut state, context)?;

        let parent = state.contexts.get(&context).and_then(|n| n.parent);
        for id in state.subtree(context) {
            state.contexts.remove(&id);
        }
        if let Some(node) = parent.and_then(|p| state.contexts.get_mut(&p)) {
            node.children.retain(|c| *c != context);
        }
        drop(state);

        debug!(%context, "Detached allocation context");
        self.capacity.notify_all();
        Ok(())
    }

    pub(crate) fn owns(&self, context: ContextId, addr: i64) -> bool {
        let (raw, _) = unpack(addr);
        let state = self.state.lock();
        state
            .allocations
            .get(&raw)
            .is_some_and(|a| state.in_subtree(a.context, context))
    }

    pub(crate) fn totals(&self, context: ContextId) -> (u64, u64, u64) {
        self.state.lock().totals(context)
    }

    pub(crate) fn contains_context(&self, context: ContextId) -> bool {
        self.state.lock().contexts.contains_key(&context)
    }

    /// Hand every backing region back to the pool, waiting out open views
    fn release_regions(&self) {
        for slot in self.regions.iter() {
            if let Some(region) = slot.write().take() {
                self.buffer_pool.release(region);
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.release_regions();
        let state = self.state.get_mut();
        state.sectors.clear();
        state.user_bytes = 0;
        state.slot_bytes = 0;
        state.publish_gauges();
    }
}

/// Application byte length carried by a façade address
pub(crate) fn allocation_size(addr: i64) -> Result<usize> {
    let (raw, nbytes) = unpack(addr);
    if SectorAddr::decode(raw).is_none() || nbytes == 0 {
        return Err(Error::InvalidAddress(addr));
    }
    Ok(nbytes as usize)
}

/// Memory manager over a pool of sectors
///
/// Allocations made directly on the manager belong to the root context;
/// [`create_allocation_context`](MemoryManager::create_allocation_context)
/// hands out child scopes.
#[derive(Clone)]
pub struct SectorMemoryManager {
    shared: Arc<Shared>,
}

impl SectorMemoryManager {
    /// Create a manager drawing sector regions from `buffer_pool`
    pub fn new(config: MemoryManagerConfig, buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        Self::with_write_cache(config, buffer_pool, None)
    }

    /// Create a manager with a heap buffer pool bounded to `max_sectors` regions
    pub fn with_heap_pool(config: MemoryManagerConfig) -> Result<Self> {
        let pool = Arc::new(HeapBufferPool::new(
            config.sector_size,
            Some(config.max_sectors),
        ));
        Self::new(config, pool)
    }

    /// Create a manager whose sectors notify `writes` when slots are freed
    pub fn with_write_cache(
        config: MemoryManagerConfig,
        buffer_pool: Arc<dyn BufferPool>,
        writes: Option<Arc<dyn WriteCacheManager>>,
    ) -> Result<Self> {
        config.validate()?;
        if buffer_pool.region_size() != config.sector_size {
            return Err(Error::Config(format!(
                "Buffer pool region size {} does not match sector size {}",
                buffer_pool.region_size(),
                config.sector_size
            )));
        }

        metrics::init_metrics();
        info!(
            sector_size = config.sector_size,
            max_sectors = config.max_sectors,
            "Initializing memory manager"
        );

        let regions = (0..config.max_sectors).map(|_| RwLock::new(None)).collect();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState::new()),
                regions,
                capacity: Condvar::new(),
                free_list: Arc::new(PoolFreeList::new()),
                buffer_pool,
                writes,
            }),
        })
    }

    /// Allocate using the configured blocking mode
    pub fn allocate_default(&self, nbytes: usize) -> Result<i64> {
        self.allocate(nbytes, self.shared.config.blocking)
    }

    /// Free `addr`, which must belong to `context` or one of its descendants
    pub fn free_in_context(&self, addr: i64, context: &AllocationContext) -> Result<()> {
        self.shared.free(addr, Some(context.id()))
    }

    /// Commit every sector's live slots as the new baseline
    ///
    /// Large pools commit on the global rayon pool while holding the manager
    /// lock; do not call this from a rayon task that may share a worker with
    /// other users of the same manager.
    pub fn commit(&self) {
        let mut state = self.shared.state.lock();
        if state.sectors.len() >= PARALLEL_COMMIT_THRESHOLD {
            state
                .sectors
                .par_iter_mut()
                .for_each(|sector| sector.commit());
        } else {
            for sector in state.sectors.iter_mut() {
                sector.commit();
            }
        }
        debug!(sectors = state.sectors.len(), "Committed memory manager");
        drop(state);

        self.shared.capacity.notify_all();
    }

    /// Hold freed slots reserved in every sector, including ones created later
    pub fn preserve_session(&self) {
        let mut state = self.shared.state.lock();
        state.preserve_session = true;
        for sector in state.sectors.iter_mut() {
            sector.preserve_session_data();
        }
    }

    /// Release held slots in every sector
    pub fn release_session(&self) {
        let mut state = self.shared.state.lock();
        state.preserve_session = false;
        for sector in state.sectors.iter_mut() {
            sector.release_session();
        }
        debug!(sectors = state.sectors.len(), "Released session");
        drop(state);

        self.shared.capacity.notify_all();
    }

    /// Whether `addr` is part of the last commit
    pub fn is_committed(&self, addr: i64) -> Result<bool> {
        let decoded =
            SectorAddr::decode(unpack(addr).0).ok_or(Error::InvalidAddress(addr))?;
        let state = self.shared.state.lock();
        state
            .sectors
            .get(decoded.sector as usize)
            .map(|s| s.is_committed(decoded.bit))
            .ok_or(Error::InvalidAddress(addr))
    }

    /// Absolute address of `addr`, or `None` if it is not currently resolvable
    pub fn physical_address(&self, addr: i64) -> Option<u64> {
        let decoded = SectorAddr::decode(unpack(addr).0)?;
        let state = self.shared.state.lock();
        state
            .sectors
            .get(decoded.sector as usize)
            .and_then(|s| s.physical_address(decoded.bit))
    }

    pub fn config(&self) -> &MemoryManagerConfig {
        &self.shared.config
    }

    /// Byte size of a backing region
    pub fn sector_size(&self) -> usize {
        self.shared.config.sector_size
    }

    /// Backing regions in use
    pub fn sector_count(&self) -> usize {
        self.shared.state.lock().sectors.len()
    }

    pub fn max_sectors(&self) -> usize {
        self.shared.config.max_sectors
    }

    /// Sectors currently eligible to allocate
    pub fn free_list_len(&self) -> usize {
        self.shared.free_list.len()
    }

    /// Bytes left unused by sectors that ran out of tag-blocks
    pub fn trimmed_bytes(&self) -> u64 {
        self.shared.free_list.trimmed_bytes()
    }

    /// Snapshot of manager and per-sector counters
    pub fn stats(&self) -> MemoryManagerStats {
        let state = self.shared.state.lock();
        let (allocation_count, user_bytes, slot_bytes) = state.totals(ROOT_CONTEXT);
        MemoryManagerStats {
            sector_size: self.shared.config.sector_size,
            sector_count: state.sectors.len(),
            max_sectors: self.shared.config.max_sectors,
            free_list_len: self.shared.free_list.len(),
            context_count: state.contexts.len() - 1,
            allocation_count,
            user_bytes,
            slot_bytes,
            trimmed_bytes: self.shared.free_list.trimmed_bytes(),
            sectors: state.sectors.iter().map(|s| s.stats()).collect(),
        }
    }
}

impl MemoryManager for SectorMemoryManager {
    fn allocate(&self, nbytes: usize, blocking: bool) -> Result<i64> {
        self.shared.allocate(ROOT_CONTEXT, nbytes, blocking)
    }

    fn allocate_bytes(&self, data: &[u8], blocking: bool) -> Result<i64> {
        self.shared.allocate_bytes(ROOT_CONTEXT, data, blocking)
    }

    fn get(&self, addr: i64) -> Result<SlotView<'_>> {
        self.shared.get(addr)
    }

    fn write(&self, addr: i64, data: &[u8]) -> Result<()> {
        self.shared.write(addr, data)
    }

    fn free(&self, addr: i64) -> Result<()> {
        self.shared.free(addr, None)
    }

    fn clear(&self) -> Result<()> {
        self.shared.clear(ROOT_CONTEXT)
    }

    fn create_allocation_context(&self) -> Result<AllocationContext> {
        let id = self.shared.create_context(ROOT_CONTEXT)?;
        Ok(AllocationContext::new(Arc::clone(&self.shared), id))
    }

    fn allocation_size(&self, addr: i64) -> Result<usize> {
        allocation_size(addr)
    }

    fn allocation_count(&self) -> u64 {
        self.shared.totals(ROOT_CONTEXT).0
    }

    fn user_bytes(&self) -> u64 {
        self.shared.totals(ROOT_CONTEXT).1
    }

    fn slot_bytes(&self) -> u64 {
        self.shared.totals(ROOT_CONTEXT).2
    }
}

impl fmt::Debug for SectorMemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectorMemoryManager")
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Manager-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct MemoryManagerStats {
    pub sector_size: usize,
    pub sector_count: usize,
    pub max_sectors: usize,
    pub free_list_len: usize,
    pub context_count: usize,
    pub allocation_count: u64,
    pub user_bytes: u64,
    pub slot_bytes: u64,
    pub trimmed_bytes: u64,
    pub sectors: Vec<SectorStats>,
}
