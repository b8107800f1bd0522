//! Backing regions for sectors

use crate::error::Result;
use parking_lot::Mutex;
use tracing::debug;

/// Supplier of fixed-size backing regions
///
/// Every region handed out must be exactly [`region_size`](BufferPool::region_size) bytes.
pub trait BufferPool: Send + Sync {
    /// Byte size of every region
    fn region_size(&self) -> usize;

    /// Take a region, or `Ok(None)` when the pool is at capacity
    fn acquire(&self) -> Result<Option<Box<[u8]>>>;

    /// Hand a region back for reuse
    fn release(&self, region: Box<[u8]>);

    /// Regions currently handed out
    fn regions_in_use(&self) -> usize;
}

/// Buffer pool backed by the process heap, recycling released regions
pub struct HeapBufferPool {
    region_size: usize,
    max_regions: Option<usize>,
    inner: Mutex<HeapPoolInner>,
}

#[derive(Default)]
struct HeapPoolInner {
    recycled: Vec<Box<[u8]>>,
    in_use: usize,
}

impl HeapBufferPool {
    /// Create a pool of `region_size` regions, optionally bounded to `max_regions`
    pub fn new(region_size: usize, max_regions: Option<usize>) -> Self {
        Self {
            region_size,
            max_regions,
            inner: Mutex::new(HeapPoolInner::default()),
        }
    }
}

impl BufferPool for HeapBufferPool {
    fn region_size(&self) -> usize {
        self.region_size
    }

    fn acquire(&self) -> Result<Option<Box<[u8]>>> {
        let mut inner = self.inner.lock();
        if self.max_regions.is_some_and(|max| inner.in_use >= max) {
            return Ok(None);
        }

        let region = match inner.recycled.pop() {
            Some(mut region) => {
                region.fill(0);
                region
            }
            None => vec![0u8; self.region_size].into_boxed_slice(),
        };
        inner.in_use += 1;
        debug!(in_use = inner.in_use, size = self.region_size, "Acquired region");
        Ok(Some(region))
    }

    fn release(&self, region: Box<[u8]>) {
        let mut inner = self.inner.lock();
        inner.in_use = inner.in_use.saturating_sub(1);
        if region.len() == self.region_size {
            inner.recycled.push(region);
        }
        debug!(in_use = inner.in_use, recycled = inner.recycled.len(), "Released region");
    }

    fn regions_in_use(&self) -> usize {
        self.inner.lock().in_use
    }
}
