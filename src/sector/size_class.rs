//! Size classes served by a sector

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest payload that can be allocated directly
pub const BLOB_SIZE: usize = 4096;

/// Offset of the next-block link inside a chained BLOB slot
pub const BLOB_CHAIN_OFFSET: usize = BLOB_SIZE - 4;

/// Number of slots in every tag-block, whatever its size class
pub const SLOTS_PER_BLOCK: usize = 32;

/// A fixed allocation size a sector can serve
///
/// Ordered smallest first, so `SizeClass::ALL[i].index() == i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    B64,
    B128,
    B256,
    B512,
    B1K,
    B2K,
    Blob,
}

impl SizeClass {
    /// Every class, smallest first
    pub const ALL: [SizeClass; 7] = [
        SizeClass::B64,
        SizeClass::B128,
        SizeClass::B256,
        SizeClass::B512,
        SizeClass::B1K,
        SizeClass::B2K,
        SizeClass::Blob,
    ];

    /// Number of size classes
    pub const COUNT: usize = Self::ALL.len();

    /// Slot size in bytes
    pub const fn size(self) -> usize {
        match self {
            SizeClass::B64 => 64,
            SizeClass::B128 => 128,
            SizeClass::B256 => 256,
            SizeClass::B512 => 512,
            SizeClass::B1K => 1024,
            SizeClass::B2K => 2048,
            SizeClass::Blob => BLOB_SIZE,
        }
    }

    /// Position in [`SizeClass::ALL`], used to index per-class counters
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bytes covered by one tag-block of this class
    pub const fn block_bytes(self) -> usize {
        self.size() * SLOTS_PER_BLOCK
    }

    /// Smallest class whose slot fits `size` bytes
    pub fn for_size(size: usize) -> Result<SizeClass> {
        if size == 0 || size > BLOB_SIZE {
            return Err(Error::InvalidSize {
                size,
                max: BLOB_SIZE,
            });
        }

        Ok(Self::ALL
            .into_iter()
            .find(|class| size <= class.size())
            .unwrap_or(SizeClass::Blob))
    }

    /// Slot size that would hold `size` bytes
    pub fn block_for_size(size: usize) -> Result<usize> {
        Self::for_size(size).map(SizeClass::size)
    }

    /// Check if a given size fits in this size class
    pub fn can_fit(self, size: usize) -> bool {
        size <= self.size()
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.size())
    }
}

/// Number of BLOB slots needed to chain a payload of `size` bytes
pub fn blob_block_count(size: usize) -> usize {
    size.div_ceil(BLOB_SIZE)
}

/// Bytes consumed by one initial tag-block of every class
pub fn initial_reserve_bytes() -> usize {
    SizeClass::ALL.iter().map(|class| class.block_bytes()).sum()
}
