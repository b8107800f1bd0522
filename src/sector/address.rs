//! Address encoding for sector slots
//!
//! A sector address is a negative `i32`:
//!
//! ```text
//! addr = -(((sector_index + 1) << OFFSET_BITS) + bit)
//! ```
//!
//! The façade widens it to an `i64` carrying the application byte length in
//! the low 32 bits, see [`pack`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bits reserved for the slot offset within a sector
pub const OFFSET_BITS: u32 = 16;

/// Mask selecting the slot offset
pub const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;

/// Highest encodable sector count; `(index + 1) << OFFSET_BITS` must stay positive
pub const MAX_SECTORS: usize = (i32::MAX >> OFFSET_BITS) as usize;

/// Encode `(sector_index, bit)` into a sector address
pub fn make_addr(sector_index: u32, bit: u32) -> i32 {
    debug_assert!((sector_index as usize) < MAX_SECTORS);
    debug_assert!(bit <= OFFSET_MASK);
    -((((sector_index + 1) << OFFSET_BITS) + bit) as i32)
}

/// Sector index encoded in `addr`
pub fn sector_index(addr: i32) -> u32 {
    (addr.unsigned_abs() >> OFFSET_BITS).wrapping_sub(1)
}

/// Slot bit encoded in `addr`
pub fn sector_offset(addr: i32) -> u32 {
    addr.unsigned_abs() & OFFSET_MASK
}

/// Decoded sector address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorAddr {
    /// Index of the owning sector
    pub sector: u32,
    /// Slot bit within the sector
    pub bit: u32,
}

impl SectorAddr {
    pub fn new(sector: u32, bit: u32) -> Self {
        Self { sector, bit }
    }

    /// Decode a raw address, rejecting values the encoder can never produce
    pub fn decode(addr: i32) -> Option<Self> {
        if addr >= 0 || addr == i32::MIN {
            return None;
        }
        let sector = addr.unsigned_abs() >> OFFSET_BITS;
        if sector == 0 {
            return None;
        }
        Some(Self {
            sector: sector - 1,
            bit: sector_offset(addr),
        })
    }

    /// Encode back into the persisted integer form
    pub fn encode(&self) -> i32 {
        make_addr(self.sector, self.bit)
    }
}

impl fmt::Display for SectorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sector(index={}, bit={})", self.sector, self.bit)
    }
}

/// Combine a sector address and byte length into a façade address
pub fn pack(addr: i32, nbytes: u32) -> i64 {
    ((addr as i64) << 32) | nbytes as i64
}

/// Split a façade address into its sector address and byte length
pub fn unpack(addr: i64) -> (i32, u32) {
    ((addr >> 32) as i32, addr as u32)
}
