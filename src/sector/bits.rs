//! 32-slot bitset backing one tag-block

use std::fmt;

/// Fixed-width bitset, one bit per slot of a tag-block
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TagBits(u32);

impl TagBits {
    /// Slots tracked per word
    pub const WIDTH: u32 = u32::BITS;

    pub const EMPTY: TagBits = TagBits(0);
    pub const FULL: TagBits = TagBits(u32::MAX);

    #[inline]
    pub fn set(&mut self, bit: u32) {
        debug_assert!(bit < Self::WIDTH);
        self.0 |= 1 << bit;
    }

    #[inline]
    pub fn clear(&mut self, bit: u32) {
        debug_assert!(bit < Self::WIDTH);
        self.0 &= !(1 << bit);
    }

    #[inline]
    pub fn test(&self, bit: u32) -> bool {
        debug_assert!(bit < Self::WIDTH);
        self.0 & (1 << bit) != 0
    }

    /// Lowest clear bit, scanning a nibble at a time
    ///
    /// Skips full nibbles without touching their bits, so at most eight
    /// nibble checks plus four bit checks are made.
    pub fn first_zero(&self) -> Option<u32> {
        let mut word = self.0;
        for nibble in 0..8 {
            if word & 0xF != 0xF {
                for b in 0..4 {
                    if word & (1 << b) == 0 {
                        return Some(nibble * 4 + b);
                    }
                }
            }
            word >>= 4;
        }
        None
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_full(&self) -> bool {
        self.0 == u32::MAX
    }

    pub fn union(self, other: TagBits) -> TagBits {
        TagBits(self.0 | other.0)
    }

    pub fn intersect(self, other: TagBits) -> TagBits {
        TagBits(self.0 & other.0)
    }

    pub fn is_subset_of(&self, other: &TagBits) -> bool {
        self.0 & !other.0 == 0
    }
}

impl fmt::Debug for TagBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagBits({:#034b})", self.0)
    }
}
