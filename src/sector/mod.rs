//! Sector Allocator
//!
//! Manages one fixed-capacity memory region using tag-blocks of 32 slots,
//! each block dedicated to a single size class.
//!
//! # Architecture
//!
//! ```text
//! SectorAllocator #3 (64 MiB region)
//!   ├─→ block 0  64B   live:0b0111  transient:0b1111  committed:0b1011
//!   ├─→ block 1  128B
//!   ├─→ ...
//!   ├─→ block 6  4096B (BLOB)
//!   └─→ block 7  64B   ← appended when block 0 ran out
//!
//! Address: -(((3 + 1) << 16) + bit)
//! ```
//!
//! The sector reports free-list membership changes to its pool through
//! [`SectorManager`] and never looks at sibling sectors.

pub mod address;
pub mod allocator;
pub mod bits;
pub mod manager;
pub mod mock;
pub mod size_class;

pub use address::{make_addr, sector_index, sector_offset, SectorAddr, MAX_SECTORS, OFFSET_BITS};
pub use allocator::{SectorAllocator, SectorStats, SizeClassStats, TagBlock, MAX_TAG_BLOCKS};
pub use bits::TagBits;
pub use manager::{SectorManager, WriteCacheManager};
pub use size_class::{blob_block_count, SizeClass, BLOB_CHAIN_OFFSET, BLOB_SIZE};
