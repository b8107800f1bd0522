// sectoralloc - Sector slab allocator
// Stable compact addresses for variable-sized payloads over fixed-size sectors

#![warn(rust_2018_idioms)]

pub mod config;
pub mod memory;
pub mod metrics;
pub mod sector;

// Re-exports for convenience
pub use config::MemoryManagerConfig;
pub use memory::{AllocationContext, BufferPool, HeapBufferPool, MemoryManager, SectorMemoryManager};
pub use sector::{SectorAddr, SectorAllocator, SectorManager, SizeClass, WriteCacheManager};

/// Allocator error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Invalid allocation size {size}: must be between 1 and {max} bytes")]
        InvalidSize { size: usize, max: usize },

        #[error("Protocol violation: {0}")]
        ProtocolViolation(String),

        #[error("Resource exhausted: all {sectors} of {max_sectors} sectors are saturated")]
        ResourceExhausted { sectors: usize, max_sectors: usize },

        #[error("Invalid address: {0}")]
        InvalidAddress(i64),

        #[error("Unknown allocation context: {0}")]
        UnknownContext(String),

        #[error("Buffer pool error: {0}")]
        BufferPool(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// Only façade capacity exhaustion may succeed when retried later
        pub fn is_retryable(&self) -> bool {
            matches!(self, Error::ResourceExhausted { .. })
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_only_exhaustion_is_retryable() {
        let exhausted = Error::ResourceExhausted {
            sectors: 4,
            max_sectors: 4,
        };
        assert!(exhausted.is_retryable());
        assert!(!Error::InvalidSize { size: 0, max: 4096 }.is_retryable());
        assert!(!Error::ProtocolViolation("double free".into()).is_retryable());
    }
}
