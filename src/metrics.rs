//! Prometheus metrics for the memory manager
//!
//! Purely observational: the allocator never reads these back.

use prometheus::{
    core::{AtomicU64, GenericCounter, GenericGauge},
    Encoder, Registry, TextEncoder,
};
use std::sync::Once;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref SECTOR_COUNT: GenericGauge<AtomicU64> = GenericGauge::new(
        "sectoralloc_sectors",
        "Number of sectors currently backed by a buffer pool region"
    ).unwrap();

    pub static ref SLOT_BYTES: GenericGauge<AtomicU64> = GenericGauge::new(
        "sectoralloc_slot_bytes",
        "Bytes of slots held by live allocations"
    ).unwrap();

    pub static ref USER_BYTES: GenericGauge<AtomicU64> = GenericGauge::new(
        "sectoralloc_user_bytes",
        "Bytes of application data held by live allocations"
    ).unwrap();

    pub static ref ALLOCATIONS_TOTAL: GenericCounter<AtomicU64> = GenericCounter::new(
        "sectoralloc_allocations_total",
        "Total successful allocations"
    ).unwrap();

    pub static ref FREES_TOTAL: GenericCounter<AtomicU64> = GenericCounter::new(
        "sectoralloc_frees_total",
        "Total addresses released"
    ).unwrap();

    pub static ref BLOCKED_ALLOCATIONS_TOTAL: GenericCounter<AtomicU64> = GenericCounter::new(
        "sectoralloc_blocked_allocations_total",
        "Allocations that waited for capacity"
    ).unwrap();

    pub static ref EXHAUSTED_ALLOCATIONS_TOTAL: GenericCounter<AtomicU64> = GenericCounter::new(
        "sectoralloc_exhausted_allocations_total",
        "Non-blocking allocations refused for lack of capacity"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with [`METRICS_REGISTRY`]; safe to call repeatedly
pub fn init_metrics() {
    INIT.call_once(|| {
        info!("Initializing Prometheus metrics");

        METRICS_REGISTRY.register(Box::new(SECTOR_COUNT.clone())).ok();
        METRICS_REGISTRY.register(Box::new(SLOT_BYTES.clone())).ok();
        METRICS_REGISTRY.register(Box::new(USER_BYTES.clone())).ok();
        METRICS_REGISTRY.register(Box::new(ALLOCATIONS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(FREES_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(BLOCKED_ALLOCATIONS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(EXHAUSTED_ALLOCATIONS_TOTAL.clone())).ok();
    });
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}
