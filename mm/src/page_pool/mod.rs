//! Shared page-pool subsystem: per-order caches of clean page runs sitting
//! in front of the buddy allocator, so repeated populate/drain cycles at a
//! fixed (caching, order, zone) avoid round-tripping through `page_alloc`
//! and, on x86_64, avoid re-touching caching-attribute page tables.
//!
//! Module map:
//! - [`run`] — `RunHandle`/`RunMeta`/`RunArena`, the slot storage every
//!   other module addresses runs through.
//! - [`bucket`] — `Bucket`, a single (caching, order, zone) free list.
//! - [`registry`] — `Registry`, the process-wide round-robin reclaim order.
//! - [`allocator_adapter`] — `AllocatorAdapter`/`PlainPages`/`CoherentDma`,
//!   the seam to the buddy allocator and to DMA mapping.
//! - [`caching`] — the x86_64 PAT-backed caching-attribute stage.
//! - [`pool`] — `Pool`, the per-caller façade (`populate`/`drain_into_pool`).
//! - [`dirty_worker`] — the deferred-clean worker (ION dynamic-variant
//!   zeroing) and its `defer` entry point.
//! - [`reclaim`] — `count`/`scan`/`register_participant`, the host
//!   memory-pressure shrinker seam.
//! - [`global`] — the process-wide singletons ([`global::init`] must run
//!   once before any [`Pool`] is used).

pub mod allocator_adapter;
pub mod bucket;
pub mod caching;
pub mod config;
pub mod dirty_worker;
pub mod error;
pub mod global;
pub mod pool;
pub mod reclaim;
pub mod registry;
pub mod run;

#[cfg(test)]
mod test_fixtures;
#[cfg(test)]
mod tests_dirty;
#[cfg(test)]
mod tests_reclaim;

pub use allocator_adapter::{AllocRunFlags, AllocatorAdapter, CoherentDma, DmaBackend, PlainPages};
pub use bucket::Bucket;
pub use config::PagePoolConfig;
pub use error::{PagePoolError, PagePoolResult};
pub use pool::{Pool, PopulateFlags, PopulateOutput, PopulateRequest};
pub use run::{CachingClass, RunHandle, RunMeta, RunState, Zone};

/// Bring up the process-wide singletons. Must run once, after the buddy
/// allocator and HHDM are initialized, before any [`Pool`] is constructed.
pub fn init(cfg: PagePoolConfig) {
    global::init(cfg);
}

pub fn teardown() {
    global::teardown();
}

/// Read-only snapshot of subsystem-wide state, for diagnostics (`/proc`-style
/// reporting or a debugger command), mirroring `page_alloc::get_page_allocator_stats`'s
/// role for the buddy allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PagePoolStats {
    /// Base pages currently sitting clean in some Bucket.
    pub pooled_pages: u64,
    /// Number of Buckets registered with the Registry.
    pub live_buckets: u64,
    /// Number of completed reclaim scans since init. `mm` has no monotonic
    /// clock of its own to stamp a last-reclaim time with, so a call count
    /// serves the same "has reclaim been running" diagnostic purpose.
    pub reclaim_scan_count: u64,
}

pub fn stats() -> PagePoolStats {
    PagePoolStats {
        pooled_pages: global::counter_snapshot(),
        live_buckets: global::REGISTRY.len() as u64,
        reclaim_scan_count: reclaim::scan_count(),
    }
}
