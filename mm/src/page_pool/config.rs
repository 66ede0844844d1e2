//! Tunables for the page-pool subsystem.
//!
//! `PagePoolConfig` is passed once to [`crate::page_pool::init`] at subsystem
//! start and read thereafter; there is no runtime reconfiguration.

use crate::page_alloc::page_allocator_max_supported_frames;

/// Binary log of the largest run order this subsystem will pool or serve.
/// Kept well under the buddy allocator's own `MAX_ORDER` (24) — pools exist
/// to amortize small, frequent allocations, not to replace the allocator for
/// huge contiguous requests.
pub const MAX_ORDER: u32 = 11;

/// Runs drained per pass of the deferred-clean worker.
pub const DEFAULT_DIRTY_BATCH_SIZE: u32 = 32;

/// Passes per wake of the deferred-clean worker. Inherited from the source
/// design as a hard-coded 4 with no stated rationale; kept as the default
/// here but made a named, overridable tunable rather than a literal.
pub const DEFAULT_DIRTY_PASSES_PER_WAKE: u32 = 4;

/// Fraction of total frames used to compute the default `max_pooled_pages`
/// when the caller does not override it.
const DEFAULT_MAX_POOLED_FRACTION: u32 = 16;

/// Floor below which the default `max_pooled_pages` never drops, so a tiny
/// or not-yet-sized system still gets a usable pool.
const DEFAULT_MAX_POOLED_FLOOR: u64 = 256;

#[derive(Debug, Clone, Copy)]
pub struct PagePoolConfig {
    /// Global page cap across all pools and global buckets. `0` disables the
    /// synchronous trim performed by `drain_into_pool`.
    pub max_pooled_pages: u64,
    pub dirty_batch_size: u32,
    pub dirty_passes_per_wake: u32,
}

impl PagePoolConfig {
    /// `max_pooled_pages` defaults to 1/16th of the page allocator's total
    /// supported frame count, floored at [`DEFAULT_MAX_POOLED_FLOOR`]. Must
    /// be called after `init_page_allocator` has run.
    pub fn with_defaults() -> Self {
        let total_frames = page_allocator_max_supported_frames() as u64;
        let derived = total_frames / DEFAULT_MAX_POOLED_FRACTION as u64;
        Self {
            max_pooled_pages: derived.max(DEFAULT_MAX_POOLED_FLOOR),
            dirty_batch_size: DEFAULT_DIRTY_BATCH_SIZE,
            dirty_passes_per_wake: DEFAULT_DIRTY_PASSES_PER_WAKE,
        }
    }

    /// A config with trimming disabled and a tiny worker batch, used by
    /// tests that want deterministic pool growth.
    pub const fn unbounded() -> Self {
        Self {
            max_pooled_pages: 0,
            dirty_batch_size: DEFAULT_DIRTY_BATCH_SIZE,
            dirty_passes_per_wake: DEFAULT_DIRTY_PASSES_PER_WAKE,
        }
    }
}
