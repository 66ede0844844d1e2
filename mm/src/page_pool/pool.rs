//! Pool façade: the per-caller object exposing `populate`/`drain_into_pool`.
//!
//! Lock order inside this module follows the subsystem-wide rule
//! (registry → pool → bucket): `populate`/`drain_into_pool` never hold
//! `self.lock` while calling into the Registry or a global Bucket — those
//! already serialize themselves internally — and they never call into the
//! allocator adapter while holding `self.lock`.

extern crate alloc;

use alloc::vec::Vec;

use slopos_abi::addr::PhysAddr;
use slopos_lib::kernel_services::driver_runtime::{self, current_task_fatal_signal_pending};
use slopos_lib::{klog_debug, klog_warn};

use super::allocator_adapter::{AllocRunFlags, AllocatorAdapter};
use super::bucket::Bucket;
use super::caching;
use super::config::MAX_ORDER;
use super::dirty_worker;
use super::error::{PagePoolError, PagePoolResult};
use super::global::{self, GLOBAL_ARENA};
use super::run::{CachingClass, RunMeta, Zone};

#[derive(Debug, Clone, Copy, Default)]
pub struct PopulateFlags {
    pub zero: bool,
    pub allow_fail_without_retry: bool,
}

pub struct PopulateRequest {
    pub num_pages: u32,
    pub caching: CachingClass,
    pub want_dma_addresses: bool,
    pub flags: PopulateFlags,
}

#[derive(Default)]
pub struct PopulateOutput {
    /// Base pages, in allocation order.
    pub pages: Vec<PhysAddr>,
    /// Present only when `want_dma_addresses` was set: one entry per page.
    pub dma_addresses: Vec<u64>,
}

/// Per-caller façade over a 2D array of per-pool Buckets (indexed by
/// caching × order), plus the DMA routing flags.
pub struct Pool<'a> {
    adapter: &'a dyn AllocatorAdapter,
    use_dma_alloc: bool,
    use_dma32: bool,
    /// When set, `drain_run` hands dirty runs to the deferred-clean worker
    /// via [`dirty_worker::defer`] instead of depositing them straight into
    /// a Bucket — the ION "dynamic" variant, for pools whose runs may carry
    /// sensitive leftover contents. The worker deposits a cleaned run
    /// through the process-global Bucket arrays, so a pool combining this
    /// with `use_dma_alloc`'s own Bucket set would have its deferred runs
    /// resurface in the wrong array; use zeroing mode only on non-DMA pools
    /// until the worker learns to address a specific pool's own Buckets.
    zeroing_mode: bool,
    /// Present only when `use_dma_alloc` is set — populate/drain always use
    /// these, never the process-global arrays, because a DMA-mapped run is
    /// tied to this pool's device. Built once at construction and never
    /// resized afterward, so no lock is needed around the `Vec` itself —
    /// only each Bucket's own internal lock protects its contents, exactly
    /// like the process-global arrays in `global.rs`.
    own_buckets: Vec<Bucket<'a>>,
}

const ORDERS: usize = MAX_ORDER as usize;
const DMA_CACHING_CLASSES: usize = 2;

fn dma_caching_index(caching: CachingClass) -> Option<usize> {
    match caching {
        CachingClass::WriteCombined => Some(0),
        CachingClass::Uncached => Some(1),
        CachingClass::Cached => None,
    }
}

impl<'a> Pool<'a> {
    /// Builds the pool's own Bucket set (if `use_dma_alloc`) and registers
    /// each with the process-wide Registry — every Bucket belongs to
    /// exactly one Registry for its lifetime, whether it's a per-pool
    /// Bucket or one of the global arrays. `Drop` below unregisters and
    /// drains them before the backing `Vec` frees.
    pub fn new(adapter: &'a dyn AllocatorAdapter, use_dma_alloc: bool, use_dma32: bool, zeroing_mode: bool) -> Self {
        let own_buckets = if use_dma_alloc {
            let zone = if use_dma32 { Zone::Dma32 } else { Zone::Normal };
            let mut buckets = Vec::with_capacity(DMA_CACHING_CLASSES * ORDERS);
            for caching in [CachingClass::WriteCombined, CachingClass::Uncached] {
                for order in 0..ORDERS as u32 {
                    buckets.push(Bucket::new(caching, order, zone, &global::GLOBAL_ARENA, adapter));
                }
            }
            buckets
        } else {
            Vec::new()
        };
        let pool = Self {
            adapter,
            use_dma_alloc,
            use_dma32,
            zeroing_mode,
            own_buckets,
        };
        // The `Vec` above is never resized again, so every element's
        // address is stable for the remainder of `pool`'s lifetime —
        // including across this move into the local `pool` binding, since
        // moving a `Vec` moves only its (ptr, len, cap) header, not the
        // heap buffer it points at.
        for bucket in &pool.own_buckets {
            global::REGISTRY.join(bucket);
        }
        pool
    }

    fn effective_zone(&self) -> Zone {
        if self.use_dma32 { Zone::Dma32 } else { Zone::Normal }
    }

    /// Select the Bucket this pool consults for (caching, order). DMA-alloc
    /// pools always use their own bucket set, built once at construction;
    /// other pools use the process-global arrays. `CachingClass::Cached`
    /// has no Bucket by design — it always falls straight through to the
    /// allocator adapter.
    fn select_bucket(&self, caching: CachingClass, order: u32) -> Option<&Bucket<'a>> {
        if order as usize >= ORDERS {
            return None;
        }
        if self.use_dma_alloc {
            let class_idx = dma_caching_index(caching)?;
            return self.own_buckets.get(class_idx * ORDERS + order as usize);
        }
        if matches!(caching, CachingClass::Cached) {
            return None;
        }
        global::global_bucket(caching, order, self.effective_zone())
    }

    fn alloc_from_adapter(&self, order: u32, flags: AllocRunFlags, caching: CachingClass) -> PagePoolResult<RunMeta> {
        self.adapter.alloc_run(order, flags, caching)
    }

    /// Iterates from the largest order fitting the remaining count down to
    /// order 0, trying the Bucket first and the allocator adapter on a
    /// miss, falling back to smaller orders on allocator exhaustion.
    pub fn populate(&self, request: PopulateRequest) -> PagePoolResult<PopulateOutput> {
        let mut remaining = request.num_pages;
        let mut output = PopulateOutput::default();
        let mut acquired_runs: Vec<RunMeta> = Vec::new();

        while remaining > 0 {
            let mut order = floor_log2_order(remaining);
            let run = loop {
                if let Some(bucket) = self.select_bucket(request.caching, order) {
                    if let Some(handle) = bucket.remove() {
                        match GLOBAL_ARENA.take(handle) {
                            Ok(meta) => break Ok(Some(meta)),
                            Err(_) => {
                                klog_warn!("page_pool: bucket yielded a handle missing from the arena");
                            }
                        }
                    }
                }

                // A pending fatal signal is checked right before each
                // allocator call, not at the top of the outer loop, so an
                // order-fallback retry sequence still stops promptly rather
                // than exhausting every order first. No-op in a harness that
                // never registered the driver runtime (unit tests), the same
                // guard `waitqueue` uses around this same service table.
                if driver_runtime::is_driver_runtime_initialized() && current_task_fatal_signal_pending() {
                    break Err(PagePoolError::Interrupted);
                }

                let alloc_flags = AllocRunFlags {
                    zero: request.flags.zero,
                    allow_retry_mayfail: !request.flags.allow_fail_without_retry,
                    zone: Some(self.effective_zone()),
                    high_mem_allowed: true,
                };
                match self.alloc_from_adapter(order, alloc_flags, request.caching) {
                    Ok(meta) => break Ok(Some(meta)),
                    // A mapping refusal is the adapter's own condition, not
                    // exhaustion at this order — retrying a smaller order
                    // would not change the backend's answer, so surface it
                    // immediately instead of falling back.
                    Err(PagePoolError::MappingFailed) => break Err(PagePoolError::MappingFailed),
                    Err(_) => {
                        if order == 0 {
                            break Ok(None);
                        }
                        order -= 1;
                        klog_debug!("page_pool: order fallback to {}", order);
                    }
                }
            };

            let run = match run {
                Ok(run) => run,
                Err(e) => {
                    rollback(&mut output, &mut acquired_runs, self.adapter);
                    return Err(e);
                }
            };

            let Some(mut meta) = run else {
                rollback(&mut output, &mut acquired_runs, self.adapter);
                return Err(PagePoolError::OutOfMemory);
            };

            if meta.caching != request.caching {
                caching::apply(meta.phys, 1u32 << meta.order, meta.caching, request.caching);
                meta.caching = request.caching;
            }

            if request.want_dma_addresses {
                if meta.dma_addr.is_none() {
                    klog_warn!("page_pool: dma address requested but run has none");
                }
                let dma_base = meta.dma_addr.unwrap_or(meta.phys.as_u64());
                for i in 0..meta.page_count() {
                    output
                        .dma_addresses
                        .push(dma_base + i * crate::mm_constants::PAGE_SIZE_4KB);
                }
            }

            let page_count = meta.page_count();
            for i in 0..page_count {
                output
                    .pages
                    .push(PhysAddr::new(meta.phys.as_u64() + i * crate::mm_constants::PAGE_SIZE_4KB));
            }
            remaining -= page_count as u32;
            acquired_runs.push(meta);
        }

        Ok(output)
    }

    /// Inverse of `populate`: deposit runs back into the matching Bucket,
    /// or free them directly when no Bucket applies. `runs` carries the order each
    /// page-group was allocated at, recovered from the populate-time
    /// metadata the caller is expected to have kept (e.g. via `populate`'s
    /// `PopulateOutput`, reconstructed into `RunMeta`s by the caller's own
    /// bookkeeping — see `drain_run` for the single-run primitive).
    pub fn drain_into_pool(&self, runs: Vec<RunMeta>) {
        for meta in runs {
            self.drain_run(meta);
        }
    }

    pub fn drain_run(&self, meta: RunMeta) {
        if self.zeroing_mode {
            // Hand the run to the deferred-clean worker instead of
            // depositing it straight into a Bucket — it is not safe to
            // reuse until zeroed, so it must not become visible to
            // `populate` until the worker has processed it.
            dirty_worker::defer(meta);
            return;
        }

        let mut meta = meta;
        meta.state = super::run::RunState::CleanInBucket;
        let handle = GLOBAL_ARENA.insert(meta);
        let bucket = self.select_bucket(meta.caching, meta.order);
        let Some(bucket) = bucket else {
            // No Bucket applies (own-bucket DMA pool not yet wired for this
            // order, or cached class with no global Bucket) — evict from
            // the arena immediately and free directly.
            if let Ok(meta) = GLOBAL_ARENA.take(handle) {
                self.adapter.free(meta);
            }
            return;
        };
        bucket.add(handle);

        let cfg = global::config();
        if cfg.max_pooled_pages != 0 {
            let over = global::counter_snapshot().saturating_sub(cfg.max_pooled_pages);
            if over > 0 {
                super::reclaim::scan(over);
            }
        }
    }
}

impl<'a> Drop for Pool<'a> {
    /// Drain every own Bucket (freeing its runs through `self.adapter`) and
    /// unregister it from the Registry before the backing `Vec` frees.
    /// Mirrors `global::teardown`'s sequence for the process-wide arrays.
    fn drop(&mut self) {
        for bucket in &self.own_buckets {
            bucket.drain();
            global::REGISTRY.leave(bucket);
        }
    }
}

fn floor_log2_order(remaining: u32) -> u32 {
    let bit = 31 - remaining.leading_zeros();
    bit.min(MAX_ORDER - 1)
}

fn rollback(output: &mut PopulateOutput, acquired: &mut Vec<RunMeta>, adapter: &dyn AllocatorAdapter) {
    // Pages already deposited in the caller's output array are released to
    // the allocator directly (not pooled): an out-of-memory caller must
    // not grow the pool.
    output.pages.clear();
    output.dma_addresses.clear();
    for meta in acquired.drain(..) {
        adapter.free(meta);
    }
}
