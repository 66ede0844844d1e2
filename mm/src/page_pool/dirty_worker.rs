//! Deferred-clean worker: moves runs out of a caching class's dirty-deferred
//! list by zeroing them and re-inserting them as clean, without the caller
//! of `drain_into_pool` paying for the zero-fill inline.
//!
//! Runs enter here only through [`defer`], which a caller uses instead of
//! handing a sensitive run straight to a Bucket. Two sub-lists per order —
//! low-memory (HHDM-mapped, zeroed in place) and high-memory (no permanent
//! mapping, left for the allocator adapter's own zero-on-alloc flag) — mirror
//! the "prefer low memory, scan high memory only as a fallback" shrink order
//! from the reclaim participant's scan priority.
//!
//! The worker function below has the same shape as `core::scheduler::task`'s
//! `TaskEntry` (`fn(*mut c_void)`) without naming that type directly — `mm`
//! does not depend on `core`. A higher layer spawns it with `kthread_spawn`.

extern crate alloc;

use core::ffi::c_void;
use core::ptr;

use alloc::collections::VecDeque;

use slopos_lib::{IrqMutex, WaitQueue, klog_debug, klog_info, klog_warn};

use crate::hhdm::PhysAddrHhdm;
use crate::mm_constants::PAGE_SIZE_4KB;

use super::bucket::Bucket;
use super::config::PagePoolConfig;
use super::global::{self, GLOBAL_ARENA};
use super::run::{RunHandle, RunMeta, RunState};

struct DirtyList {
    low_mem: VecDeque<RunHandle>,
    high_mem: VecDeque<RunHandle>,
}

impl DirtyList {
    const fn new() -> Self {
        Self {
            low_mem: VecDeque::new(),
            high_mem: VecDeque::new(),
        }
    }
}

static DIRTY: IrqMutex<DirtyList> = IrqMutex::new(DirtyList::new());
static DIRTY_WQ: WaitQueue = WaitQueue::new();

/// Push `meta` onto the dirty-deferred list instead of directly into a
/// Bucket. The caller must not touch the run again — ownership passes to
/// the arena/worker pair.
pub fn defer(meta: RunMeta) {
    let high_mem = meta.high_mem;
    let mut meta = meta;
    meta.state = RunState::DirtyDeferred;
    let handle = GLOBAL_ARENA.insert(meta);
    {
        let mut dirty = DIRTY.lock();
        if high_mem {
            dirty.high_mem.push_back(handle);
        } else {
            dirty.low_mem.push_back(handle);
        }
    }
    DIRTY_WQ.wake_one();
}

fn dirty_count() -> usize {
    let dirty = DIRTY.lock();
    dirty.low_mem.len() + dirty.high_mem.len()
}

/// Zero one run in place via its HHDM mapping. High-memory runs (no
/// permanent virtual mapping) are left dirty here — they are zeroed by the
/// allocator adapter's own zero-on-alloc flag the next time they are handed
/// out, matching the "low memory first" shrink priority.
fn zero_run(meta: &RunMeta) -> bool {
    let Some(virt) = meta.phys.to_virt_checked() else {
        return false;
    };
    let byte_len = (meta.page_count() * PAGE_SIZE_4KB) as usize;
    // SAFETY: `virt` is an HHDM-mapped, exclusively-owned run (it was just
    // popped off the dirty list and not yet visible to any Bucket) of
    // `byte_len` bytes.
    unsafe {
        ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0, byte_len);
    }
    true
}

/// Drain up to `batch` low-memory handles off the dirty list without
/// holding the lock across the zero-fill.
fn take_batch(batch: u32) -> alloc::vec::Vec<RunHandle> {
    let mut dirty = DIRTY.lock();
    let mut taken = alloc::vec::Vec::with_capacity(batch as usize);
    while (taken.len() as u32) < batch {
        match dirty.low_mem.pop_front() {
            Some(h) => taken.push(h),
            None => break,
        }
    }
    taken
}

fn deposit_clean(handle: RunHandle) {
    let meta = match GLOBAL_ARENA.meta(handle) {
        Ok(m) => m,
        Err(_) => return,
    };
    let bucket: Option<&'static Bucket<'static>> =
        global::global_bucket(meta.caching, meta.order, meta.zone);
    match bucket {
        Some(bucket) => bucket.add(handle),
        None => {
            // No global Bucket for this (caching, order, zone) — evict and
            // free directly rather than leaking the arena slot.
            if let Ok(meta) = GLOBAL_ARENA.take(handle) {
                klog_warn!(
                    "page_pool: deferred-clean run order={} has no home bucket, freeing",
                    meta.order
                );
            }
        }
    }
}

/// One pass: zero and deposit up to `batch` low-memory dirty runs. Returns
/// the number actually processed.
fn run_pass(batch: u32) -> usize {
    let handles = take_batch(batch);
    let mut processed = 0;
    for handle in handles {
        let meta = match GLOBAL_ARENA.meta(handle) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if zero_run(&meta) {
            let mut clean = meta;
            clean.state = RunState::CleanInBucket;
            GLOBAL_ARENA.set_meta(handle, clean);
            deposit_clean(handle);
            processed += 1;
        } else {
            // Could not map this run (shouldn't happen for a low-memory
            // handle) — push it back rather than lose it.
            let mut dirty = DIRTY.lock();
            dirty.low_mem.push_back(handle);
        }
    }
    processed
}

/// Entry point for the deferred-clean kernel task. Wakes whenever
/// [`defer`] adds work, processes up to `config.dirty_passes_per_wake`
/// batches of `config.dirty_batch_size` runs each, then sleeps again.
///
/// Matches `TaskEntry`'s `fn(*mut c_void)` shape; `_arg` is unused.
pub fn worker_entry(_arg: *mut c_void) {
    klog_info!("page_pool: deferred-clean worker started");
    loop {
        DIRTY_WQ.wait_event(|| dirty_count() > 0);
        let cfg = global::config();
        run_wake_cycle(cfg);
    }
}

fn run_wake_cycle(cfg: PagePoolConfig) {
    for pass in 0..cfg.dirty_passes_per_wake {
        let processed = run_pass(cfg.dirty_batch_size);
        if processed == 0 {
            break;
        }
        klog_debug!(
            "page_pool: deferred-clean pass {} processed {} runs",
            pass,
            processed
        );
    }
}

/// Test/teardown hook: synchronously drain every dirty run without waiting
/// for the worker task, so a test can assert on Bucket contents right after
/// a `defer` call. Not used from `worker_entry`'s own loop.
pub fn drain_all_sync(cfg: PagePoolConfig) {
    loop {
        let processed = run_pass(cfg.dirty_batch_size);
        if processed == 0 {
            break;
        }
    }
}
