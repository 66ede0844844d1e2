//! Deferred zeroing: the dirty-deferred worker zeroes pages before they
//! land on a clean sub-list; tests drive it synchronously via
//! [`super::dirty_worker::drain_all_sync`] rather than waiting on the real
//! kernel task, matching this subsystem's "no mocked task scheduler" stance —
//! `drain_all_sync` runs the exact same `run_pass` the worker task does.

extern crate alloc;

use slopos_lib::testing::TestResult;
use slopos_lib::{assert_eq_test, assert_test, define_test_suite, pass};

use crate::hhdm::PhysAddrHhdm;

use super::allocator_adapter::{AllocRunFlags, AllocatorAdapter};
use super::config::PagePoolConfig;
use super::dirty_worker;
use super::global;
use super::pool::Pool;
use super::run::{CachingClass, RunMeta};
use super::test_fixtures::FakeAdapter;

/// A run whose physical address happens to fall inside the HHDM window the
/// test environment maps, so `to_virt_checked` succeeds and the worker can
/// actually zero it. The fake adapter's bump allocator starts at
/// `0x1000_0000`, deliberately low so this holds in the test harness's own
/// memory map.
fn low_mem_meta_with_caching(adapter: &FakeAdapter, order: u32, caching: CachingClass) -> RunMeta {
    let mut meta = adapter
        .alloc_run(order, AllocRunFlags::default(), caching)
        .expect("fake adapter alloc");
    meta.high_mem = meta.phys.to_virt_checked().is_none();
    meta
}

fn low_mem_meta(adapter: &FakeAdapter, order: u32) -> RunMeta {
    low_mem_meta_with_caching(adapter, order, CachingClass::Cached)
}

pub fn test_deferred_zeroing_moves_runs_to_clean_list() -> TestResult {
    let adapter = FakeAdapter::new(0);
    let mut deposited = 0u32;

    for _ in 0..4 {
        let meta = low_mem_meta(&adapter, 4); // 16 pages each, 64 total
        if meta.high_mem {
            // This test environment has no HHDM mapping reachable from the
            // fake adapter's addresses — the worker cannot zero such a run
            // synchronously, only on next allocation. Skip rather than
            // fail: the invariant under test is the low-memory path.
            continue;
        }
        deposited += 1;
        dirty_worker::defer(meta);
    }
    if deposited == 0 {
        return pass!();
    }

    let before = global::counter_snapshot();
    dirty_worker::drain_all_sync(PagePoolConfig::unbounded());
    let after = global::counter_snapshot();

    assert_test!(after >= before, "deferred runs land in a Bucket, growing the pool counter");
    pass!()
}

pub fn test_zero_run_clears_existing_contents() -> TestResult {
    let adapter = FakeAdapter::new(0);
    let meta = adapter
        .alloc_run(0, AllocRunFlags::default(), CachingClass::Cached)
        .expect("fake adapter alloc");

    let Some(virt) = meta.phys.to_virt_checked() else {
        // No HHDM mapping reachable in this harness for the fake address —
        // nothing to verify.
        return pass!();
    };

    // SAFETY: this run is exclusively owned by the test, freshly allocated
    // from the fake adapter and not registered with any Bucket yet.
    unsafe {
        core::ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0xAA, 4096);
    }
    dirty_worker::defer(meta);
    dirty_worker::drain_all_sync(PagePoolConfig::unbounded());

    // SAFETY: re-reading the same mapping after the worker zeroed it.
    let byte = unsafe { *virt.as_mut_ptr::<u8>() };
    assert_eq_test!(byte, 0, "deferred-clean worker zeroes the run before depositing it");
    pass!()
}

pub fn test_drain_run_routes_through_defer_in_zeroing_mode() -> TestResult {
    // A zeroing-mode Pool's `drain_run` must reach the dirty-deferred list
    // through its own documented entry point, not just via a direct
    // `dirty_worker::defer` call. Uses a non-DMA pool (global Bucket
    // arrays) so the run's eventual home bucket, looked up by the worker
    // through `global::global_bucket`, actually matches the array this
    // pool's own `populate` would have consulted.
    let adapter = FakeAdapter::new(0);
    let pool = Pool::new(&adapter, false, false, true);

    let meta = low_mem_meta_with_caching(&adapter, 0, CachingClass::WriteCombined);
    if meta.high_mem {
        // No HHDM mapping reachable for the fake adapter's address in this
        // harness — nothing to verify about zeroing, but draining through
        // a zeroing-mode pool must still not panic or deposit un-zeroed.
        pool.drain_run(meta);
        return pass!();
    }

    let before = global::counter_snapshot();
    pool.drain_run(meta);
    dirty_worker::drain_all_sync(PagePoolConfig::unbounded());
    let after = global::counter_snapshot();

    assert_test!(
        after > before,
        "drain_run in zeroing mode must still land the run in a bucket via the worker"
    );
    pass!()
}

define_test_suite!(
    page_pool_dirty,
    [
        test_deferred_zeroing_moves_runs_to_clean_list,
        test_zero_run_clears_existing_contents,
        test_drain_run_routes_through_defer_in_zeroing_mode,
    ]
);
