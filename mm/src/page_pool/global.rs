//! Process-wide singletons: the global page counter, the Registry, and the
//! four global Bucket arrays (write-combined/uncached × normal/dma32).
//!
//! Lifecycle: [`init`] creates the empty Registry and the `4 * MAX_ORDER`
//! global Buckets; [`teardown`] drains and unregisters each, then asserts
//! the Registry is empty. Both are idempotent-guarded by `INIT_FLAG`.

use core::sync::atomic::{AtomicU64, Ordering};

use slopos_lib::{InitFlag, OnceLock, klog_info, klog_warn};

use super::allocator_adapter::PlainPages;
use super::bucket::Bucket;
use super::config::{MAX_ORDER, PagePoolConfig};
use super::registry::Registry;
use super::run::{CachingClass, RunArena, Zone};

static GLOBAL_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(super) fn counter_add(pages: u64) {
    GLOBAL_COUNTER.fetch_add(pages, Ordering::AcqRel);
}

pub(super) fn counter_sub(pages: u64) {
    GLOBAL_COUNTER.fetch_sub(pages, Ordering::AcqRel);
}

/// Snapshot of the global counter. May race with concurrent add/remove —
/// acceptable, it is only an eviction hint for the reclaim participant.
pub fn counter_snapshot() -> u64 {
    GLOBAL_COUNTER.load(Ordering::Acquire)
}

pub static GLOBAL_ARENA: RunArena = RunArena::new();
pub static REGISTRY: Registry = Registry::new();
static PLAIN_PAGES: PlainPages = PlainPages;

const ORDERS: usize = MAX_ORDER as usize;

// `Bucket::new` is `const fn`, but building a const array of ORDERS
// non-`Copy` elements from a runtime loop is not: array::map and closures
// are not const-evaluable in a static initializer. Instead enumerate the
// orders explicitly; `ORDER_COUNT_MATCHES_MAX_ORDER` below fails to compile
// if `config::MAX_ORDER` and this list of indices ever drift apart.
const _: () = assert!(MAX_ORDER == 11, "bucket_array! literal must list MAX_ORDER entries");

struct GlobalBucketArray {
    buckets: [Bucket<'static>; ORDERS],
}

macro_rules! bucket_array {
    ($caching:expr, $zone:expr) => {
        [
            Bucket::new($caching, 0, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 1, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 2, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 3, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 4, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 5, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 6, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 7, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 8, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 9, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
            Bucket::new($caching, 10, $zone, &GLOBAL_ARENA, &PLAIN_PAGES),
        ]
    };
}

static WC_NORMAL: GlobalBucketArray = GlobalBucketArray {
    buckets: bucket_array!(CachingClass::WriteCombined, Zone::Normal),
};
static UC_NORMAL: GlobalBucketArray = GlobalBucketArray {
    buckets: bucket_array!(CachingClass::Uncached, Zone::Normal),
};
static WC_DMA32: GlobalBucketArray = GlobalBucketArray {
    buckets: bucket_array!(CachingClass::WriteCombined, Zone::Dma32),
};
static UC_DMA32: GlobalBucketArray = GlobalBucketArray {
    buckets: bucket_array!(CachingClass::Uncached, Zone::Dma32),
};

static CONFIG: OnceLock<PagePoolConfig> = OnceLock::new();

/// Per-test override of `max_pooled_pages`, read in addition to `CONFIG`
/// (which, being a `OnceLock`, can only be set once per process and so
/// cannot itself be varied across tests that run in the same binary).
/// `u64::MAX` means "no override".
#[cfg(test)]
static TEST_CAP_OVERRIDE: AtomicU64 = AtomicU64::new(u64::MAX);

#[cfg(test)]
pub fn set_test_cap(max_pooled_pages: u64) {
    TEST_CAP_OVERRIDE.store(max_pooled_pages, Ordering::Release);
}

#[cfg(test)]
pub fn clear_test_cap() {
    TEST_CAP_OVERRIDE.store(u64::MAX, Ordering::Release);
}

pub fn config() -> PagePoolConfig {
    let mut cfg = CONFIG.get().copied().unwrap_or(PagePoolConfig::unbounded());
    #[cfg(test)]
    {
        let over = TEST_CAP_OVERRIDE.load(Ordering::Acquire);
        if over != u64::MAX {
            cfg.max_pooled_pages = over;
        }
    }
    cfg
}

static INIT_FLAG: InitFlag = InitFlag::new();

/// Select the global Bucket for (caching, order, zone). Returns `None` for
/// `CachingClass::Cached` (the source's "cached Bucket" is always a
/// per-pool one, not a global array — see `pool.rs`) or an out-of-range
/// order.
pub fn global_bucket(caching: CachingClass, order: u32, zone: Zone) -> Option<&'static Bucket<'static>> {
    let order = order as usize;
    if order >= ORDERS {
        return None;
    }
    let array = match (caching, zone) {
        (CachingClass::WriteCombined, Zone::Normal) => &WC_NORMAL,
        (CachingClass::Uncached, Zone::Normal) => &UC_NORMAL,
        (CachingClass::WriteCombined, Zone::Dma32) => &WC_DMA32,
        (CachingClass::Uncached, Zone::Dma32) => &UC_DMA32,
        (CachingClass::Cached, _) => return None,
    };
    Some(&array.buckets[order])
}

/// Register the four global Bucket arrays with the Registry and record the
/// subsystem config. Idempotent: a second call is a no-op.
pub fn init(cfg: PagePoolConfig) {
    if !INIT_FLAG.init_once() {
        klog_warn!("page_pool: init() called more than once, ignoring");
        return;
    }
    CONFIG.call_once(|| cfg);
    for array in [&WC_NORMAL, &UC_NORMAL, &WC_DMA32, &UC_DMA32] {
        for bucket in &array.buckets {
            REGISTRY.join(bucket);
        }
    }
    klog_info!(
        "page_pool: initialized, max_pooled_pages={}, {} global buckets",
        cfg.max_pooled_pages,
        4 * ORDERS
    );
}

/// Drain and unregister every global Bucket, then assert the Registry is
/// empty. Only meaningful in test/shutdown paths — production kernels
/// never tear this down during normal operation.
pub fn teardown() {
    for array in [&WC_NORMAL, &UC_NORMAL, &WC_DMA32, &UC_DMA32] {
        for bucket in &array.buckets {
            bucket.drain();
            REGISTRY.leave(bucket);
        }
    }
    debug_assert!(
        REGISTRY.is_empty(),
        "page_pool: registry not empty after teardown"
    );
    if !REGISTRY.is_empty() {
        klog_warn!("page_pool: registry still has members after teardown");
    }
}
