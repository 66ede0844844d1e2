//! Reclaim participant: the subsystem's side of the host's memory-pressure
//! shrinker interface, exposed as a `count`/`scan` pair.
//!
//! `count`/`scan` are free functions rather than an object implementing some
//! host-defined shrinker trait — this crate does not depend on whatever
//! shrinker abstraction core/host code settles on, so `register_participant`
//! accepts plain function pointers and stores them for the host to pull,
//! matching the same "expose a `TaskEntry`-shaped function, let a higher
//! layer wire it up" approach used for the deferred-clean worker.

use core::sync::atomic::{AtomicU64, Ordering};

use slopos_lib::{IrqMutex, klog_debug};

use super::global;

/// Number of completed `scan` calls, for the diagnostics snapshot in
/// [`super::stats`] — this kernel has no cheap monotonic clock visible to
/// `mm` (it does not depend on `core`'s scheduler/timer facilities), so a
/// call count stands in for a last-reclaim timestamp.
static SCAN_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn scan_count() -> u64 {
    SCAN_COUNT.load(Ordering::Relaxed)
}

/// One registered reclaim participant: a `(count, scan)` pair plus the
/// host's own seeks/batch hints, which this subsystem never interprets.
#[derive(Clone, Copy)]
pub struct Participant {
    pub count_fn: fn() -> u64,
    pub scan_fn: fn(u64) -> u64,
    pub seeks: u32,
    pub batch: u32,
}

static PARTICIPANT: IrqMutex<Option<Participant>> = IrqMutex::new(None);

/// Register this subsystem as a reclaim participant with the host's
/// memory-pressure shrinker. Overwrites any previous registration.
pub fn register_participant(count_fn: fn() -> u64, scan_fn: fn(u64) -> u64, seeks: u32, batch: u32) {
    *PARTICIPANT.lock() = Some(Participant {
        count_fn,
        scan_fn,
        seeks,
        batch,
    });
}

pub fn unregister_participant() {
    *PARTICIPANT.lock() = None;
}

pub fn participant() -> Option<Participant> {
    *PARTICIPANT.lock()
}

/// Pages currently sitting clean in a Bucket somewhere, reclaimable without
/// touching dirty-deferred runs. The host's shrinker calls this to decide
/// whether `scan` is worth calling at all.
pub fn count() -> u64 {
    global::counter_snapshot()
}

/// Reclaim up to `nr_to_scan` base pages via the Registry's round-robin
/// rotation, stopping once the pool is truly empty. Returns the number of
/// base pages actually freed, which may be less than requested.
///
/// `reclaim_one` only ever touches the Bucket currently at the head of the
/// rotation and returns 0 when *that* Bucket happens to be empty, even
/// though later Buckets in the rotation may still hold runs — so a single
/// zero result is not proof of exhaustion. This only gives up after one
/// full rotation (`registry.len()` consecutive misses) turns up nothing.
pub fn scan(nr_to_scan: u64) -> u64 {
    let mut freed = 0u64;
    let rotation = global::REGISTRY.len().max(1) as u64;
    let mut misses = 0u64;
    while freed < nr_to_scan && misses < rotation {
        let this_round = global::REGISTRY.reclaim_one();
        if this_round == 0 {
            misses += 1;
            continue;
        }
        misses = 0;
        freed += this_round;
    }
    SCAN_COUNT.fetch_add(1, Ordering::Relaxed);
    if freed > 0 {
        klog_debug!("page_pool: reclaim scan freed {} pages", freed);
    }
    freed
}
