//! Bucket: a list of clean runs sharing (caching, order, zone).
//!
//! Lock order for this module: callers never acquire `bucket.lock` while
//! holding `registry.lock` or `pool.lock` — see `registry.rs` and `pool.rs`.
//! The free-callback is always invoked with the bucket lock dropped.

use slopos_lib::IrqMutex;

use super::allocator_adapter::AllocatorAdapter;
use super::run::{CachingClass, INVALID_RUN, RunArena, RunHandle, RunMeta, Zone};

/// Release a run back to whatever allocated it. Implemented by the
/// allocator adapter; never invoked with `bucket.lock` held.
///
/// A supertrait of [`AllocatorAdapter`] rather than a standalone object a
/// Bucket stores separately — every adapter that can allocate a run also
/// knows how to free one, and calling a supertrait method through a
/// `dyn AllocatorAdapter` needs no trait-object upcasting.
pub trait FreeCallback: Send + Sync {
    fn free(&self, meta: RunMeta);
}

struct BucketInner {
    head: RunHandle,
    count: u32,
}

pub struct Bucket<'a> {
    pub caching: CachingClass,
    pub order: u32,
    pub zone: Zone,
    arena: &'a RunArena,
    inner: IrqMutex<BucketInner>,
    free_cb: &'a dyn AllocatorAdapter,
}

impl<'a> Bucket<'a> {
    pub const fn new(
        caching: CachingClass,
        order: u32,
        zone: Zone,
        arena: &'a RunArena,
        free_cb: &'a dyn AllocatorAdapter,
    ) -> Self {
        Self {
            caching,
            order,
            zone,
            arena,
            inner: IrqMutex::new(BucketInner {
                head: INVALID_RUN,
                count: 0,
            }),
            free_cb,
        }
    }

    /// Append `run` to the bucket. Infallible: the list is intrusive, no
    /// node allocation is needed. Bumps the global page counter by
    /// `2^order` pages after releasing the bucket lock.
    pub fn add(&self, run: RunHandle) {
        {
            let mut inner = self.inner.lock();
            self.arena.set_next(run, inner.head);
            inner.head = run;
            inner.count += 1;
        }
        super::global::counter_add(1u64 << self.order);
    }

    /// Pop the head run, or `None` if empty. Never blocks beyond the lock.
    pub fn remove(&self) -> Option<RunHandle> {
        let run = {
            let mut inner = self.inner.lock();
            if inner.head.is_invalid() {
                return None;
            }
            let run = inner.head;
            inner.head = self.arena.next_of(run);
            inner.count -= 1;
            run
        };
        super::global::counter_sub(1u64 << self.order);
        Some(run)
    }

    pub fn size(&self) -> u32 {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Pop one run, evict it from the arena, and hand it to the
    /// free-callback with the bucket lock dropped. Used by
    /// `Registry::reclaim_one` and by teardown. Returns the freed run's
    /// metadata, or `None` if the bucket was empty.
    pub fn remove_and_free(&self) -> Option<RunMeta> {
        let run = self.remove()?;
        match self.arena.take(run) {
            Ok(meta) => {
                self.free_cb.free(meta);
                Some(meta)
            }
            Err(_) => None,
        }
    }

    /// Pop every run and hand it to the free-callback. The bucket lock is
    /// dropped before each callback invocation so the callback may sleep or
    /// reacquire the registry lock (e.g. DMA unmap).
    pub fn drain(&self) {
        while self.remove_and_free().is_some() {}
    }
}
