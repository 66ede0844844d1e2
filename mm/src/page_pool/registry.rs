//! Process-wide registry of every live Bucket, with a round-robin
//! reclamation cursor.
//!
//! Membership is a plain `VecDeque` under a sleeping lock: `join` pushes to
//! the back, `leave` removes by pointer identity, `reclaim_one` pops the
//! front, drains one run from it, and pushes it back to the tail. Rotation
//! through the deque *is* the round-robin cursor — there is no separate
//! index to keep in sync.

extern crate alloc;

use alloc::collections::VecDeque;

use slopos_lib::{IrqMutex, klog_debug};

use super::bucket::Bucket;

/// A raw, non-owning reference to a live Bucket. The Registry never drops
/// the pointee — `Pool`/the global bucket arrays own it and must call
/// `leave` before the Bucket itself goes away.
///
/// `Bucket<'a>` has the same layout for every `'a` (its only lifetime-typed
/// fields are references, whose representation does not depend on the
/// lifetime itself), so erasing a `&'a Bucket<'a>` to a `*const
/// Bucket<'static>` is a sound pointer-level cast as long as nothing
/// dereferences it past `'a` — the caller upholds that by calling `leave`
/// (directly or via `Drop`) before the referent goes away.
#[derive(Clone, Copy)]
struct BucketRef(*const Bucket<'static>);

// SAFETY: the pointee is `Bucket<'_>`, which is `Sync` (all interior
// mutability goes through `IrqMutex`); the Registry only ever dereferences
// it to call `&self` methods, for as long as the registration contract
// documented on `BucketRef` holds.
unsafe impl Send for BucketRef {}
unsafe impl Sync for BucketRef {}

impl BucketRef {
    /// # Safety
    /// `bucket` must remain valid until a matching `leave`/removal call.
    #[inline]
    unsafe fn erase(bucket: &Bucket<'_>) -> Self {
        Self(unsafe { core::mem::transmute::<*const Bucket<'_>, *const Bucket<'static>>(bucket as *const Bucket<'_>) })
    }

    #[inline]
    fn get(&self) -> &'static Bucket<'static> {
        // SAFETY: see the invariant documented on `BucketRef` itself.
        unsafe { &*self.0 }
    }
}

impl PartialEq for BucketRef {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.0, other.0)
    }
}

pub struct Registry {
    members: IrqMutex<VecDeque<BucketRef>>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            members: IrqMutex::new(VecDeque::new()),
        }
    }

    /// Register `bucket` at the tail of the round-robin order. The caller
    /// must keep `bucket` alive, and call [`Registry::leave`] on the same
    /// reference before dropping it, for as long as it stays registered —
    /// true of both the `'static` global arrays and a `Pool`'s own Buckets,
    /// whose `Drop` impl calls `leave` before its `Vec<Bucket<'_>>` frees.
    pub fn join(&self, bucket: &Bucket<'_>) {
        // SAFETY: see the contract documented above and on `BucketRef`.
        let r = unsafe { BucketRef::erase(bucket) };
        self.members.lock().push_back(r);
    }

    /// Unregister `bucket`. A no-op if it is not currently a member (e.g.
    /// double-teardown), matching the "never owns it" contract.
    pub fn leave(&self, bucket: &Bucket<'_>) {
        // SAFETY: used only for pointer-identity comparison, never
        // dereferenced past this call.
        let target = unsafe { BucketRef::erase(bucket) };
        self.members.lock().retain(|b| *b != target);
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the Bucket at the head, `remove()` one run from it, invoke the
    /// free-callback (with the registry lock released), then move the
    /// Bucket to the tail. Returns the number of base pages freed (0 or
    /// `2^order`).
    ///
    /// Lock order: registry lock is held only to peek-and-rotate; it is
    /// released before the free-callback (inside `Bucket::remove`'s caller,
    /// i.e. here) runs, so a concurrent `leave` on a *different* bucket can
    /// still make progress.
    pub fn reclaim_one(&self) -> u64 {
        let head = {
            let mut members = self.members.lock();
            let head = match members.pop_front() {
                Some(b) => b,
                None => return 0,
            };
            members.push_back(head);
            head
        };

        let bucket = head.get();
        match bucket.remove_and_free() {
            Some(meta) => {
                klog_debug!(
                    "page_pool: reclaim_one freed order-{} run from bucket",
                    meta.order
                );
                1u64 << meta.order
            }
            None => 0,
        }
    }
}
