//! The page run and its arena.
//!
//! A run is never boxed or linked through its own pointer: every live run is
//! a slot in a process-wide [`RunArena`], addressed by a [`RunHandle`]
//! (just an index). Buckets chain runs together by storing, inside the slot
//! itself, the index of the next run in the same bucket — an intrusive list
//! without a per-add heap allocation, the handle-based equivalent of linking
//! through an embedded `list_head`.

extern crate alloc;

use alloc::vec::Vec;

use slopos_abi::addr::{PhysAddr, VirtAddr};
use slopos_lib::IrqMutex;

use super::error::{PagePoolError, PagePoolResult};

pub const INVALID_RUN: RunHandle = RunHandle(u32::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingClass {
    Cached,
    WriteCombined,
    Uncached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Normal,
    Dma32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    OwnedByCaller,
    CleanInBucket,
    DirtyDeferred,
    Freed,
}

/// Opaque index into the [`RunArena`]. `Copy` and cheap to pass by value,
/// the same way the rest of this subsystem passes `PhysAddr` around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle(u32);

impl RunHandle {
    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub(super) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Out-of-band metadata for one run, the handle-based replacement for the
/// "private word of the page descriptor" the source stashes this in.
#[derive(Debug, Clone, Copy)]
pub struct RunMeta {
    pub phys: PhysAddr,
    pub order: u32,
    pub caching: CachingClass,
    pub zone: Zone,
    pub dma_addr: Option<u64>,
    pub cpu_vaddr: Option<VirtAddr>,
    pub high_mem: bool,
    pub state: RunState,
}

impl RunMeta {
    pub fn new(phys: PhysAddr, order: u32, caching: CachingClass, zone: Zone) -> Self {
        Self {
            phys,
            order,
            caching,
            zone,
            dma_addr: None,
            cpu_vaddr: None,
            high_mem: false,
            state: RunState::OwnedByCaller,
        }
    }

    #[inline]
    pub fn page_count(&self) -> u64 {
        1u64 << self.order
    }
}

struct RunSlot {
    meta: RunMeta,
    /// Next run in whatever intrusive list currently owns this slot
    /// (a Bucket's chain), or the next free slot when `occupied == false`.
    next: RunHandle,
    occupied: bool,
}

struct ArenaInner {
    slots: Vec<RunSlot>,
    free_head: RunHandle,
}

/// Arena of run slots. One instance backs every Bucket and Pool in a
/// process; handles are stable for the lifetime of the slot.
pub struct RunArena {
    inner: IrqMutex<ArenaInner>,
}

impl RunArena {
    pub const fn new() -> Self {
        Self {
            inner: IrqMutex::new(ArenaInner {
                slots: Vec::new(),
                free_head: INVALID_RUN,
            }),
        }
    }

    /// Insert a run's metadata, returning a stable handle. Reuses a freed
    /// slot when one is available instead of growing the backing `Vec`.
    pub fn insert(&self, meta: RunMeta) -> RunHandle {
        let mut inner = self.inner.lock();
        if inner.free_head.is_invalid() {
            let handle = RunHandle(inner.slots.len() as u32);
            inner.slots.push(RunSlot {
                meta,
                next: INVALID_RUN,
                occupied: true,
            });
            handle
        } else {
            let handle = inner.free_head;
            let idx = handle.index();
            inner.free_head = inner.slots[idx].next;
            inner.slots[idx] = RunSlot {
                meta,
                next: INVALID_RUN,
                occupied: true,
            };
            handle
        }
    }

    /// Remove a slot from the arena entirely, returning its metadata. The
    /// slot is pushed onto the arena's own free list for reuse.
    pub fn take(&self, handle: RunHandle) -> PagePoolResult<RunMeta> {
        let mut inner = self.inner.lock();
        let idx = handle.index();
        let slot = inner
            .slots
            .get(idx)
            .ok_or(PagePoolError::DoubleFree)?;
        if !slot.occupied {
            return Err(PagePoolError::DoubleFree);
        }
        let meta = slot.meta;
        let free_head = inner.free_head;
        inner.slots[idx].occupied = false;
        inner.slots[idx].next = free_head;
        inner.free_head = handle;
        Ok(meta)
    }

    pub fn meta(&self, handle: RunHandle) -> PagePoolResult<RunMeta> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.index())
            .filter(|s| s.occupied)
            .map(|s| s.meta)
            .ok_or(PagePoolError::NullPool)
    }

    pub fn set_meta(&self, handle: RunHandle, meta: RunMeta) {
        let mut inner = self.inner.lock();
        let idx = handle.index();
        if let Some(slot) = inner.slots.get_mut(idx) {
            if slot.occupied {
                slot.meta = meta;
            }
        }
    }

    /// Intrusive chain link read/write, used only by [`super::bucket::Bucket`].
    pub(super) fn next_of(&self, handle: RunHandle) -> RunHandle {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.index())
            .map(|s| s.next)
            .unwrap_or(INVALID_RUN)
    }

    pub(super) fn set_next(&self, handle: RunHandle, next: RunHandle) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(handle.index()) {
            slot.next = next;
        }
    }
}
