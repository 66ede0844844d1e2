//! Fakes for exercising the Pool façade without depending on the real
//! buddy allocator's exhaustion behavior, in the style of `mm::test_fixtures`.

extern crate alloc;

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use alloc::vec::Vec;

use slopos_abi::addr::PhysAddr;
use slopos_lib::IrqMutex;

use super::allocator_adapter::{AllocRunFlags, AllocatorAdapter};
use super::bucket::FreeCallback;
use super::error::{PagePoolError, PagePoolResult};
use super::run::{CachingClass, RunMeta, Zone};

/// An allocator adapter backed by a bump counter over a fake physical
/// address space, so tests can allocate/free without touching the real
/// buddy allocator's global state. Optionally caps the number of
/// outstanding runs to exercise order-fallback and out-of-memory paths.
pub struct FakeAdapter {
    next_phys: AtomicU64,
    alloc_calls: AtomicU32,
    free_calls: AtomicU32,
    outstanding: AtomicU32,
    max_outstanding: u32,
    fail_mapping: bool,
    freed: IrqMutex<Vec<PhysAddr>>,
}

impl FakeAdapter {
    pub fn new(max_outstanding: u32) -> Self {
        Self {
            next_phys: AtomicU64::new(0x1000_0000),
            alloc_calls: AtomicU32::new(0),
            free_calls: AtomicU32::new(0),
            outstanding: AtomicU32::new(0),
            max_outstanding,
            fail_mapping: false,
            freed: IrqMutex::new(Vec::new()),
        }
    }

    /// An adapter standing in for a `CoherentDma` whose `dma_map` refuses
    /// every request — every `alloc_run` call returns `MappingFailed`
    /// rather than handing out a run, matching `CoherentDma::alloc_run`'s
    /// own behavior on a mapping refusal.
    pub fn new_refusing_mapping() -> Self {
        Self {
            fail_mapping: true,
            ..Self::new(0)
        }
    }

    pub fn alloc_calls(&self) -> u32 {
        self.alloc_calls.load(Ordering::Acquire)
    }

    pub fn free_calls(&self) -> u32 {
        self.free_calls.load(Ordering::Acquire)
    }

    pub fn freed_addrs(&self) -> Vec<PhysAddr> {
        self.freed.lock().clone()
    }
}

impl AllocatorAdapter for FakeAdapter {
    fn alloc_run(&self, order: u32, flags: AllocRunFlags, caching: CachingClass) -> PagePoolResult<RunMeta> {
        self.alloc_calls.fetch_add(1, Ordering::AcqRel);
        if self.fail_mapping {
            return Err(PagePoolError::MappingFailed);
        }
        if self.max_outstanding != 0 && self.outstanding.load(Ordering::Acquire) >= self.max_outstanding {
            return Err(PagePoolError::OutOfMemory);
        }
        let page_count = 1u64 << order;
        let phys = PhysAddr::new(
            self.next_phys
                .fetch_add(page_count * 4096, Ordering::AcqRel),
        );
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let zone = flags.zone.unwrap_or(Zone::Normal);
        Ok(RunMeta::new(phys, order, caching, zone))
    }
}

impl FreeCallback for FakeAdapter {
    fn free(&self, meta: RunMeta) {
        self.free_calls.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.freed.lock().push(meta.phys);
    }
}
