//! Allocator adapter: bridges Bucket free-callbacks to the underlying page
//! allocator, and supplies fresh runs on a Bucket miss.
//!
//! Two capability variants, matching the source's polymorphism over
//! {PlainPages, CoherentDMA}: [`PlainPages`] goes straight through
//! `page_alloc`; [`CoherentDma`] additionally tracks a DMA address and
//! preserved CPU virtual address per run. Both implement [`FreeCallback`]
//! so a Bucket can be parameterised by either without knowing which.

use slopos_lib::{klog_debug, klog_warn};

use crate::hhdm::PhysAddrHhdm;
use crate::page_alloc::{
    ALLOC_FLAG_DMA, ALLOC_FLAG_KERNEL, ALLOC_FLAG_ZERO, alloc_page_frames, free_page_frame,
};

use super::bucket::FreeCallback;
use super::error::{PagePoolError, PagePoolResult};
use super::run::{CachingClass, RunMeta, Zone};

/// Flags accepted by [`AllocatorAdapter::alloc_run`], mirroring the
/// external interface's `{allow_retry_mayfail, zero-initialized,
/// zone=dma32|normal, high-mem-allowed}` bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocRunFlags {
    pub zero: bool,
    pub allow_retry_mayfail: bool,
    pub zone: Option<Zone>,
    pub high_mem_allowed: bool,
}

pub trait AllocatorAdapter: FreeCallback {
    /// Request a fresh run of `2^order` base pages. Returns
    /// `Err(PagePoolError::OutOfMemory)` on allocator exhaustion — the
    /// caller (the Pool façade) is responsible for the order-fallback retry
    /// loop, not this adapter. A DMA-capable adapter returns
    /// `Err(PagePoolError::MappingFailed)` instead when the pages themselves
    /// were obtained but a required DMA mapping was refused.
    fn alloc_run(&self, order: u32, flags: AllocRunFlags, caching: CachingClass) -> PagePoolResult<RunMeta>;
}

/// Plain physical pages through the buddy allocator — no DMA mapping.
pub struct PlainPages;

impl PlainPages {
    fn to_flags(order: u32, flags: AllocRunFlags) -> u32 {
        let mut bits = ALLOC_FLAG_KERNEL | (order << crate::page_alloc::ALLOC_FLAG_ORDER_SHIFT);
        if flags.zero {
            bits |= ALLOC_FLAG_ZERO;
        }
        if matches!(flags.zone, Some(Zone::Dma32)) {
            bits |= ALLOC_FLAG_DMA;
        }
        bits
    }
}

impl AllocatorAdapter for PlainPages {
    fn alloc_run(&self, order: u32, flags: AllocRunFlags, caching: CachingClass) -> PagePoolResult<RunMeta> {
        let page_count = 1u32 << order;
        let phys = alloc_page_frames(page_count, Self::to_flags(order, flags));
        if phys.is_null() {
            return Err(PagePoolError::OutOfMemory);
        }
        let zone = flags.zone.unwrap_or(Zone::Normal);
        let mut meta = RunMeta::new(phys, order, caching, zone);
        meta.high_mem = flags.high_mem_allowed && phys.to_virt_checked().is_none();
        Ok(meta)
    }
}

impl FreeCallback for PlainPages {
    fn free(&self, meta: RunMeta) {
        if free_page_frame(meta.phys) != 0 {
            klog_warn!(
                "page_pool: free_page_frame failed for phys={:#x} order={}",
                meta.phys.as_u64(),
                meta.order
            );
        }
    }
}

/// Device handle used by the coherent-DMA adapter variant. Kept abstract —
/// this subsystem never interprets it, only forwards it to `dma_map`.
pub type DmaDevice = u64;

/// Narrow interface to the environment's DMA layer. A host without real
/// DMA-capable hardware can install a no-op implementation; this subsystem
/// never calls these except through [`CoherentDma`].
pub trait DmaBackend: Send + Sync {
    fn dma_map(&self, dev: DmaDevice, phys: slopos_abi::addr::PhysAddr, bytes: u64) -> Option<u64>;
    fn dma_unmap(&self, dev: DmaDevice, dma_addr: u64, bytes: u64);
}

/// Runs allocated through the plain path but additionally mapped for
/// device DMA (`dma_map`/`dma_unmap` rather than a dedicated coherent
/// allocator call — the "DMA mapping (when not using DMA-alloc)" path of
/// the external interfaces).
pub struct CoherentDma<'a> {
    pub dev: DmaDevice,
    pub backend: &'a dyn DmaBackend,
}

impl<'a> CoherentDma<'a> {
    pub const fn new(dev: DmaDevice, backend: &'a dyn DmaBackend) -> Self {
        Self { dev, backend }
    }
}

impl<'a> AllocatorAdapter for CoherentDma<'a> {
    fn alloc_run(&self, order: u32, flags: AllocRunFlags, caching: CachingClass) -> PagePoolResult<RunMeta> {
        let page_count = 1u32 << order;
        let phys = alloc_page_frames(page_count, PlainPages::to_flags(order, flags));
        if phys.is_null() {
            return Err(PagePoolError::OutOfMemory);
        }
        let bytes = (page_count as u64) * (crate::mm_constants::PAGE_SIZE_4KB);
        let zone = flags.zone.unwrap_or(Zone::Normal);
        let mut meta = RunMeta::new(phys, order, caching, zone);
        match self.backend.dma_map(self.dev, phys, bytes) {
            Some(dma_addr) => {
                meta.dma_addr = Some(dma_addr);
                meta.cpu_vaddr = phys.to_virt_checked();
                Ok(meta)
            }
            None => {
                klog_debug!(
                    "page_pool: dma_map failed for phys={:#x}, releasing run",
                    phys.as_u64()
                );
                free_page_frame(phys);
                Err(PagePoolError::MappingFailed)
            }
        }
    }
}

impl<'a> FreeCallback for CoherentDma<'a> {
    fn free(&self, meta: RunMeta) {
        if let Some(dma_addr) = meta.dma_addr {
            let bytes = meta.page_count() * crate::mm_constants::PAGE_SIZE_4KB;
            self.backend.dma_unmap(self.dev, dma_addr, bytes);
        }
        if free_page_frame(meta.phys) != 0 {
            klog_warn!(
                "page_pool: free_page_frame failed for phys={:#x} order={}",
                meta.phys.as_u64(),
                meta.order
            );
        }
    }
}
