//! Caching-attribute stage: batches pages that must change caching class
//! before they're handed back to a caller.
//!
//! On x86_64 this reprograms the PWT/PCD bits of the HHDM mapping PTEs for
//! the affected physical range so the CPU observes the new memory type
//! (the PAT layout programmed by `pat::pat_init` puts write-combining at
//! PWT=1/PCD=0 — see `pat.rs`). On other architectures, or when PAT is
//! unsupported, these are no-ops and the run is served as write-back; a
//! caller that strictly needs WC/UC degrades to slower but correct access.

use slopos_abi::addr::PhysAddr;
use slopos_lib::klog_warn;

use crate::hhdm::PhysAddrHhdm;
use crate::mm_constants::PAGE_SIZE_4KB;
use crate::pat;

use super::run::CachingClass;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::*;
    use crate::paging::{paging_get_kernel_directory, paging_update_range_cache_type};
    use crate::paging_defs::PageFlags;
    use slopos_abi::addr::VirtAddr;

    fn update_range(phys: PhysAddr, page_count: u32, flags: PageFlags) {
        let Some(virt) = phys.to_virt_checked() else {
            klog_warn!(
                "page_pool: caching stage skipped, phys={:#x} not HHDM-mapped",
                phys.as_u64()
            );
            return;
        };
        let start = virt;
        let end = VirtAddr::new(start.as_u64() + (page_count as u64) * PAGE_SIZE_4KB);
        let dir = paging_get_kernel_directory();
        if paging_update_range_cache_type(dir, start, end, flags) != 0 {
            klog_warn!(
                "page_pool: caching stage update_range_cache_type failed phys={:#x}",
                phys.as_u64()
            );
        }
    }

    pub fn set_range_wc(phys: PhysAddr, page_count: u32) {
        if !pat::is_supported() {
            return;
        }
        update_range(phys, page_count, PageFlags::WRITE_THROUGH);
    }

    pub fn set_range_uc(phys: PhysAddr, page_count: u32) {
        if !pat::is_supported() {
            return;
        }
        update_range(phys, page_count, PageFlags::CACHE_DISABLE);
    }

    pub fn set_pages_wb(phys: PhysAddr, page_count: u32) {
        if !pat::is_supported() {
            return;
        }
        update_range(phys, page_count, PageFlags::empty());
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod x86 {
    use super::*;

    pub fn set_range_wc(_phys: PhysAddr, _page_count: u32) {}
    pub fn set_range_uc(_phys: PhysAddr, _page_count: u32) {}
    pub fn set_pages_wb(_phys: PhysAddr, _page_count: u32) {}
}

/// Transition `page_count` pages starting at `phys` into `target`. A no-op
/// when `current == target` — whole-order runs pulled from a Bucket of the
/// matching caching class never reach this function at all (the Pool
/// façade skips the call), but `apply` is idempotent regardless.
pub fn apply(phys: PhysAddr, page_count: u32, current: CachingClass, target: CachingClass) {
    if current == target {
        return;
    }
    match target {
        CachingClass::WriteCombined => x86::set_range_wc(phys, page_count),
        CachingClass::Uncached => x86::set_range_uc(phys, page_count),
        CachingClass::Cached => x86::set_pages_wb(phys, page_count),
    }
}
