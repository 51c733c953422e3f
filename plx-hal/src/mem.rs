//! Coherent DMA memory and user page pinning.

use crate::{BusAddr, DmaDirection, HalResult, PhysAddr, VirtAddr};
use alloc::vec::Vec;

/// A physically contiguous, device-visible allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// Kernel virtual address.
    pub vaddr: VirtAddr,
    /// CPU physical address.
    pub paddr: PhysAddr,
    /// Address the device uses, which differs from `paddr` behind an IOMMU.
    pub bus: BusAddr,
    pub size: usize,
}

pub trait DmaAllocator: Send + Sync {
    /// Allocate `size` bytes of coherent memory. The content is undefined.
    fn dma_alloc_coherent(&self, size: usize) -> Option<DmaRegion>;

    fn dma_free_coherent(&self, region: &DmaRegion);

    /// Tag or untag every page of the region as reserved, which is required
    /// before the pages may be mapped to user space.
    fn dma_set_reserved(&self, region: &DmaRegion, reserved: bool);
}

/// Opaque handle of one pinned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageFrame(pub usize);

pub trait PagePinner: Send + Sync {
    /// Pin `count` pages of the current address space starting at the
    /// page-aligned `vaddr`.
    ///
    /// May pin fewer pages than requested; the caller owns whatever was
    /// returned and must release it with [`PagePinner::put_page`].
    fn pin_user_pages(&self, vaddr: VirtAddr, count: usize, write: bool)
        -> HalResult<Vec<PageFrame>>;

    fn put_page(&self, page: PageFrame);

    fn set_page_dirty(&self, page: PageFrame);

    fn page_reserved(&self, page: PageFrame) -> bool;

    /// Create a streaming mapping for `len` bytes at `offset` into `page`.
    fn dma_map_page(
        &self,
        page: PageFrame,
        offset: usize,
        len: usize,
        dir: DmaDirection,
    ) -> BusAddr;

    fn dma_unmap_page(&self, bus: BusAddr, len: usize, dir: DmaDirection);
}
