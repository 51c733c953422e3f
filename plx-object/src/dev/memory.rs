//! Physically contiguous DMA memory handed out to callers.

use super::{Device, Owner};
use crate::{PlxError, PlxResult};
use alloc::sync::Arc;
use alloc::vec::Vec;
use plx_hal::{BusAddr, DmaRegion, PhysAddr, Provider, VirtAddr, PAGE_SIZE};

/// A coherent buffer, zeroed and tagged reserved while it lives.
pub struct DmaBuffer {
    region: DmaRegion,
    owner: Owner,
    hal: Arc<dyn Provider>,
}

/// Addresses of a physical memory object as reported to its owner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhysMemInfo {
    pub kernel_va: VirtAddr,
    pub cpu_phys: PhysAddr,
    pub bus: BusAddr,
    pub size: usize,
}

impl DmaBuffer {
    /// Allocate exactly `size` bytes, or nothing.
    pub(crate) fn alloc(hal: &Arc<dyn Provider>, size: usize, owner: Owner) -> Option<Self> {
        let region = hal.dma_alloc_coherent(size)?;
        unsafe {
            core::ptr::write_bytes(region.vaddr as *mut u8, 0, region.size);
        }
        hal.dma_set_reserved(&region, true);
        Some(DmaBuffer {
            region,
            owner,
            hal: hal.clone(),
        })
    }

    /// Allocate `size` bytes, shrinking the request by `shrink_percent`
    /// after every failure if `smaller_ok`, down to one page.
    pub(crate) fn alloc_shrinking(
        hal: &Arc<dyn Provider>,
        size: usize,
        smaller_ok: bool,
        shrink_percent: u32,
        owner: Owner,
    ) -> PlxResult<Self> {
        let mut size = size;
        loop {
            if let Some(buffer) = DmaBuffer::alloc(hal, size, owner) {
                return Ok(buffer);
            }
            if !smaller_ok || size <= PAGE_SIZE {
                warn!("unable to allocate {:#x} bytes of DMA memory", size);
                return Err(PlxError::INSUFFICIENT_RES);
            }
            let step = (size * shrink_percent as usize / 100).max(1);
            size = size.saturating_sub(step).max(PAGE_SIZE);
            debug!("DMA allocation failed, retrying with {:#x} bytes", size);
        }
    }

    pub fn info(&self) -> PhysMemInfo {
        PhysMemInfo {
            kernel_va: self.region.vaddr,
            cpu_phys: self.region.paddr,
            bus: self.region.bus,
            size: self.region.size,
        }
    }

    pub fn size(&self) -> usize {
        self.region.size
    }

    pub fn bus(&self) -> BusAddr {
        self.region.bus
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Store a little-endian dword at byte `offset`.
    pub(crate) fn write_u32(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.region.size, "DMA buffer overrun");
        let ptr = (self.region.vaddr + offset) as *mut u32;
        unsafe { ptr.write_unaligned(value.to_le()) }
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.region.size, "DMA buffer overrun");
        let ptr = (self.region.vaddr + offset) as *const u32;
        u32::from_le(unsafe { ptr.read_unaligned() })
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        self.hal.dma_set_reserved(&self.region, false);
        self.hal.dma_free_coherent(&self.region);
    }
}

impl Device {
    /// Allocate a physical memory object for `owner`.
    ///
    /// A zero size succeeds without allocating anything.
    pub fn phys_mem_allocate(
        &self,
        size: usize,
        smaller_ok: bool,
        owner: Owner,
    ) -> PlxResult<PhysMemInfo> {
        if size == 0 {
            return Ok(PhysMemInfo::default());
        }
        let buffer = DmaBuffer::alloc_shrinking(
            &self.hal,
            size,
            smaller_ok,
            self.config.alloc_shrink_percent,
            owner,
        )?;
        let info = buffer.info();
        debug!(
            "allocated {:#x} bytes of physical memory at bus {:#x}",
            info.size, info.bus
        );
        self.memory.lock().push(buffer);
        Ok(info)
    }

    /// Free the object at bus address `bus`.
    pub fn phys_mem_free(&self, bus: BusAddr) -> PlxResult {
        let buffer = {
            let mut memory = self.memory.lock();
            let index = memory
                .iter()
                .position(|b| b.bus() == bus)
                .ok_or(PlxError::NOT_FOUND)?;
            memory.swap_remove(index)
        };
        drop(buffer);
        Ok(())
    }

    /// Free every object of `owner`.
    pub fn phys_mem_free_all(&self, owner: Owner) {
        // release outside the lock
        let freed: Vec<DmaBuffer> = {
            let mut memory = self.memory.lock();
            let (freed, kept) = core::mem::take(&mut *memory)
                .into_iter()
                .partition(|b| b.owner() == owner);
            *memory = kept;
            freed
        };
        if !freed.is_empty() {
            debug!("freeing {} physical memory objects", freed.len());
        }
    }

    /// Number of tracked physical memory objects.
    pub fn phys_mem_count(&self) -> usize {
        self.memory.lock().len()
    }
}
