//! Scatter-gather descriptor rings over pinned user buffers.

use super::dma::{DmaDirection, DmaParams};
use super::memory::DmaBuffer;
use super::Owner;
use crate::{PlxError, PlxResult};
use alloc::sync::Arc;
use alloc::vec::Vec;
use plx_hal::{BusAddr, PageFrame, Provider, PAGE_MASK, PAGE_SIZE};

/// Descriptor layout of a chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SglFormat {
    /// Linked 16 byte descriptors, 32 bytes with 64-bit PCI addresses.
    P9000,
    /// A ring of 16 byte descriptors, 64 byte aligned.
    P8000,
}

impl SglFormat {
    fn descriptor_size(self, wide: bool) -> usize {
        match self {
            SglFormat::P9000 if wide => 32,
            _ => 16,
        }
    }

    fn alignment(self, wide: bool) -> usize {
        match self {
            SglFormat::P9000 => self.descriptor_size(wide),
            SglFormat::P8000 => 64,
        }
    }
}

/// A built ring, ready to be handed to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SglRing {
    /// Bus address of the first descriptor.
    pub bus: BusAddr,
    pub count: u32,
    /// Whether any page sits above 4G.
    pub wide: bool,
}

/// One page of a pinned buffer and its streaming mapping.
struct Chunk {
    page: PageFrame,
    bus: BusAddr,
    len: usize,
}

/// User pages pinned and mapped for one transfer.
///
/// Dropping it undoes the mappings and unpins the pages.
pub(crate) struct PinnedPages {
    chunks: Vec<Chunk>,
    dir: plx_hal::DmaDirection,
    hal: Arc<dyn Provider>,
}

impl PinnedPages {
    /// Pin the `len` bytes at `user_va` and map them for `dir`.
    pub fn pin(
        hal: &Arc<dyn Provider>,
        user_va: usize,
        len: usize,
        dir: DmaDirection,
    ) -> PlxResult<Self> {
        if len == 0 {
            return Err(PlxError::INVALID_SIZE);
        }
        let offset = user_va & !PAGE_MASK;
        let count = (offset + len + PAGE_SIZE - 1) / PAGE_SIZE;
        let hal_dir = dir.hal_direction();
        let pages = hal.pin_user_pages(user_va & PAGE_MASK, count, hal_dir.writes_memory())?;
        if pages.len() != count {
            error!("only {} of {} user pages could be locked", pages.len(), count);
            for page in pages {
                hal.put_page(page);
            }
            return Err(PlxError::PAGE_LOCK_ERROR);
        }

        let mut chunks = Vec::with_capacity(count);
        let mut remaining = len;
        let mut offset = offset;
        for page in pages {
            let chunk = remaining.min(PAGE_SIZE - offset);
            let bus = hal.dma_map_page(page, offset, chunk, hal_dir);
            chunks.push(Chunk {
                page,
                bus,
                len: chunk,
            });
            remaining -= chunk;
            offset = 0;
        }
        debug!("locked {} user pages at {:#x}", count, user_va);
        Ok(PinnedPages {
            chunks,
            dir: hal_dir,
            hal: hal.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

impl Drop for PinnedPages {
    fn drop(&mut self) {
        for chunk in self.chunks.iter() {
            self.hal.dma_unmap_page(chunk.bus, chunk.len, self.dir);
            if self.dir.writes_memory() && !self.hal.page_reserved(chunk.page) {
                self.hal.set_page_dirty(chunk.page);
            }
            self.hal.put_page(chunk.page);
        }
    }
}

/// Result of a successful build. The pages stay pinned until dropped.
pub(crate) struct SglBuild {
    pub ring: SglRing,
    pub buffer: DmaBuffer,
    pub pages: PinnedPages,
}

/// Pin the user buffer of `params` and write its descriptors.
///
/// `old` is the descriptor buffer of a previous transfer on the channel and
/// is reused when it is large enough.
pub(crate) fn build(
    hal: &Arc<dyn Provider>,
    format: SglFormat,
    old: Option<DmaBuffer>,
    params: &DmaParams,
    const_local: bool,
    owner: Owner,
) -> PlxResult<SglBuild> {
    let pages = PinnedPages::pin(
        hal,
        params.user_va,
        params.byte_count as usize,
        params.direction,
    )?;
    let count = pages.len();
    let wide = pages.chunks.iter().any(|c| c.bus >> 32 != 0);
    let dsize = format.descriptor_size(wide);
    let align = format.alignment(wide);
    let needed = count * dsize + align;

    let buffer = match old {
        Some(buffer) if buffer.size() >= needed => buffer,
        _ => DmaBuffer::alloc(hal, needed, owner).ok_or_else(|| {
            error!(
                "unable to allocate {:#x} bytes for {} descriptors",
                needed, count
            );
            PlxError::INSUFFICIENT_RES
        })?,
    };
    let start = ((buffer.bus() as usize + align - 1) & !(align - 1)) - buffer.bus() as usize;
    let ring_bus = buffer.bus() + start as BusAddr;
    debug!(
        "building {} descriptors at bus {:#x}, wide {}",
        count, ring_bus, wide
    );

    let dir = params.direction as u32;
    let mut local = params.local_addr;
    let mut pci = params.pci_addr;
    for (i, chunk) in pages.chunks.iter().enumerate() {
        let at = start + i * dsize;
        let last = i + 1 == count;
        match format {
            SglFormat::P9000 => {
                let next = if last {
                    dir << 3 | 1 << 1 | 1
                } else {
                    (ring_bus as u32 + ((i + 1) * dsize) as u32) | dir << 3 | 1
                };
                buffer.write_u32(at, chunk.bus as u32);
                buffer.write_u32(at + 0x4, local);
                buffer.write_u32(at + 0x8, chunk.len as u32);
                buffer.write_u32(at + 0xC, next);
                if wide {
                    buffer.write_u32(at + 0x10, (chunk.bus >> 32) as u32);
                }
                if !const_local {
                    local = local.wrapping_add(chunk.len as u32);
                }
            }
            SglFormat::P8000 => {
                let (src, dst) = match params.direction {
                    DmaDirection::USER_TO_PCI => (chunk.bus, pci),
                    _ => (pci, chunk.bus),
                };
                let pci_const = match params.direction {
                    DmaDirection::USER_TO_PCI => params.const_addr_dest,
                    _ => params.const_addr_src,
                };
                if !pci_const {
                    pci += chunk.len as u64;
                }
                let control = 1 << 31
                    | (last as u32) << 30
                    | (params.const_addr_src as u32) << 29
                    | (params.const_addr_dest as u32) << 28
                    | chunk.len as u32;
                buffer.write_u32(at, control);
                buffer.write_u32(
                    at + 0x4,
                    ((src >> 32) as u32 & 0xFFFF) << 16 | ((dst >> 32) as u32 & 0xFFFF),
                );
                buffer.write_u32(at + 0x8, dst as u32);
                buffer.write_u32(at + 0xC, src as u32);
            }
        }
    }
    Ok(SglBuild {
        ring: SglRing {
            bus: ring_bus,
            count: count as u32,
            wide,
        },
        buffer,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plx_hal::mock::MockProvider;

    fn provider() -> (Arc<MockProvider>, Arc<dyn Provider>) {
        let mock = MockProvider::new();
        let hal: Arc<dyn Provider> = mock.clone();
        (mock, hal)
    }

    fn params(user_va: usize, len: u32, direction: DmaDirection) -> DmaParams {
        DmaParams {
            user_va,
            byte_count: len,
            direction,
            local_addr: 0x100,
            pci_addr: 0x4000_0000,
            ..Default::default()
        }
    }

    fn descriptor(buffer: &DmaBuffer, ring: &SglRing, i: usize, dsize: usize) -> Vec<u32> {
        let at = (ring.bus - buffer.bus()) as usize + i * dsize;
        (0..dsize / 4).map(|n| buffer.read_u32(at + n * 4)).collect()
    }

    #[test]
    fn p9000_chain() {
        let (mock, hal) = provider();
        let p = params(0x10_0F00, 0x2300, DmaDirection::PCI_TO_USER);
        let sgl = build(&hal, SglFormat::P9000, None, &p, false, Owner(1)).unwrap();
        let ring = sgl.ring;
        // 0x100 + 0x1000 + 0x1000 + 0x200
        assert_eq!(ring.count, 4);
        assert!(!ring.wide);
        assert_eq!(ring.bus % 16, 0);
        assert_eq!(mock.last_pin_write(), Some(true));

        let mut total = 0;
        let mut local = 0x100;
        for i in 0..4 {
            let d = descriptor(&sgl.buffer, &ring, i, 16);
            assert_eq!(d[1], local);
            local += d[2];
            total += d[2];
            if i < 3 {
                assert_eq!(d[3], (ring.bus as u32 + (i as u32 + 1) * 16) | 1 << 3 | 1);
            } else {
                assert_eq!(d[3], 1 << 3 | 1 << 1 | 1);
            }
        }
        assert_eq!(total, 0x2300);
        let first = descriptor(&sgl.buffer, &ring, 0, 16);
        assert_eq!(first[0], 0x10_0F00);
        assert_eq!(first[2], 0x100);
    }

    #[test]
    fn p9000_wide_and_constant_local() {
        let (mock, hal) = provider();
        mock.set_bus_base(0x1_0000_0000);
        let p = params(0x20_0000, 0x1800, DmaDirection::USER_TO_PCI);
        let sgl = build(&hal, SglFormat::P9000, None, &p, true, Owner(1)).unwrap();
        assert!(sgl.ring.wide);
        assert_eq!(sgl.ring.bus % 32, 0);
        assert_eq!(mock.last_pin_write(), Some(false));
        let d0 = descriptor(&sgl.buffer, &sgl.ring, 0, 32);
        let d1 = descriptor(&sgl.buffer, &sgl.ring, 1, 32);
        assert_eq!((d0[1], d1[1]), (0x100, 0x100));
        assert_eq!((d0[4], d1[4]), (1, 1));
        assert_eq!(d1[3], 1 << 1 | 1);
    }

    #[test]
    fn p8000_ring() {
        let (_, hal) = provider();
        let p = params(0x30_0800, 0x1000, DmaDirection::USER_TO_PCI);
        let sgl = build(&hal, SglFormat::P8000, None, &p, false, Owner(1)).unwrap();
        let ring = sgl.ring;
        assert_eq!(ring.count, 2);
        assert_eq!(ring.bus % 64, 0);
        let d0 = descriptor(&sgl.buffer, &ring, 0, 16);
        let d1 = descriptor(&sgl.buffer, &ring, 1, 16);
        assert_eq!(d0[0], 1 << 31 | 0x800);
        assert_eq!(d1[0], 1 << 31 | 1 << 30 | 0x800);
        // user to PCI: the page is the source
        assert_eq!(d0[3], 0x30_0800);
        assert_eq!(d0[2], 0x4000_0000);
        assert_eq!(d1[2], 0x4000_0800);
        assert_eq!(d1[1], 0);
    }

    #[test]
    fn round_trip_counts() {
        let (_, hal) = provider();
        for &(offset, len) in [(0usize, 1u32), (0xFFF, 2), (0x10, 0x1000), (0x800, 0x5432)].iter() {
            for &format in [SglFormat::P8000, SglFormat::P9000].iter() {
                let p = params(0x40_0000 + offset, len, DmaDirection::PCI_TO_USER);
                let sgl = build(&hal, format, None, &p, false, Owner(1)).unwrap();
                let n = (offset + len as usize + PAGE_SIZE - 1) / PAGE_SIZE;
                assert_eq!(sgl.ring.count as usize, n);
                let mut total = 0;
                let mut ends = 0;
                for i in 0..n {
                    let d = descriptor(&sgl.buffer, &sgl.ring, i, 16);
                    let (count, end) = match format {
                        SglFormat::P8000 => (d[0] & 0x0FFF_FFFF, d[0] & 1 << 30 != 0),
                        SglFormat::P9000 => (d[2], d[3] & 1 << 1 != 0),
                    };
                    total += count;
                    if end {
                        ends += 1;
                        assert_eq!(i, n - 1);
                    }
                }
                assert_eq!(total, len);
                assert_eq!(ends, 1);
            }
        }
    }

    #[test]
    fn buffer_is_reused_when_large_enough() {
        let (mock, hal) = provider();
        let p = params(0x50_0000, 0x4000, DmaDirection::USER_TO_PCI);
        let first = build(&hal, SglFormat::P8000, None, &p, false, Owner(1)).unwrap();
        let bus = first.buffer.bus();
        drop(first.pages);

        let small = params(0x60_0000, 0x1000, DmaDirection::USER_TO_PCI);
        let second = build(&hal, SglFormat::P8000, Some(first.buffer), &small, false, Owner(1))
            .unwrap();
        assert_eq!(second.buffer.bus(), bus);
        drop(second.pages);

        let large = params(0x70_0000, 0x10000, DmaDirection::USER_TO_PCI);
        let third = build(&hal, SglFormat::P8000, Some(second.buffer), &large, false, Owner(1))
            .unwrap();
        assert_ne!(third.buffer.bus(), bus);
        drop(third);
        assert_eq!(mock.live_dma_regions(), 0);
    }

    #[test]
    fn release_marks_written_pages_dirty() {
        let (mock, hal) = provider();
        mock.reserve_page(PageFrame(0x801));
        let pages = PinnedPages::pin(&hal, 0x80_0000, 0x2000, DmaDirection::PCI_TO_USER).unwrap();
        assert_eq!(mock.pinned_pages(), 2);
        assert_eq!(mock.mapped_pages(), 2);
        drop(pages);
        assert_eq!(mock.pinned_pages(), 0);
        assert_eq!(mock.mapped_pages(), 0);
        assert!(mock.is_dirty(PageFrame(0x800)));
        assert!(!mock.is_dirty(PageFrame(0x801)));

        let pages = PinnedPages::pin(&hal, 0x90_0000, 0x10, DmaDirection::USER_TO_PCI).unwrap();
        drop(pages);
        assert!(!mock.is_dirty(PageFrame(0x900)));
    }

    #[test]
    fn partial_pin_is_undone() {
        let (mock, hal) = provider();
        mock.set_pin_limit(Some(2));
        let p = params(0xA0_0000, 0x3000, DmaDirection::USER_TO_PCI);
        assert_eq!(
            build(&hal, SglFormat::P8000, None, &p, false, Owner(1)).err(),
            Some(PlxError::PAGE_LOCK_ERROR)
        );
        assert_eq!(mock.pinned_pages(), 0);
        assert_eq!(mock.live_dma_regions(), 0);
    }

    #[test]
    fn failed_descriptor_allocation_unpins() {
        let (mock, hal) = provider();
        mock.set_dma_limit(Some(1));
        let p = params(0xB0_0000, 0x3000, DmaDirection::USER_TO_PCI);
        assert_eq!(
            build(&hal, SglFormat::P8000, None, &p, false, Owner(1)).err(),
            Some(PlxError::INSUFFICIENT_RES)
        );
        assert_eq!(mock.pinned_pages(), 0);
        assert_eq!(mock.mapped_pages(), 0);
    }
}
