use super::{Io, RegisterSpace};
use core::ops::{BitAnd, BitOr, Not};

/// Memory-mapped I/O.
#[repr(transparent)]
pub struct Mmio<T>(T);

impl<T> Mmio<T> {
    /// # Safety
    ///
    /// This function is unsafe because `base_addr` may be an arbitrary address.
    pub unsafe fn from_base_as<'a, R>(base_addr: usize) -> &'a mut R {
        debug_assert_eq!(base_addr % core::mem::size_of::<T>(), 0);
        &mut *(base_addr as *mut R)
    }

    /// # Safety
    ///
    /// This function is unsafe because `base_addr` may be an arbitrary address.
    pub unsafe fn from_base<'a>(base_addr: usize) -> &'a mut Self {
        Self::from_base_as(base_addr)
    }
}

impl<T> Io for Mmio<T>
where
    T: Copy + BitAnd<Output = T> + BitOr<Output = T> + Not<Output = T>,
{
    type Value = T;

    fn read(&self) -> T {
        unsafe { core::ptr::read_volatile(&self.0 as *const _) }
    }

    fn write(&mut self, value: T) {
        unsafe { core::ptr::write_volatile(&mut self.0 as *mut _, value) };
    }
}

/// A mapped BAR seen as a [`RegisterSpace`].
///
/// Register values are little-endian on the bus, so they are converted on
/// big-endian hosts.
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// # Safety
    ///
    /// `base..base + size` must stay mapped and writable for the lifetime
    /// of the region, and `base` must be 4-byte aligned.
    pub unsafe fn new(base: usize, size: usize) -> Self {
        MmioRegion { base, size }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    fn reg(&self, offset: usize) -> Option<&mut Mmio<u32>> {
        if offset % 4 != 0 || offset + 4 > self.size {
            warn!("mmio access outside BAR: {:#x} (size {:#x})", offset, self.size);
            return None;
        }
        Some(unsafe { Mmio::<u32>::from_base(self.base + offset) })
    }
}

impl RegisterSpace for MmioRegion {
    fn size(&self) -> usize {
        self.size
    }

    fn read32(&self, offset: usize) -> u32 {
        match self.reg(offset) {
            Some(reg) => u32::from_le(reg.read()),
            None => !0,
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        if let Some(reg) = self.reg(offset) {
            reg.write(value.to_le());
        }
    }
}
