use core::ops::{BitAnd, BitOr, Not};

mod mmio;

pub use mmio::{Mmio, MmioRegion};

pub trait Io {
    type Value: Copy
        + BitAnd<Output = Self::Value>
        + BitOr<Output = Self::Value>
        + Not<Output = Self::Value>;

    fn read(&self) -> Self::Value;
    fn write(&mut self, value: Self::Value);
}

/// A window of 32-bit registers addressed by byte offset.
///
/// Implemented by mapped BARs and by PCI configuration space. Reads outside
/// the window return all ones, the same value a master abort produces on
/// the bus.
pub trait RegisterSpace: Send + Sync {
    /// Size of the window in bytes.
    fn size(&self) -> usize;

    fn read32(&self, offset: usize) -> u32;

    fn write32(&self, offset: usize, value: u32);
}
