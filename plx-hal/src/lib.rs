//! Hardware abstraction for PLX bridge drivers.
//!
//! Everything the driver core needs from the platform is expressed as a
//! trait here and bundled into [`Provider`].
//!
//! # Feature flags
//!
//! - `mock`: Enables `plx_hal::mock`, simulated hardware and platform
//!   services for tests.

#![cfg_attr(not(feature = "mock"), no_std)]

extern crate alloc;

#[macro_use]
extern crate log;

#[cfg(all(test, not(feature = "mock")))]
#[macro_use]
extern crate std;

pub mod defs {
    use numeric_enum_macro::numeric_enum;

    numeric_enum! {
        #[repr(u8)]
        #[derive(Debug, PartialEq, Eq, Clone, Copy)]
        /// Direction of a streaming DMA mapping, seen from the device.
        pub enum DmaDirection {
            Bidirectional = 0,
            ToDevice = 1,
            FromDevice = 2,
        }
    }

    impl DmaDirection {
        /// Whether the device writes into host memory.
        pub fn writes_memory(self) -> bool {
            matches!(self, Self::FromDevice | Self::Bidirectional)
        }
    }

    pub type PhysAddr = usize;
    pub type VirtAddr = usize;
    pub type BusAddr = u64;
    pub const PAGE_SIZE: usize = 0x1000;
    pub const PAGE_MASK: usize = !(PAGE_SIZE - 1);
}

pub mod interrupt;
pub mod io;
pub mod mem;
pub mod timer;
pub mod work;

cfg_if::cfg_if! {
    if #[cfg(feature = "mock")] {
        pub mod mock;
    }
}

pub use self::defs::*;
pub use self::interrupt::{InterruptControl, IrqSaveGuard, IrqSaveLock};
pub use self::io::{Io, Mmio, MmioRegion, RegisterSpace};
pub use self::mem::{DmaAllocator, DmaRegion, PageFrame, PagePinner};
pub use self::timer::{sleep, sleep_until, SleepFuture, Timer};
pub use self::work::{WorkFn, WorkQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// No memory could be obtained for the request.
    NoMemory,
    /// User pages could not be pinned.
    PageLock,
    /// Invalid parameter.
    InvalidParam,
}

pub type HalResult<T = ()> = core::result::Result<T, HalError>;

/// Every platform service a PLX device needs.
pub trait Provider:
    InterruptControl + Timer + DmaAllocator + PagePinner + WorkQueue + Send + Sync
{
}

impl<T> Provider for T where
    T: InterruptControl + Timer + DmaAllocator + PagePinner + WorkQueue + Send + Sync
{
}
