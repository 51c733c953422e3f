//! Chip identification and the per-family capability sets.
//!
//! Every operation that depends on the silicon goes through
//! [`InterruptOps`] or [`DmaOps`]. One implementation exists per family and
//! is selected once, when the device is created.

use crate::dev::dma::{DmaCommand, DmaParams, DmaProp, DmaStatus};
use crate::dev::intr::IntrSet;
use crate::dev::regs::RegisterWindow;
use crate::dev::sgl::{SglFormat, SglRing};
use crate::{DriverConfig, PlxResult};
use alloc::sync::Arc;
use numeric_enum_macro::numeric_enum;

mod ident;
mod p6000_nt;
mod p8000_dma;
mod p8000_nt;
mod p9000;
mod p9050;

pub use self::ident::detect;

/// PCI vendor ID of PLX Technology.
pub const PLX_VENDOR_ID: u16 = 0x10B5;

numeric_enum! {
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PlxFamily {
        None = 0,
        Unknown = 1,
        BridgeP2L = 2,
        BridgePciP2P = 3,
        Altair = 4,
        AltairXl = 5,
        Vega = 6,
        VegaLite = 7,
        Deneb = 8,
        Sirius = 9,
        Cygnus = 10,
        Scout = 11,
        Draco1 = 12,
        Draco2 = 13,
        Capella1 = 14,
        Capella2 = 15,
    }
}

/// Which driver personality a device was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// 9054, 9056, 9656 and 8311 PCI to local bus bridges.
    Plx9000,
    /// 9050 and 9052 bridges, interrupts only.
    Plx9050,
    /// 9030 bridge, interrupts only.
    Plx9030,
    /// DMA function of 8000 series switches.
    Plx8000Dma,
    /// NT port of 8000 series switches.
    Plx8000Nt,
    /// 6254 and 6540 NT bridges.
    Plx6000Nt,
}

/// Side of a non-transparent port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtPort {
    None,
    Unknown,
    Virtual,
    Link,
}

/// Identification of one device.
///
/// The PCI fields are filled in by the bus glue. The `plx_*` fields and
/// `nt_port` are the result of detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipKey {
    pub variant: Variant,
    pub vendor_id: u16,
    pub device_id: u16,
    pub sub_vendor_id: u16,
    pub sub_device_id: u16,
    pub revision: u8,
    pub plx_chip: u16,
    pub plx_revision: u8,
    pub plx_family: PlxFamily,
    pub nt_port: NtPort,
}

impl ChipKey {
    pub fn new(variant: Variant, vendor_id: u16, device_id: u16, revision: u8) -> Self {
        ChipKey {
            variant,
            vendor_id,
            device_id,
            sub_vendor_id: 0,
            sub_device_id: 0,
            revision,
            plx_chip: 0,
            plx_revision: revision,
            plx_family: PlxFamily::None,
            nt_port: NtPort::None,
        }
    }

    /// Whether the chip belongs to the 85xx generation.
    pub(crate) fn is_85xx(&self) -> bool {
        self.plx_chip & 0xFF00 == 0x8500
    }
}

/// Interrupt capabilities of a chip family.
pub trait InterruptOps: Send + Sync {
    /// Finish identification once the register window is mapped.
    fn prepare(&self, _regs: &RegisterWindow, _key: &mut ChipKey) -> PlxResult {
        Ok(())
    }

    /// Every source the family can report.
    fn supported(&self) -> IntrSet;

    /// Globally enable chip interrupts.
    fn enable_all(&self, regs: &RegisterWindow);

    fn disable_all(&self, regs: &RegisterWindow);

    /// Enable the sources in `set`, already masked to [`Self::supported`].
    fn enable(&self, regs: &RegisterWindow, set: &IntrSet);

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet);

    /// The interrupt service body.
    ///
    /// Called with the ISR lock held, so it must use the raw accessors of
    /// `regs` only. Active sources are acknowledged and ORed into
    /// `pending`. Returns whether anything was active.
    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool;

    /// Called by the deferred handler with the sources it took, before the
    /// waiters are signaled.
    fn complete(&self, _regs: &RegisterWindow, _active: &IntrSet) {}
}

/// DMA engine capabilities of a chip family.
pub trait DmaOps: Send + Sync {
    fn channels(&self) -> u8;

    /// Whether strapping leaves the channel usable.
    fn channel_enabled(&self, _regs: &RegisterWindow, _ch: u8) -> bool {
        true
    }

    /// Unmask the completion and error interrupts of an opened channel.
    fn open(&self, regs: &RegisterWindow, ch: u8);

    fn status(&self, regs: &RegisterWindow, ch: u8) -> DmaStatus;

    fn control(
        &self,
        regs: &RegisterWindow,
        ch: u8,
        cmd: DmaCommand,
        config: &DriverConfig,
    ) -> PlxResult;

    fn get_properties(&self, regs: &RegisterWindow, ch: u8) -> DmaProp;

    fn set_properties(&self, regs: &RegisterWindow, ch: u8, prop: &DmaProp);

    /// Program and start a block transfer.
    fn start_block(&self, regs: &RegisterWindow, ch: u8, params: &DmaParams);

    fn sgl_format(&self) -> SglFormat;

    /// Whether the channel keeps the local address constant.
    fn const_local(&self, _regs: &RegisterWindow, _ch: u8) -> bool {
        false
    }

    /// Point the channel at a built descriptor ring and start it.
    fn start_sgl(&self, regs: &RegisterWindow, ch: u8, ring: &SglRing);
}

/// The capability set of one device.
#[derive(Clone)]
pub struct Capabilities {
    pub intr: Arc<dyn InterruptOps>,
    pub dma: Option<Arc<dyn DmaOps>>,
}

fn bit(value: u32, n: u32) -> bool {
    value >> n & 1 != 0
}

fn field(value: u32, shift: u32, mask: u32) -> u8 {
    (value >> shift & mask) as u8
}

fn flag(on: bool, n: u32) -> u32 {
    (on as u32) << n
}

/// Pick the capability set for a detected key.
pub fn select(key: &ChipKey) -> Capabilities {
    match key.variant {
        Variant::Plx9000 => {
            let ops = Arc::new(p9000::P9000);
            Capabilities {
                intr: ops.clone(),
                dma: Some(ops),
            }
        }
        Variant::Plx9050 | Variant::Plx9030 => Capabilities {
            intr: Arc::new(p9050::P9050),
            dma: None,
        },
        Variant::Plx8000Dma => {
            let ops = Arc::new(p8000_dma::P8000Dma::new(key.plx_family));
            Capabilities {
                intr: ops.clone(),
                dma: Some(ops),
            }
        }
        Variant::Plx8000Nt => Capabilities {
            intr: Arc::new(p8000_nt::P8000Nt::new()),
            dma: None,
        },
        Variant::Plx6000Nt => Capabilities {
            intr: Arc::new(p6000_nt::P6000Nt),
            dma: None,
        },
    }
}
