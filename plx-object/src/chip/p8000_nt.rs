//! NT ports of 8000 series switches.
//!
//! The port registers live at a family dependent base inside BAR 0, and
//! whether the device is the virtual or the link side of the bridge has to
//! be worked out before any of them can be touched.

use super::{ChipKey, InterruptOps, NtPort, PlxFamily};
use crate::dev::intr::{IntrSet, IntrSource};
use crate::dev::regs::RegisterWindow;
use crate::{PlxError, PlxResult};
use spin::Mutex;

/// Base of the NT registers on chips with a single NT port.
const BASE_DEFAULT: usize = 0x10000;
const BASE_NT0: usize = 0x3E000;
const BASE_NT1: usize = 0x3C000;
/// Link side registers follow the virtual side.
const LINK_OFFSET: usize = 0x1000;

/// Config register telling which NT port this is and its side.
const NT_PORT_SELECT: usize = 0xC8C;
/// Interrupt line register, written to find the port side.
const INTR_LINE: usize = 0x3C;

const LE_STATUS: usize = 0xFE0;
const LE_MASK: usize = 0xFE4;
const LE_ALL: u32 = 0xF;
const DOORBELL_ALL: u32 = 0xFFFF;

const LE_SOURCES: [IntrSource; 4] = [
    IntrSource::LE_CORRECTABLE,
    IntrSource::LE_UNCORRECTABLE,
    IntrSource::LE_LINK_STATE_CHANGE,
    IntrSource::LE_UNCORR_ERR_MSG,
];

/// Register offsets of one port, known once the port side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NtLayout {
    /// Doorbell IRQ set register; clear, mask set and mask clear follow.
    doorbell: usize,
    /// Link error registers, only reachable from the virtual side of
    /// 86xx and later chips.
    link_error: Option<(usize, usize)>,
}

impl NtLayout {
    fn db_status(&self) -> usize {
        self.doorbell
    }

    fn db_clear(&self) -> usize {
        self.doorbell + 0x4
    }

    fn db_mask_set(&self) -> usize {
        self.doorbell + 0x8
    }

    fn db_mask_clear(&self) -> usize {
        self.doorbell + 0xC
    }
}

pub struct P8000Nt {
    layout: Mutex<Option<NtLayout>>,
}

impl P8000Nt {
    pub fn new() -> Self {
        P8000Nt {
            layout: Mutex::new(None),
        }
    }

    fn layout(&self) -> Option<NtLayout> {
        *self.layout.lock()
    }
}

/// Find the register base of the port and fix `key.nt_port`.
fn port_base(regs: &RegisterWindow, key: &mut ChipKey) -> PlxResult<usize> {
    if regs.bar_size() == 0 {
        key.nt_port = NtPort::Virtual;
        return Ok(BASE_DEFAULT);
    }
    key.nt_port = NtPort::Unknown;
    let mut base = match key.plx_family {
        PlxFamily::Scout | PlxFamily::Draco2 | PlxFamily::Capella1 => {
            let select = regs.config_read(NT_PORT_SELECT);
            key.nt_port = if select & (1 << 31) != 0 {
                NtPort::Link
            } else {
                NtPort::Virtual
            };
            if select & 1 != 0 {
                BASE_NT1
            } else {
                BASE_NT0
            }
        }
        PlxFamily::Draco1 | PlxFamily::Cygnus => BASE_NT0,
        _ if matches!(key.plx_chip & 0xFF00, 0x8500 | 0x8600) => BASE_DEFAULT,
        _ => {
            error!("NT port detection not implemented for {:04x}", key.plx_chip);
            return Err(PlxError::UNSUPPORTED);
        }
    };
    if key.nt_port == NtPort::Unknown {
        // a write to 3Ch through the BAR shows up in our own config space
        // only on the virtual side
        let save = regs.read(base + INTR_LINE);
        let expected = (save & !0xFF) | 0xFE;
        regs.write(base + INTR_LINE, expected);
        regs.read(base + INTR_LINE);
        regs.read(base + INTR_LINE);
        let seen = regs.config_read(INTR_LINE);
        regs.write(base + INTR_LINE, save);
        key.nt_port = if seen == expected {
            NtPort::Virtual
        } else {
            NtPort::Link
        };
    }
    if key.nt_port == NtPort::Link {
        base += LINK_OFFSET;
    }
    info!("NT port is {:?} side, base {:#x}", key.nt_port, base);
    Ok(base)
}

impl InterruptOps for P8000Nt {
    fn prepare(&self, regs: &RegisterWindow, key: &mut ChipKey) -> PlxResult {
        if !regs.is_mapped() {
            return Err(PlxError::INVALID_STATE);
        }
        let base = port_base(regs, key)?;
        let doorbell = match key.plx_chip & 0xFF00 {
            0x8500 => base + 0x90,
            0x8600 | 0x8700 => base + 0xC4C,
            _ => {
                error!(
                    "unable to locate doorbell registers of {:04x}",
                    key.plx_chip
                );
                return Err(PlxError::UNSUPPORTED);
            }
        };
        let doorbell = match key.nt_port {
            NtPort::Link => doorbell + 0x10,
            _ => doorbell,
        };
        let link_error = if !key.is_85xx() && key.nt_port == NtPort::Virtual {
            Some((base + LE_STATUS, base + LE_MASK))
        } else {
            None
        };
        *self.layout.lock() = Some(NtLayout {
            doorbell,
            link_error,
        });
        Ok(())
    }

    fn supported(&self) -> IntrSet {
        let le = match self.layout() {
            Some(NtLayout {
                link_error: Some(_),
                ..
            }) => LE_SOURCES
                .iter()
                .fold(IntrSource::empty(), |acc, &s| acc | s),
            _ => IntrSource::empty(),
        };
        IntrSet::new(le, DOORBELL_ALL)
    }

    fn enable_all(&self, regs: &RegisterWindow) {
        if let Some(layout) = self.layout() {
            if let Some((_, mask)) = layout.link_error {
                regs.write(mask, 0);
            }
            regs.write(layout.db_mask_clear(), DOORBELL_ALL);
        }
    }

    fn disable_all(&self, regs: &RegisterWindow) {
        if let Some(layout) = self.layout() {
            if let Some((_, mask)) = layout.link_error {
                regs.write(mask, LE_ALL);
            }
            regs.write(layout.db_mask_set(), DOORBELL_ALL);
        }
    }

    fn enable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let layout = match self.layout() {
            Some(layout) => layout,
            None => return,
        };
        if let Some((_, mask)) = layout.link_error {
            let bits = le_bits(set.sources);
            if bits != 0 {
                regs.modify(mask, 0, bits);
            }
        }
        // mask set and clear registers only act on the bits written as one
        let doorbell = set.doorbell & DOORBELL_ALL;
        if doorbell != 0 {
            regs.write(layout.db_mask_clear(), doorbell);
        }
    }

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let layout = match self.layout() {
            Some(layout) => layout,
            None => return,
        };
        if let Some((_, mask)) = layout.link_error {
            let bits = le_bits(set.sources);
            if bits != 0 {
                regs.modify(mask, bits, 0);
            }
        }
        let doorbell = set.doorbell & DOORBELL_ALL;
        if doorbell != 0 {
            regs.write(layout.db_mask_set(), doorbell);
        }
    }

    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool {
        let layout = match self.layout() {
            Some(layout) => layout,
            None => return false,
        };
        let db_mask = regs.read(layout.db_mask_set());
        let db_status = regs.read(layout.db_status());
        let doorbell = if db_mask == !0 || db_status == !0 {
            0
        } else {
            !db_mask & db_status & DOORBELL_ALL
        };

        // link errors are only looked at when no doorbell fired
        let mut le = 0;
        if doorbell == 0 {
            if let Some((status, mask)) = layout.link_error {
                let le_mask = regs.read(mask);
                let le_status = regs.read(status);
                if le_mask != !0 && le_status != !0 {
                    le = !le_mask & le_status & LE_ALL;
                }
            }
        }
        if doorbell == 0 && le == 0 {
            return false;
        }

        if doorbell != 0 {
            pending.doorbell |= doorbell;
            regs.write(layout.db_clear(), doorbell);
        }
        if le != 0 {
            for (n, &source) in LE_SOURCES.iter().enumerate() {
                if le & (1 << n) != 0 {
                    pending.sources |= source;
                }
            }
            if let Some((status, _)) = layout.link_error {
                regs.write(status, le);
            }
        }
        true
    }
}

fn le_bits(sources: IntrSource) -> u32 {
    LE_SOURCES
        .iter()
        .enumerate()
        .filter(|(_, s)| sources.contains(**s))
        .fold(0, |acc, (n, _)| acc | 1 << n)
}
