//! 6254 and 6540 NT bridges. Every interrupt register is in config space.

use super::InterruptOps;
use crate::dev::intr::{IntrSet, IntrSource};
use crate::dev::regs::RegisterWindow;

/// Doorbell enable in the low half, doorbell hold-off in the high half.
const DOORBELL_ENABLE: usize = 0xC4;
/// Enables of the other sources in the top byte.
const INT_ENABLE: usize = 0xC8;
/// Doorbell status in the low half, other sources in bits 23:16.
const INT_STATUS: usize = 0xCC;

const DOORBELL_ALL: u32 = 0xFFFF;

/// Sources of the top byte of [`INT_ENABLE`], bit 0 first.
const SOURCES: [IntrSource; 8] = [
    IntrSource::MESSAGE_0,
    IntrSource::MESSAGE_1,
    IntrSource::MESSAGE_2,
    IntrSource::MESSAGE_3,
    IntrSource::RSTIN,
    IntrSource::PME,
    IntrSource::GPIO_14_15,
    IntrSource::GPIO_4_5,
];

/// GPIO interrupts can't be cleared at the source and are masked instead.
const GPIO_MASK: u32 = 0xC0;

pub struct P6000Nt;

fn enable_bits(sources: IntrSource) -> u32 {
    SOURCES
        .iter()
        .enumerate()
        .filter(|(_, s)| sources.contains(**s))
        .fold(0, |acc, (n, _)| acc | 1 << (24 + n))
}

impl InterruptOps for P6000Nt {
    fn supported(&self) -> IntrSet {
        let sources = SOURCES
            .iter()
            .fold(IntrSource::empty(), |acc, &s| acc | s);
        IntrSet::new(sources, DOORBELL_ALL)
    }

    fn enable_all(&self, regs: &RegisterWindow) {
        regs.config_modify(DOORBELL_ENABLE, DOORBELL_ALL, 0);
        regs.config_write(INT_ENABLE, 0xFF00_0000);
    }

    fn disable_all(&self, regs: &RegisterWindow) {
        regs.config_modify(DOORBELL_ENABLE, 0, DOORBELL_ALL);
        regs.config_write(INT_ENABLE, 0);
    }

    fn enable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let doorbell = set.doorbell & DOORBELL_ALL;
        if doorbell != 0 {
            regs.config_modify(DOORBELL_ENABLE, doorbell, 0);
        }
        let bits = enable_bits(set.sources);
        if bits != 0 {
            regs.config_modify(INT_ENABLE, bits, 0);
        }
    }

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let doorbell = set.doorbell & DOORBELL_ALL;
        if doorbell != 0 {
            regs.config_modify(DOORBELL_ENABLE, 0, doorbell);
        }
        let bits = enable_bits(set.sources);
        if bits != 0 {
            regs.config_modify(INT_ENABLE, 0, bits);
        }
    }

    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool {
        let db_enable = regs.config_read(DOORBELL_ENABLE);
        let mut int_enable = regs.config_read(INT_ENABLE);
        let status = regs.config_read(INT_STATUS);
        let mut ours = false;

        let doorbell = db_enable & status & DOORBELL_ALL;
        // doorbells still held off by the upper half are left alone
        if doorbell != 0 && (db_enable >> 16) & doorbell == 0 {
            regs.config_write(INT_STATUS, (status & 0xFF00_0000) | doorbell);
            pending.doorbell |= doorbell;
            ours = true;
        }

        let active = (int_enable >> 24) & (status >> 16) & 0xFF;
        if active != 0 {
            for (n, &source) in SOURCES.iter().enumerate() {
                if active & (1 << n) != 0 {
                    pending.sources |= source;
                }
            }
            if active & GPIO_MASK != 0 {
                int_enable &= !((active & GPIO_MASK) << 24);
                regs.config_write(INT_ENABLE, int_enable & 0xFF00_0000);
            }
            regs.config_write(INT_STATUS, (status & 0x00FF_0000) | active << 16);
            ours = true;
        }
        ours
    }
}
