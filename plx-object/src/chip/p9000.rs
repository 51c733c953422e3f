//! 9054, 9056, 9656 and 8311 PCI to local bus bridges.

use super::ident::identify_9000;
use super::{bit, field, flag, ChipKey, DmaOps, InterruptOps};
use crate::dev::dma::{DmaCommand, DmaParams, DmaProp, DmaStatus};
use crate::dev::intr::{IntrSet, IntrSource};
use crate::dev::regs::RegisterWindow;
use crate::dev::sgl::{SglFormat, SglRing};
use crate::{DriverConfig, PlxError, PlxResult};

const OUTPOST_STATUS: usize = 0x30;
const OUTPOST_MASK: usize = 0x34;
const DOORBELL: usize = 0x64;
const INT_CTRL_STAT: usize = 0x68;
const DMA_CMD_STAT: usize = 0xA8;
const FIFO_CTRL_STAT: usize = 0xE8;

const OUTPOST_INT: u32 = 1 << 3;
const FIFO_OUTBOUND_OVERFLOW_MASK: u32 = 1 << 6;

// INT_CTRL_STAT
const INT_OUTBOUND_OVERFLOW: u32 = 1 << 1;
const INT_PCI_MAIN: u32 = 1 << 8;
const INT_DOORBELL: u32 = 1 << 9;
const INT_PCI_ABORT: u32 = 1 << 10;
const INT_LOCAL: u32 = 1 << 11;
const INT_TARGET_RETRY_ABORT: u32 = 1 << 12;
const INT_DOORBELL_ACTIVE: u32 = 1 << 13;
const INT_PCI_ABORT_ACTIVE: u32 = 1 << 14;
const INT_LOCAL_ACTIVE: u32 = 1 << 15;

// DMA mode
const MODE_SGL: u32 = 1 << 9;
const MODE_DONE_INT: u32 = 1 << 10;
const MODE_CONST_LOCAL: u32 = 1 << 11;
const MODE_ROUTE_TO_PCI: u32 = 1 << 17;
const MODE_DUAL_ADDR: u32 = 1 << 18;
const MODE_VALID: u32 = 1 << 20;

// DMA command/status, per channel byte
const CMD_ENABLE: u32 = 1 << 0;
const CMD_START: u32 = 1 << 1;
const CMD_ABORT: u32 = 1 << 2;
const CMD_CLEAR_INT: u32 = 1 << 3;
const CMD_DONE: u32 = 1 << 4;

const PCI_ADDR: usize = 0x4;
const LOCAL_ADDR: usize = 0x8;
const COUNT: usize = 0xC;
const DESC_PTR: usize = 0x10;

/// Descriptors are in PCI space.
const DESC_IN_PCI: u32 = 1 << 0;

const fn mode_reg(ch: u8) -> usize {
    0x80 + ch as usize * 0x14
}

const fn dac_reg(ch: u8) -> usize {
    0xB4 + ch as usize * 4
}

const fn cmd_shift(ch: u8) -> u32 {
    ch as u32 * 8
}

/// (DMA done status bit, enable bit) of both channels.
const DMA_INT: [(u32, u32); 2] = [(21, 18), (22, 19)];

pub struct P9000;

impl P9000 {
    fn cmd(&self, regs: &RegisterWindow, ch: u8) -> u32 {
        regs.read(DMA_CMD_STAT) >> cmd_shift(ch)
    }

    /// The ISR acks DMA interrupts in the same register.
    fn set_cmd(&self, regs: &RegisterWindow, ch: u8, bits: u32, clear: u32) {
        regs.modify(DMA_CMD_STAT, bits << cmd_shift(ch), clear << cmd_shift(ch));
    }
}

impl InterruptOps for P9000 {
    fn prepare(&self, regs: &RegisterWindow, key: &mut ChipKey) -> PlxResult {
        regs.with_bar(|bar| identify_9000(key, bar))
            .ok_or(PlxError::INVALID_STATE)?;
        info!(
            "PLX {:04x} rev {:02x} detected from BAR",
            key.plx_chip, key.plx_revision
        );
        Ok(())
    }

    fn supported(&self) -> IntrSet {
        IntrSet::new(
            IntrSource::PCI_MAIN
                | IntrSource::PCI_ABORT
                | IntrSource::LOCAL_1
                | IntrSource::TARGET_RETRY_ABORT
                | IntrSource::OUTBOUND_POST
                | IntrSource::OUTBOUND_OVERFLOW
                | IntrSource::DMA_DONE
                | IntrSource::DMA_DONE.on_channel(1),
            !0,
        )
    }

    fn enable_all(&self, regs: &RegisterWindow) {
        regs.modify(INT_CTRL_STAT, INT_PCI_MAIN, 0);
    }

    fn disable_all(&self, regs: &RegisterWindow) {
        regs.modify(INT_CTRL_STAT, 0, INT_PCI_MAIN);
    }

    fn enable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let mut bits = int_ctrl_bits(set);
        for ch in 0..2 {
            if set.sources.contains(IntrSource::DMA_DONE.on_channel(ch)) {
                bits |= 1 << DMA_INT[ch as usize].1;
                regs.modify(mode_reg(ch), MODE_ROUTE_TO_PCI | MODE_DONE_INT, 0);
            }
        }
        if set.sources.contains(IntrSource::OUTBOUND_POST) {
            regs.write(OUTPOST_MASK, 0);
        }
        if set.sources.contains(IntrSource::OUTBOUND_OVERFLOW) {
            regs.modify(FIFO_CTRL_STAT, 0, FIFO_OUTBOUND_OVERFLOW_MASK);
        }
        if bits != 0 {
            regs.modify(INT_CTRL_STAT, bits, 0);
        }
    }

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let mut bits = int_ctrl_bits(set);
        for ch in 0..2 {
            if set.sources.contains(IntrSource::DMA_DONE.on_channel(ch)) {
                // only routed to PCI when the interrupt goes through INTA
                if regs.read(mode_reg(ch)) & MODE_ROUTE_TO_PCI != 0 {
                    bits |= 1 << DMA_INT[ch as usize].1;
                    regs.modify(mode_reg(ch), 0, MODE_DONE_INT);
                }
            }
        }
        if set.sources.contains(IntrSource::OUTBOUND_POST) {
            regs.write(OUTPOST_MASK, OUTPOST_INT);
        }
        if set.sources.contains(IntrSource::OUTBOUND_OVERFLOW) {
            regs.modify(FIFO_CTRL_STAT, FIFO_OUTBOUND_OVERFLOW_MASK, 0);
        }
        if bits != 0 {
            regs.modify(INT_CTRL_STAT, 0, bits);
        }
    }

    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool {
        let status = regs.read(INT_CTRL_STAT);
        if status & INT_PCI_MAIN == 0 || status == !0 {
            return false;
        }
        let mut mask = status;
        let mut found = IntrSet::default();

        if status & INT_DOORBELL_ACTIVE != 0 && status & INT_DOORBELL != 0 {
            let doorbell = regs.read(DOORBELL);
            regs.write(DOORBELL, doorbell);
            found.doorbell |= doorbell;
        }
        if status & INT_PCI_ABORT_ACTIVE != 0 && status & INT_PCI_ABORT != 0 {
            found.sources |= IntrSource::PCI_ABORT;
            mask &= !INT_PCI_ABORT;
        }
        // local input cannot be cleared here, only masked
        if status & INT_LOCAL_ACTIVE != 0 && status & INT_LOCAL != 0 {
            found.sources |= IntrSource::LOCAL_1;
            mask &= !INT_LOCAL;
        }
        for (ch, &(active, enable)) in DMA_INT.iter().enumerate() {
            if bit(status, active) && bit(status, enable) {
                let cmd = regs.read(DMA_CMD_STAT);
                regs.write(DMA_CMD_STAT, cmd | CMD_CLEAR_INT << cmd_shift(ch as u8));
                found.sources |= IntrSource::DMA_DONE.on_channel(ch as u8);
            }
        }
        let post = regs.read(OUTPOST_STATUS);
        let post_mask = regs.read(OUTPOST_MASK);
        if post & OUTPOST_INT != 0 && post_mask & OUTPOST_INT == 0 {
            found.sources |= IntrSource::OUTBOUND_POST;
            regs.write(OUTPOST_MASK, post_mask | OUTPOST_INT);
        }

        if mask != status {
            regs.write(INT_CTRL_STAT, mask);
        }
        if found.is_empty() {
            return false;
        }
        trace!("9000 interrupt {:?} doorbell {:#x}", found.sources, found.doorbell);
        pending.merge(found);
        true
    }
}

fn int_ctrl_bits(set: &IntrSet) -> u32 {
    let s = set.sources;
    flag(s.contains(IntrSource::PCI_MAIN), 8)
        | flag(s.contains(IntrSource::PCI_ABORT), 10)
        | flag(s.contains(IntrSource::TARGET_RETRY_ABORT), 12)
        | flag(s.contains(IntrSource::LOCAL_1), 11)
        | flag(set.doorbell != 0, 9)
        | flag(s.contains(IntrSource::OUTBOUND_OVERFLOW), 1)
}

impl DmaOps for P9000 {
    fn channels(&self) -> u8 {
        2
    }

    fn open(&self, regs: &RegisterWindow, ch: u8) {
        regs.modify(INT_CTRL_STAT, 1 << DMA_INT[ch as usize].1, 0);
    }

    fn status(&self, regs: &RegisterWindow, ch: u8) -> DmaStatus {
        let cmd = self.cmd(regs, ch);
        if cmd & (CMD_DONE | CMD_ENABLE) == 0 {
            DmaStatus::Paused
        } else if cmd & CMD_DONE != 0 {
            DmaStatus::Complete
        } else {
            DmaStatus::InProgress
        }
    }

    fn control(
        &self,
        regs: &RegisterWindow,
        ch: u8,
        cmd: DmaCommand,
        _config: &DriverConfig,
    ) -> PlxResult {
        match cmd {
            DmaCommand::Pause => {
                self.set_cmd(regs, ch, 0, CMD_ENABLE);
                if self.cmd(regs, ch) & CMD_DONE != 0 {
                    return Err(PlxError::COMPLETE);
                }
            }
            DmaCommand::Resume => {
                if self.cmd(regs, ch) & (CMD_DONE | CMD_ENABLE) != 0 {
                    return Err(PlxError::IN_PROGRESS);
                }
                self.set_cmd(regs, ch, CMD_ENABLE, 0);
            }
            DmaCommand::Abort => {
                self.set_cmd(regs, ch, 0, CMD_ENABLE);
                if self.cmd(regs, ch) & CMD_DONE != 0 {
                    return Err(PlxError::COMPLETE);
                }
                self.set_cmd(regs, ch, CMD_ABORT, 0);
            }
            DmaCommand::PauseImmediate => return Err(PlxError::UNSUPPORTED),
        }
        Ok(())
    }

    fn get_properties(&self, regs: &RegisterWindow, ch: u8) -> DmaProp {
        let mode = regs.read(mode_reg(ch));
        DmaProp {
            local_bus_width: field(mode, 0, 0x3),
            wait_states: field(mode, 2, 0xF),
            ready_input: bit(mode, 6),
            burst_infinite: bit(mode, 7),
            burst: bit(mode, 8),
            sgl_mode: bit(mode, 9),
            done_interrupt: bit(mode, 10),
            const_addr_local: bit(mode, 11),
            demand_mode: bit(mode, 12),
            write_invalid_mode: bit(mode, 13),
            enable_eot: bit(mode, 14),
            fast_terminate_mode: bit(mode, 15),
            clear_count_mode: bit(mode, 16),
            route_int_to_pci: bit(mode, 17),
            dual_address_mode: bit(mode, 18),
            eot_end_link: bit(mode, 19),
            valid_mode: bit(mode, 20),
            valid_stop_control: bit(mode, 21),
            ..Default::default()
        }
    }

    fn set_properties(&self, regs: &RegisterWindow, ch: u8, prop: &DmaProp) {
        let mode = (prop.local_bus_width as u32 & 0x3)
            | (prop.wait_states as u32 & 0xF) << 2
            | flag(prop.ready_input, 6)
            | flag(prop.burst_infinite, 7)
            | flag(prop.burst, 8)
            | flag(prop.sgl_mode, 9)
            | flag(prop.done_interrupt, 10)
            | flag(prop.const_addr_local, 11)
            | flag(prop.demand_mode, 12)
            | flag(prop.write_invalid_mode, 13)
            | flag(prop.enable_eot, 14)
            | flag(prop.fast_terminate_mode, 15)
            | flag(prop.clear_count_mode, 16)
            | flag(prop.route_int_to_pci, 17)
            | flag(prop.dual_address_mode, 18)
            | flag(prop.eot_end_link, 19)
            | flag(prop.valid_mode, 20)
            | flag(prop.valid_stop_control, 21);
        regs.write(mode_reg(ch), mode);
    }

    fn start_block(&self, regs: &RegisterWindow, ch: u8, params: &DmaParams) {
        let base = mode_reg(ch);
        let (done_set, done_clear) = if params.ignore_block_int {
            (0, MODE_DONE_INT)
        } else {
            (MODE_DONE_INT, 0)
        };
        regs.modify(
            base,
            MODE_ROUTE_TO_PCI | done_set,
            MODE_SGL | MODE_DUAL_ADDR | done_clear,
        );
        regs.write(base + PCI_ADDR, params.pci_addr as u32);
        regs.write(base + LOCAL_ADDR, params.local_addr);
        regs.write(base + COUNT, params.byte_count);
        regs.write(base + DESC_PTR, (params.direction as u32) << 3);
        regs.write(dac_reg(ch), (params.pci_addr >> 32) as u32);

        self.set_cmd(regs, ch, CMD_ENABLE, 0);
        self.set_cmd(regs, ch, CMD_ENABLE | CMD_START, 0);
    }

    fn sgl_format(&self) -> SglFormat {
        SglFormat::P9000
    }

    fn const_local(&self, regs: &RegisterWindow, ch: u8) -> bool {
        regs.read(mode_reg(ch)) & MODE_CONST_LOCAL != 0
    }

    fn start_sgl(&self, regs: &RegisterWindow, ch: u8, ring: &SglRing) {
        let base = mode_reg(ch);
        let (dual_set, dual_clear) = if ring.wide {
            (MODE_DUAL_ADDR, 0)
        } else {
            (0, MODE_DUAL_ADDR)
        };
        regs.modify(
            base,
            MODE_SGL | MODE_DONE_INT | MODE_ROUTE_TO_PCI | dual_set,
            MODE_VALID | dual_clear,
        );
        regs.write(dac_reg(ch), 0);
        regs.write(base + DESC_PTR, ring.bus as u32 | DESC_IN_PCI);

        self.set_cmd(regs, ch, CMD_ENABLE, 0);
        self.set_cmd(regs, ch, CMD_ENABLE | CMD_START, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{PlxFamily, Variant};
    use crate::dev::dma::DmaDirection;
    use crate::dev::regs::MockWindow;

    #[test]
    fn foreign_interrupt_is_ignored() {
        let w = MockWindow::new(0x100);
        w.bar.set(INT_CTRL_STAT, INT_DOORBELL | INT_DOORBELL_ACTIVE);
        let mut pending = IntrSet::default();
        assert!(!P9000.service(&w.regs, &mut pending));
        assert!(w.bar.writes().is_empty());
    }

    #[test]
    fn doorbell_and_local_input() {
        let w = MockWindow::new(0x100);
        w.bar.write_one_to_clear(DOORBELL, !0);
        w.bar.set(DOORBELL, 0x30);
        w.bar.set(
            INT_CTRL_STAT,
            INT_PCI_MAIN | INT_DOORBELL | INT_DOORBELL_ACTIVE | INT_LOCAL | INT_LOCAL_ACTIVE,
        );
        let mut pending = IntrSet::new(IntrSource::PCI_ABORT, 0x1);
        assert!(P9000.service(&w.regs, &mut pending));
        assert_eq!(pending.doorbell, 0x31);
        assert!(pending.sources.contains(IntrSource::PCI_ABORT | IntrSource::LOCAL_1));
        assert_eq!(w.bar.get(DOORBELL), 0);
        assert_eq!(w.bar.get(INT_CTRL_STAT) & INT_LOCAL, 0);
    }

    #[test]
    fn dma_done_is_acked_per_channel() {
        let w = MockWindow::new(0x100);
        w.bar.set(INT_CTRL_STAT, INT_PCI_MAIN | (1 << 22) | (1 << 19));
        w.bar.set(OUTPOST_MASK, OUTPOST_INT);
        let mut pending = IntrSet::default();
        assert!(P9000.service(&w.regs, &mut pending));
        assert_eq!(pending.sources, IntrSource::DMA_DONE.on_channel(1));
        assert_eq!(w.bar.writes_to(DMA_CMD_STAT), vec![CMD_CLEAR_INT << 8]);
    }

    #[test]
    fn dma_done_enable_routes_to_pci() {
        let w = MockWindow::new(0x100);
        P9000.enable(
            &w.regs,
            &IntrSet::new(IntrSource::DMA_DONE | IntrSource::OUTBOUND_POST, 0x4),
        );
        assert_eq!(w.bar.get(INT_CTRL_STAT), (1 << 18) | INT_DOORBELL);
        assert_eq!(w.bar.get(mode_reg(0)), MODE_ROUTE_TO_PCI | MODE_DONE_INT);
        assert_eq!(w.bar.writes_to(OUTPOST_MASK), vec![0]);

        P9000.disable(&w.regs, &IntrSet::new(IntrSource::DMA_DONE, 0));
        assert_eq!(w.bar.get(INT_CTRL_STAT), INT_DOORBELL);
        assert_eq!(w.bar.get(mode_reg(0)), MODE_ROUTE_TO_PCI);
    }

    #[test]
    fn command_writes_are_synchronized() {
        let w = MockWindow::new(0x100);
        w.bar.set(DMA_CMD_STAT, CMD_DONE << 8);
        P9000.start_sgl(
            &w.regs,
            0,
            &SglRing {
                bus: 0x1000,
                count: 1,
                wide: false,
            },
        );
        // one ISR lock round per read-modify-write: mode plus two commands
        assert_eq!(w.hal.intr_off_count(), 3);
        assert_eq!(w.bar.get(DMA_CMD_STAT), (CMD_DONE << 8) | CMD_ENABLE | CMD_START);
    }

    #[test]
    fn status_and_control() {
        let w = MockWindow::new(0x100);
        assert_eq!(P9000.status(&w.regs, 1), DmaStatus::Paused);
        w.bar.set(DMA_CMD_STAT, CMD_DONE << 8);
        assert_eq!(P9000.status(&w.regs, 1), DmaStatus::Complete);
        let config = DriverConfig::default();
        assert_eq!(
            P9000.control(&w.regs, 1, DmaCommand::Abort, &config),
            Err(PlxError::COMPLETE)
        );
        assert_eq!(
            P9000.control(&w.regs, 1, DmaCommand::Resume, &config),
            Err(PlxError::IN_PROGRESS)
        );
        assert_eq!(
            P9000.control(&w.regs, 0, DmaCommand::PauseImmediate, &config),
            Err(PlxError::UNSUPPORTED)
        );

        w.bar.set(DMA_CMD_STAT, CMD_ENABLE);
        assert_eq!(P9000.status(&w.regs, 0), DmaStatus::InProgress);
        P9000.control(&w.regs, 0, DmaCommand::Abort, &config).unwrap();
        assert_eq!(w.bar.get(DMA_CMD_STAT), CMD_ABORT);
    }

    #[test]
    fn block_programming() {
        let w = MockWindow::new(0x100);
        w.bar.set(mode_reg(1), MODE_SGL | MODE_DUAL_ADDR | 0x3);
        let params = DmaParams {
            pci_addr: 0x2_0000_1000,
            local_addr: 0x40,
            byte_count: 0x800,
            direction: DmaDirection::LocalToPci,
            ..Default::default()
        };
        P9000.start_block(&w.regs, 1, &params);
        let base = mode_reg(1);
        assert_eq!(w.bar.get(base), MODE_ROUTE_TO_PCI | MODE_DONE_INT | 0x3);
        assert_eq!(w.bar.get(base + PCI_ADDR), 0x1000);
        assert_eq!(w.bar.get(base + LOCAL_ADDR), 0x40);
        assert_eq!(w.bar.get(base + COUNT), 0x800);
        assert_eq!(w.bar.get(base + DESC_PTR), 1 << 3);
        assert_eq!(w.bar.get(dac_reg(1)), 0x2);
        assert_eq!(
            w.bar.writes_to(DMA_CMD_STAT),
            vec![CMD_ENABLE << 8, (CMD_ENABLE | CMD_START) << 8]
        );
    }

    #[test]
    fn sgl_programming() {
        let w = MockWindow::new(0x100);
        w.bar.set(mode_reg(0), MODE_VALID | MODE_CONST_LOCAL);
        assert!(P9000.const_local(&w.regs, 0));
        let ring = SglRing {
            bus: 0x8000_0010,
            count: 3,
            wide: true,
        };
        P9000.start_sgl(&w.regs, 0, &ring);
        assert_eq!(
            w.bar.get(mode_reg(0)),
            MODE_CONST_LOCAL | MODE_SGL | MODE_DONE_INT | MODE_ROUTE_TO_PCI | MODE_DUAL_ADDR
        );
        assert_eq!(w.bar.get(mode_reg(0) + DESC_PTR), 0x8000_0011);
    }

    #[test]
    fn identification_from_bar() {
        let w = MockWindow::new(0x100);
        w.bar.set(0x70, 0x9056_10B5);
        w.bar.set(0x74, 0xAC);
        let mut key = ChipKey::new(Variant::Plx9000, 0x10B5, 0x1234, 0xAA);
        P9000.prepare(&w.regs, &mut key).unwrap();
        assert_eq!((key.plx_chip, key.plx_revision), (0x9056, 0xAC));
        assert_eq!(key.plx_family, PlxFamily::BridgeP2L);
    }
}
