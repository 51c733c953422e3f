//! DMA function of 8000 series switches.

use super::{bit, field, flag, DmaOps, InterruptOps, PlxFamily};
use crate::dev::dma::{DescriptorMode, DmaCommand, DmaParams, DmaProp, DmaStatus};
use crate::dev::intr::{IntrSet, IntrSource};
use crate::dev::regs::RegisterWindow;
use crate::dev::sgl::{SglFormat, SglRing};
use crate::{DriverConfig, PlxResult};

const CHANNELS: u8 = 4;

/// Channel strapping of SIRIUS parts.
const STRAP: usize = 0x1FC;
/// SIRIUS global control bit that holds off descriptor mode.
const STRAP_DESCR_HOLD: u32 = 1 << 2;

const SRC_LO: usize = 0x00;
const SRC_HI: usize = 0x04;
const DST_LO: usize = 0x08;
const DST_HI: usize = 0x0C;
const XFER: usize = 0x10;
const RING_LO: usize = 0x14;
const RING_HI: usize = 0x18;
const RING_NEXT: usize = 0x1C;
const RING_COUNT: usize = 0x20;
const RING_LAST: usize = 0x28;
const CTRL2: usize = 0x2C;
const PREFETCH: usize = 0x34;
const CTRL: usize = 0x38;
const INTR: usize = 0x3C;
const READ_REQ: usize = 0x54;

// control and status register
const CTRL_PAUSE: u32 = 1 << 0;
const CTRL_ABORT: u32 = 1 << 1;
const CTRL_CPL_WRITEBACK: u32 = 1 << 2;
const CTRL_START: u32 = 1 << 3;
const CTRL_PAUSE_DONE: u32 = 1 << 9;
const CTRL_ABORT_DONE: u32 = 1 << 10;
const CTRL_IMMED_PAUSE_DONE: u32 = 1 << 12;
/// Status bits [12:8] are write-one-to-clear.
const CTRL_STATUS: u32 = 0x1F << 8;
const CTRL_IN_PROGRESS: u32 = 1 << 30;
const CTRL_HEADER_LOGGING: u32 = 1 << 31;

/// Second control register: blocks new read requests.
const CTRL2_HOLD_READS: u32 = 1 << 16;

/// Interrupt enable bits in [5:0], status bits in [21:16].
const INTR_ENABLE_ALL: u32 = (1 << 5) | (1 << 4) | (1 << 3) | (1 << 1) | (1 << 0);
/// Write-one-to-clear, so never written back by a read-modify-write.
const INTR_STATUS: u32 = 0x3F << 16;
const INTR_DESCR_DONE: u32 = 1 << 18;

/// Sources that have an (enable bit, status bit) pair.
const ENABLED_EVENTS: [(IntrSource, u32, u32); 5] = [
    (IntrSource::DMA_ERROR, 0, 16),
    (IntrSource::DMA_INVALID_DESCR, 1, 17),
    (IntrSource::DMA_ABORT_DONE, 3, 19),
    (IntrSource::DMA_PAUSE_DONE, 4, 20),
    (IntrSource::DMA_IMMED_STOP_DONE, 5, 21),
];

const fn chan(ch: u8) -> usize {
    0x200 + ch as usize * 0x100
}

/// DMA engine of the PEX 86xx/87xx DMA function.
pub struct P8000Dma {
    family: PlxFamily,
}

impl P8000Dma {
    pub fn new(family: PlxFamily) -> Self {
        P8000Dma { family }
    }

    fn sirius(&self) -> bool {
        self.family == PlxFamily::Sirius
    }

    fn clear_status(value: u32) -> u32 {
        value & !(CTRL_HEADER_LOGGING | CTRL_STATUS)
    }
}

impl InterruptOps for P8000Dma {
    fn supported(&self) -> IntrSet {
        let mut sources = IntrSource::empty();
        for ch in 0..CHANNELS {
            sources |= IntrSource::DMA_ALL.of_channel(0).on_channel(ch);
        }
        IntrSet::new(sources, 0)
    }

    fn enable_all(&self, regs: &RegisterWindow) {
        for ch in 0..CHANNELS {
            regs.modify(chan(ch) + INTR, INTR_ENABLE_ALL, INTR_STATUS);
        }
    }

    fn disable_all(&self, regs: &RegisterWindow) {
        for ch in 0..CHANNELS {
            regs.modify(chan(ch) + INTR, 0, INTR_ENABLE_ALL | INTR_STATUS);
        }
    }

    fn enable(&self, regs: &RegisterWindow, set: &IntrSet) {
        for ch in 0..CHANNELS {
            let bits = enable_bits(set.sources.of_channel(ch));
            if bits != 0 {
                regs.modify(chan(ch) + INTR, bits, INTR_STATUS);
            }
        }
    }

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet) {
        for ch in 0..CHANNELS {
            let bits = enable_bits(set.sources.of_channel(ch));
            if bits != 0 {
                regs.modify(chan(ch) + INTR, 0, bits | INTR_STATUS);
            }
        }
    }

    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool {
        let mut active = false;
        for ch in 0..CHANNELS {
            let offset = chan(ch) + INTR;
            let mut status = regs.read(offset);
            let mut events = IntrSource::empty();
            for &(event, enable, stat) in ENABLED_EVENTS.iter() {
                if bit(status, stat) && bit(status, enable) {
                    events |= event;
                } else {
                    // write zero so an inactive status is left alone
                    status &= !(1 << stat);
                }
            }
            if status & INTR_DESCR_DONE != 0 {
                events |= IntrSource::DMA_DONE;
            }
            if !events.is_empty() {
                trace!("dma ch{} interrupt {:?}", ch, events);
                regs.write(offset, status);
                pending.sources |= events.on_channel(ch);
                active = true;
            }
        }
        active
    }
}

fn enable_bits(events: IntrSource) -> u32 {
    ENABLED_EVENTS
        .iter()
        .filter(|(event, _, _)| events.contains(*event))
        .fold(0, |bits, (_, enable, _)| bits | 1 << enable)
}

impl DmaOps for P8000Dma {
    fn channels(&self) -> u8 {
        CHANNELS
    }

    fn channel_enabled(&self, regs: &RegisterWindow, ch: u8) -> bool {
        if !self.sirius() {
            return true;
        }
        match regs.read(STRAP) & 0x3 {
            1 => ch == 0,
            2 => ch == 0 || ch == 2,
            3 => ch != 3,
            _ => true,
        }
    }

    fn open(&self, regs: &RegisterWindow, ch: u8) {
        regs.modify(chan(ch) + INTR, INTR_ENABLE_ALL, INTR_STATUS);
    }

    fn status(&self, regs: &RegisterWindow, ch: u8) -> DmaStatus {
        let value = regs.read(chan(ch) + CTRL);
        if value & CTRL_IN_PROGRESS == 0 {
            DmaStatus::Complete
        } else if value & CTRL_PAUSE != 0 {
            DmaStatus::Paused
        } else {
            DmaStatus::InProgress
        }
    }

    fn control(
        &self,
        regs: &RegisterWindow,
        ch: u8,
        cmd: DmaCommand,
        config: &DriverConfig,
    ) -> PlxResult {
        let ctrl = chan(ch) + CTRL;
        let ctrl2 = chan(ch) + CTRL2;
        let value = Self::clear_status(regs.read(ctrl));
        debug!("dma ch{} {:?}", ch, cmd);
        match cmd {
            DmaCommand::Pause => {
                if value & CTRL_PAUSE != 0 {
                    return Ok(());
                }
                regs.write(ctrl, value | CTRL_PAUSE_DONE | CTRL_PAUSE);
                let value = regs.poll_set(ctrl, CTRL_PAUSE_DONE, config)?;
                regs.write(ctrl, Self::clear_status(value) | CTRL_PAUSE_DONE);
            }
            DmaCommand::PauseImmediate => {
                regs.write(ctrl, value | CTRL_IMMED_PAUSE_DONE);
                let hold = regs.read(ctrl2);
                if hold & CTRL2_HOLD_READS != 0 {
                    return Ok(());
                }
                regs.write(ctrl2, hold | CTRL2_HOLD_READS);
                let value = regs.poll_set(ctrl, CTRL_IMMED_PAUSE_DONE, config)?;
                regs.write(ctrl, Self::clear_status(value) | CTRL_IMMED_PAUSE_DONE);
            }
            DmaCommand::Resume => {
                regs.write(ctrl, (value | CTRL_PAUSE_DONE) & !CTRL_PAUSE);
                let hold = regs.read(ctrl2);
                if hold & CTRL2_HOLD_READS != 0 {
                    regs.write(ctrl2, hold & !CTRL2_HOLD_READS);
                }
            }
            DmaCommand::Abort => {
                regs.write(ctrl, value | CTRL_ABORT_DONE | CTRL_ABORT);
                let value = regs.poll_set(ctrl, CTRL_ABORT_DONE, config)?;
                regs.write(
                    ctrl,
                    (Self::clear_status(value) | CTRL_ABORT_DONE) & !CTRL_ABORT,
                );
            }
        }
        Ok(())
    }

    fn get_properties(&self, regs: &RegisterWindow, ch: u8) -> DmaProp {
        let base = chan(ch);
        let mut prop = DmaProp::default();

        let value = regs.read(base + CTRL2);
        prop.read_req_delay_clocks = value as u16;
        if !self.sirius() {
            prop.max_dest_write_size = field(value, 24, 0x7);
        }

        prop.max_descriptor_fetch = field(regs.read(base + PREFETCH), 0, 0xFF);

        let value = regs.read(base + CTRL);
        prop.cpl_status_write_back = bit(value, 2);
        prop.ring_wrap_delay_time = field(value, 13, 0x7);
        prop.max_src_xfer_size = field(value, 16, 0x7);
        prop.traffic_class = field(value, 19, 0x7);
        prop.rel_order_descr_read = bit(value, 22);
        prop.rel_order_data_read_req = bit(value, 23);
        prop.rel_order_descr_write = bit(value, 24);
        prop.rel_order_data_write = bit(value, 25);
        prop.no_snoop_descr_read = bit(value, 26);
        prop.no_snoop_data_read_req = bit(value, 27);
        prop.no_snoop_descr_write = bit(value, 28);
        prop.no_snoop_data_write = bit(value, 29);
        if self.sirius() {
            prop.descriptor_mode = if bit(value, 4) {
                DescriptorMode::Sgl
            } else {
                DescriptorMode::Block
            };
            prop.ring_halt_at_end = bit(value, 5);
        } else {
            prop.ring_halt_at_end = bit(value, 4);
            // hardware encodes on-chip descriptors as 1 and off-chip as 2
            prop.descriptor_mode = match field(value, 5, 0x3) {
                1 => DescriptorMode::SglInternal,
                2 => DescriptorMode::Sgl,
                _ => DescriptorMode::Block,
            };
        }

        prop.max_pending_read_req = field(regs.read(base + READ_REQ), 0, 0x3F);
        prop
    }

    fn set_properties(&self, regs: &RegisterWindow, ch: u8, prop: &DmaProp) {
        let base = chan(ch);

        let mut value = regs.read(base + CTRL2) & !0x0700_FFFF;
        value |= prop.read_req_delay_clocks as u32;
        if !self.sirius() {
            value |= (prop.max_dest_write_size as u32 & 0x7) << 24;
        }
        regs.write(base + CTRL2, value);

        let value = regs.read(base + PREFETCH) & !0xFF;
        regs.write(base + PREFETCH, value | prop.max_descriptor_fetch as u32);

        let mut value = Self::clear_status(regs.read(base + CTRL));
        value &= if self.sirius() {
            !0x3FFF_E034
        } else {
            !0x3FFF_E074
        };
        value |= flag(prop.cpl_status_write_back, 2)
            | (prop.ring_wrap_delay_time as u32 & 0x7) << 13
            | (prop.max_src_xfer_size as u32 & 0x7) << 16
            | (prop.traffic_class as u32 & 0x7) << 19
            | flag(prop.rel_order_descr_read, 22)
            | flag(prop.rel_order_data_read_req, 23)
            | flag(prop.rel_order_descr_write, 24)
            | flag(prop.rel_order_data_write, 25)
            | flag(prop.no_snoop_descr_read, 26)
            | flag(prop.no_snoop_data_read_req, 27)
            | flag(prop.no_snoop_descr_write, 28)
            | flag(prop.no_snoop_data_write, 29);
        if self.sirius() {
            value |= flag(prop.descriptor_mode != DescriptorMode::Block, 4)
                | flag(prop.ring_halt_at_end, 5);
        } else {
            let mode = match prop.descriptor_mode {
                DescriptorMode::Block => 0,
                DescriptorMode::SglInternal => 1,
                DescriptorMode::Sgl => 2,
            };
            value |= flag(prop.ring_halt_at_end, 4) | mode << 5;
        }
        regs.write(base + CTRL, value);

        let value = regs.read(base + READ_REQ) & !((0x3F << 16) | 0x3F);
        regs.write(
            base + READ_REQ,
            value | (prop.max_pending_read_req as u32 & 0x3F),
        );
    }

    fn start_block(&self, regs: &RegisterWindow, ch: u8, params: &DmaParams) {
        let base = chan(ch);
        regs.write(base + SRC_LO, params.addr_source as u32);
        regs.write(base + SRC_HI, (params.addr_source >> 32) as u32);
        regs.write(base + DST_LO, params.addr_dest as u32);
        regs.write(base + DST_HI, (params.addr_dest >> 32) as u32);

        let mut xfer = 1 << 31
            | flag(params.const_addr_src, 29)
            | flag(params.const_addr_dest, 28)
            | params.byte_count;
        if !params.ignore_block_int {
            xfer |= 1 << 30;
        }
        regs.write(base + XFER, xfer);

        let mut value = regs.read(base + CTRL);
        value &= if self.sirius() { !(1 << 4) } else { !(3 << 5) };
        value &= !CTRL_CPL_WRITEBACK;
        value |= CTRL_HEADER_LOGGING | CTRL_STATUS;
        regs.write(base + CTRL, value | CTRL_START);
    }

    fn sgl_format(&self) -> SglFormat {
        SglFormat::P8000
    }

    fn start_sgl(&self, regs: &RegisterWindow, ch: u8, ring: &SglRing) {
        let base = chan(ch);
        if self.sirius() {
            regs.modify(STRAP, 0, STRAP_DESCR_HOLD);
        }

        let prefetch = match ring.count {
            0..=3 => 1,
            256..=u32::MAX => 0,
            n => n & !0x3,
        };
        regs.write(base + PREFETCH, prefetch);

        for offset in [SRC_LO, SRC_HI, DST_LO, DST_HI, XFER].iter() {
            regs.write(base + offset, 0);
        }
        regs.write(base + RING_LO, ring.bus as u32);
        regs.write(base + RING_HI, (ring.bus >> 32) as u32);
        regs.write(base + RING_NEXT, ring.bus as u32);
        regs.write(base + RING_COUNT, ring.count);
        regs.write(base + RING_LAST, 0);

        // no invalid-descriptor interrupt while the ring is walked
        regs.modify(base + INTR, 0, (1 << 1) | INTR_STATUS);

        let mut value = regs.read(base + CTRL);
        value &= !CTRL_CPL_WRITEBACK;
        value |= CTRL_HEADER_LOGGING | CTRL_STATUS;
        if self.sirius() {
            value |= (1 << 5) | (1 << 4);
        } else {
            value &= !(3 << 5);
            value |= (2 << 5) | (1 << 4);
        }
        regs.write(base + CTRL, value | CTRL_START);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::regs::MockWindow;
    use alloc::vec::Vec;

    #[test]
    fn service_acks_only_enabled_status() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        // ch1: pause done enabled and raised, error raised but masked
        w.bar.set(chan(1) + INTR, (1 << 20) | (1 << 16) | (1 << 4));
        // ch2: descriptor done has no enable bit
        w.bar.set(chan(2) + INTR, 1 << 18);
        let mut pending = IntrSet::default();
        assert!(dma.service(&w.regs, &mut pending));
        assert_eq!(
            pending.sources,
            IntrSource::DMA_PAUSE_DONE.on_channel(1) | IntrSource::DMA_DONE.on_channel(2)
        );
        assert_eq!(w.bar.writes_to(chan(1) + INTR), vec![(1 << 20) | (1 << 4)]);
        assert_eq!(w.bar.writes_to(chan(2) + INTR), vec![1 << 18]);
        assert!(w.bar.writes_to(chan(0) + INTR).is_empty());
    }

    #[test]
    fn idle_chip_is_not_ours() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        w.bar.set(chan(0) + INTR, 1 << 16);
        let mut pending = IntrSet::default();
        assert!(!dma.service(&w.regs, &mut pending));
        assert!(pending.is_empty());
        assert!(w.bar.writes().is_empty());
    }

    #[test]
    fn enabling_keeps_pending_status() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        w.bar.write_one_to_clear(chan(0) + INTR, INTR_STATUS);
        w.bar.set(chan(0) + INTR, INTR_DESCR_DONE);
        dma.open(&w.regs, 0);
        dma.enable_all(&w.regs);
        dma.disable(&w.regs, &IntrSet::new(IntrSource::DMA_ERROR, 0));
        // the descriptor done the ISR has not seen yet is still there
        assert_eq!(w.bar.get(chan(0) + INTR) & INTR_STATUS, INTR_DESCR_DONE);
        assert!(w
            .bar
            .writes_to(chan(0) + INTR)
            .iter()
            .all(|v| v & INTR_STATUS == 0));
        let mut pending = IntrSet::default();
        assert!(dma.service(&w.regs, &mut pending));
        assert_eq!(pending.sources, IntrSource::DMA_DONE);
    }

    #[test]
    fn sirius_strap() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Sirius);
        w.bar.set(STRAP, 2);
        let usable: Vec<u8> = (0..4).filter(|&ch| dma.channel_enabled(&w.regs, ch)).collect();
        assert_eq!(usable, vec![0, 2]);
        w.bar.set(STRAP, 3);
        assert!(!dma.channel_enabled(&w.regs, 3));
        assert!(P8000Dma::new(PlxFamily::Capella1).channel_enabled(&w.regs, 3));
    }

    #[test]
    fn status_decoding() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        assert_eq!(dma.status(&w.regs, 0), DmaStatus::Complete);
        w.bar.set(chan(0) + CTRL, CTRL_IN_PROGRESS);
        assert_eq!(dma.status(&w.regs, 0), DmaStatus::InProgress);
        w.bar.set(chan(0) + CTRL, CTRL_IN_PROGRESS | CTRL_PAUSE);
        assert_eq!(dma.status(&w.regs, 0), DmaStatus::Paused);
    }

    #[test]
    fn abort_handshake() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        let ctrl = chan(3) + CTRL;
        // status bits are write-one-to-clear, the engine raises abort done
        w.bar.write_one_to_clear(ctrl, CTRL_STATUS);
        w.bar.on_write(ctrl, |v| if v & CTRL_ABORT != 0 { v | CTRL_ABORT_DONE } else { v });
        w.bar.set(ctrl, CTRL_IN_PROGRESS | CTRL_HEADER_LOGGING);
        dma.control(&w.regs, 3, DmaCommand::Abort, &DriverConfig::default())
            .unwrap();
        let writes = w.bar.writes_to(ctrl);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], CTRL_IN_PROGRESS | CTRL_ABORT_DONE | CTRL_ABORT);
        assert_eq!(writes[1], CTRL_IN_PROGRESS | CTRL_ABORT_DONE);
        assert_eq!(w.bar.get(ctrl) & (CTRL_ABORT | CTRL_ABORT_DONE), 0);
    }

    #[test]
    fn pause_times_out_without_ack() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        let ctrl = chan(0) + CTRL;
        w.bar.write_one_to_clear(ctrl, CTRL_STATUS);
        let config = DriverConfig {
            dma_poll_limit: 4,
            ..Default::default()
        };
        assert_eq!(
            dma.control(&w.regs, 0, DmaCommand::Pause, &config),
            Err(crate::PlxError::TIMEOUT)
        );
        // already paused is a no-op
        w.bar.set(ctrl, CTRL_PAUSE);
        w.bar.clear_log();
        dma.control(&w.regs, 0, DmaCommand::Pause, &config).unwrap();
        assert!(w.bar.writes().is_empty());
    }

    #[test]
    fn resume_releases_read_hold() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        w.bar.set(chan(0) + CTRL, CTRL_IN_PROGRESS | CTRL_PAUSE);
        w.bar.set(chan(0) + CTRL2, CTRL2_HOLD_READS | 0x10);
        dma.control(&w.regs, 0, DmaCommand::Resume, &DriverConfig::default())
            .unwrap();
        assert_eq!(w.bar.get(chan(0) + CTRL) & CTRL_PAUSE, 0);
        assert_eq!(w.bar.get(chan(0) + CTRL2), 0x10);
    }

    #[test]
    fn block_transfer_programming() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Draco2);
        w.bar.set(chan(0) + CTRL, (3 << 5) | CTRL_CPL_WRITEBACK);
        let params = DmaParams {
            addr_source: 0x1_2345_6000,
            addr_dest: 0x8000,
            byte_count: 0x400,
            const_addr_dest: true,
            ..Default::default()
        };
        dma.start_block(&w.regs, 0, &params);
        assert_eq!(w.bar.get(chan(0) + SRC_LO), 0x2345_6000);
        assert_eq!(w.bar.get(chan(0) + SRC_HI), 0x1);
        assert_eq!(w.bar.get(chan(0) + DST_LO), 0x8000);
        assert_eq!(
            w.bar.get(chan(0) + XFER),
            (1 << 31) | (1 << 30) | (1 << 28) | 0x400
        );
        assert_eq!(
            w.bar.get(chan(0) + CTRL),
            CTRL_HEADER_LOGGING | CTRL_STATUS | CTRL_START
        );
    }

    #[test]
    fn sgl_start_programming() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Sirius);
        w.bar.set(STRAP, STRAP_DESCR_HOLD);
        w.bar.set(chan(2) + INTR, INTR_ENABLE_ALL);
        let ring = SglRing {
            bus: 0x2_0000_0040,
            count: 9,
            wide: true,
        };
        dma.start_sgl(&w.regs, 2, &ring);
        assert_eq!(w.bar.get(STRAP), 0);
        assert_eq!(w.bar.get(chan(2) + PREFETCH), 8);
        assert_eq!(w.bar.get(chan(2) + RING_LO), 0x40);
        assert_eq!(w.bar.get(chan(2) + RING_HI), 0x2);
        assert_eq!(w.bar.get(chan(2) + RING_COUNT), 9);
        assert_eq!(w.bar.get(chan(2) + INTR), INTR_ENABLE_ALL & !(1 << 1));
        let ctrl = w.bar.get(chan(2) + CTRL);
        assert_eq!(ctrl & 0x30, 0x30);
        assert_ne!(ctrl & CTRL_START, 0);
    }

    #[test]
    fn descriptor_mode_encoding() {
        let w = MockWindow::new(0x1000);
        let dma = P8000Dma::new(PlxFamily::Capella2);
        let prop = DmaProp {
            descriptor_mode: DescriptorMode::SglInternal,
            traffic_class: 5,
            max_pending_read_req: 0x21,
            read_req_delay_clocks: 0x1234,
            ..Default::default()
        };
        dma.set_properties(&w.regs, 1, &prop);
        assert_eq!(w.bar.get(chan(1) + CTRL) >> 5 & 0x3, 1);
        let back = dma.get_properties(&w.regs, 1);
        assert_eq!(back.descriptor_mode, DescriptorMode::SglInternal);
        assert_eq!(back.traffic_class, 5);
        assert_eq!(back.max_pending_read_req, 0x21);
        assert_eq!(back.read_req_delay_clocks, 0x1234);
    }
}
