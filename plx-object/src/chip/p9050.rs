//! 9050 and 9030 PCI to local bus bridges. No DMA engine.

use super::{flag, InterruptOps};
use crate::dev::intr::{IntrSet, IntrSource};
use crate::dev::regs::RegisterWindow;

const INT_CTRL_STAT: usize = 0x4C;

// INT_CTRL_STAT
const LOCAL_1_ENABLE: u32 = 1 << 0;
const LOCAL_1_EDGE: u32 = 1 << 1;
const LOCAL_1_ACTIVE: u32 = 1 << 2;
const LOCAL_2_ENABLE: u32 = 1 << 3;
const LOCAL_2_EDGE: u32 = 1 << 4;
const LOCAL_2_ACTIVE: u32 = 1 << 5;
const PCI_ENABLE: u32 = 1 << 6;
const SOFTWARE: u32 = 1 << 7;
const LOCAL_1_EDGE_ENABLE: u32 = 1 << 8;
const LOCAL_2_EDGE_ENABLE: u32 = 1 << 9;
const LOCAL_1_EDGE_CLEAR: u32 = 1 << 10;
const LOCAL_2_EDGE_CLEAR: u32 = 1 << 11;

pub struct P9050;

impl InterruptOps for P9050 {
    fn supported(&self) -> IntrSet {
        IntrSet::new(
            IntrSource::PCI_MAIN | IntrSource::LOCAL_1 | IntrSource::LOCAL_2 | IntrSource::SOFTWARE,
            0,
        )
    }

    fn enable_all(&self, regs: &RegisterWindow) {
        regs.modify(INT_CTRL_STAT, PCI_ENABLE, 0);
    }

    fn disable_all(&self, regs: &RegisterWindow) {
        regs.modify(INT_CTRL_STAT, 0, PCI_ENABLE);
    }

    fn enable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let bits = enable_bits(set.sources);
        if bits != 0 {
            regs.modify(INT_CTRL_STAT, bits, 0);
        }
    }

    fn disable(&self, regs: &RegisterWindow, set: &IntrSet) {
        let bits = enable_bits(set.sources);
        if bits != 0 {
            regs.modify(INT_CTRL_STAT, 0, bits);
        }
    }

    fn service(&self, regs: &RegisterWindow, pending: &mut IntrSet) -> bool {
        let status = regs.read(INT_CTRL_STAT);
        // registers read all ones in a low power state
        if status == !0 || status & PCI_ENABLE == 0 {
            return false;
        }
        let mut found = IntrSource::empty();
        if status & LOCAL_1_ACTIVE != 0 && status & LOCAL_1_ENABLE != 0 {
            found |= IntrSource::LOCAL_1;
        }
        if status & LOCAL_2_ACTIVE != 0 && status & LOCAL_2_ENABLE != 0 {
            found |= IntrSource::LOCAL_2;
        }
        if status & SOFTWARE != 0 {
            found |= IntrSource::SOFTWARE;
        }
        if found.is_empty() {
            return false;
        }
        // the sources are level triggered, so hold the line off until the
        // deferred handler has dealt with them
        regs.write(INT_CTRL_STAT, status & !PCI_ENABLE);
        trace!("9050 interrupt {:?}", found);
        pending.sources |= found;
        true
    }

    fn complete(&self, regs: &RegisterWindow, active: &IntrSet) {
        let status = regs.read(INT_CTRL_STAT);
        let mut set = PCI_ENABLE;
        let mut clear = 0;
        if active.sources.contains(IntrSource::LOCAL_1) {
            if status & LOCAL_1_EDGE != 0 && status & LOCAL_1_EDGE_ENABLE != 0 {
                set |= LOCAL_1_EDGE_CLEAR;
            } else {
                clear |= LOCAL_1_ENABLE;
            }
        }
        if active.sources.contains(IntrSource::LOCAL_2) {
            if status & LOCAL_2_EDGE != 0 && status & LOCAL_2_EDGE_ENABLE != 0 {
                set |= LOCAL_2_EDGE_CLEAR;
            } else {
                clear |= LOCAL_2_ENABLE;
            }
        }
        if active.sources.contains(IntrSource::SOFTWARE) {
            clear |= SOFTWARE;
        }
        regs.modify(INT_CTRL_STAT, set, clear);
    }
}

fn enable_bits(s: IntrSource) -> u32 {
    flag(s.contains(IntrSource::PCI_MAIN), 6)
        | flag(s.contains(IntrSource::LOCAL_1), 0)
        | flag(s.contains(IntrSource::LOCAL_2), 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::regs::MockWindow;

    #[test]
    fn masked_line_is_not_ours() {
        let w = MockWindow::new(0x80);
        w.bar.set(INT_CTRL_STAT, LOCAL_1_ACTIVE | LOCAL_1_ENABLE);
        let mut pending = IntrSet::default();
        assert!(!P9050.service(&w.regs, &mut pending));

        w.bar.set(INT_CTRL_STAT, !0);
        assert!(!P9050.service(&w.regs, &mut pending));
        assert!(pending.is_empty());
        assert!(w.bar.writes().is_empty());
    }

    #[test]
    fn level_source_is_masked_until_handled() {
        let w = MockWindow::new(0x80);
        let status = PCI_ENABLE | LOCAL_1_ENABLE | LOCAL_1_ACTIVE | LOCAL_2_ACTIVE | SOFTWARE;
        w.bar.set(INT_CTRL_STAT, status);
        let mut pending = IntrSet::default();
        assert!(P9050.service(&w.regs, &mut pending));
        // local 2 is active but not enabled
        assert_eq!(pending.sources, IntrSource::LOCAL_1 | IntrSource::SOFTWARE);
        assert_eq!(w.bar.get(INT_CTRL_STAT), status & !PCI_ENABLE);

        P9050.complete(&w.regs, &pending);
        assert_eq!(
            w.bar.get(INT_CTRL_STAT),
            PCI_ENABLE | LOCAL_1_ACTIVE | LOCAL_2_ACTIVE
        );
    }

    #[test]
    fn edge_source_is_cleared_not_masked() {
        let w = MockWindow::new(0x80);
        w.bar.set(
            INT_CTRL_STAT,
            LOCAL_2_ENABLE | LOCAL_2_EDGE | LOCAL_2_EDGE_ENABLE | LOCAL_2_ACTIVE,
        );
        P9050.complete(&w.regs, &IntrSet::new(IntrSource::LOCAL_2, 0));
        let value = w.bar.get(INT_CTRL_STAT);
        assert_ne!(value & LOCAL_2_EDGE_CLEAR, 0);
        assert_ne!(value & LOCAL_2_ENABLE, 0);
        assert_ne!(value & PCI_ENABLE, 0);
    }

    #[test]
    fn enable_bits_per_source() {
        let w = MockWindow::new(0x80);
        P9050.enable(
            &w.regs,
            &IntrSet::new(IntrSource::LOCAL_1 | IntrSource::LOCAL_2, 0),
        );
        assert_eq!(w.bar.get(INT_CTRL_STAT), LOCAL_1_ENABLE | LOCAL_2_ENABLE);
        P9050.enable_all(&w.regs);
        P9050.disable(&w.regs, &IntrSet::new(IntrSource::LOCAL_1, 0));
        assert_eq!(w.bar.get(INT_CTRL_STAT), LOCAL_2_ENABLE | PCI_ENABLE);
        P9050.disable_all(&w.regs);
        assert_eq!(w.bar.get(INT_CTRL_STAT), LOCAL_2_ENABLE);
    }
}
