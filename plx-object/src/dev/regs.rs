//! Register access layer.

use super::intr::IntrSet;
use crate::{DriverConfig, PlxError, PlxResult};
use alloc::sync::Arc;
use plx_hal::{IrqSaveLock, Provider, RegisterSpace, Timer};
use spin::RwLock;

/// The mapped BAR 0 and the config space of one device, plus the ISR lock
/// that guards their shared registers.
///
/// The ISR lock also protects the pending interrupt set, so acknowledging
/// a source and recording it happen in one critical section.
pub struct RegisterWindow {
    bar: RwLock<Option<Arc<dyn RegisterSpace>>>,
    config: Arc<dyn RegisterSpace>,
    isr: IrqSaveLock<IntrSet>,
    hal: Arc<dyn Provider>,
}

impl RegisterWindow {
    pub fn new(config: Arc<dyn RegisterSpace>, hal: Arc<dyn Provider>) -> Self {
        RegisterWindow {
            bar: RwLock::new(None),
            config,
            isr: IrqSaveLock::new(IntrSet::default()),
            hal,
        }
    }

    pub fn map(&self, bar: Arc<dyn RegisterSpace>) {
        *self.bar.write() = Some(bar);
    }

    /// Drop the BAR mapping. Later reads return all ones.
    pub fn unmap(&self) {
        // wait for a running ISR to leave before the window goes away
        let _guard = self.isr.lock(&*self.hal);
        *self.bar.write() = None;
    }

    pub fn is_mapped(&self) -> bool {
        self.bar.read().is_some()
    }

    pub fn bar_size(&self) -> usize {
        self.bar.read().as_ref().map_or(0, |bar| bar.size())
    }

    /// Run `f` on the mapped BAR.
    pub fn with_bar<R>(&self, f: impl FnOnce(&dyn RegisterSpace) -> R) -> Option<R> {
        self.bar.read().as_ref().map(|bar| f(&**bar))
    }

    /// Raw read. An unmapped window reads all ones, like a dead link.
    pub fn read(&self, offset: usize) -> u32 {
        self.with_bar(|bar| bar.read32(offset)).unwrap_or(!0)
    }

    pub fn write(&self, offset: usize, value: u32) {
        self.with_bar(|bar| bar.write32(offset, value));
    }

    /// Read-modify-write that is atomic with respect to the ISR.
    ///
    /// Must not be called from [`crate::chip::InterruptOps::service`], which
    /// already holds the lock.
    pub fn modify(&self, offset: usize, set: u32, clear: u32) {
        let _guard = self.isr.lock(&*self.hal);
        let value = self.read(offset);
        self.write(offset, (value | set) & !clear);
    }

    pub fn config_read(&self, offset: usize) -> u32 {
        self.config.read32(offset)
    }

    pub fn config_write(&self, offset: usize, value: u32) {
        self.config.write32(offset, value);
    }

    pub fn config_modify(&self, offset: usize, set: u32, clear: u32) {
        let _guard = self.isr.lock(&*self.hal);
        let value = self.config.read32(offset);
        self.config.write32(offset, (value | set) & !clear);
    }

    /// Run the ISR body with the lock held and the pending set at hand.
    ///
    /// Interrupts are already off in interrupt context.
    pub(crate) fn service<R>(&self, f: impl FnOnce(&mut IntrSet) -> R) -> R {
        let mut pending = self.isr.lock_in_irq();
        f(&mut pending)
    }

    /// Fetch and clear the pending interrupt set.
    pub fn take_pending(&self) -> IntrSet {
        core::mem::take(&mut *self.isr.lock(&*self.hal))
    }

    /// Poll `offset` until one of `mask` is set.
    pub fn poll_set(&self, offset: usize, mask: u32, config: &DriverConfig) -> PlxResult<u32> {
        for _ in 0..config.dma_poll_limit {
            let value = self.read(offset);
            if value & mask != 0 {
                return Ok(value);
            }
            if let Some(step) = config.dma_poll_delay() {
                self.hal.delay(step);
            }
        }
        error!(
            "timeout waiting for {:#x} in register {:#x}",
            mask, offset
        );
        Err(PlxError::TIMEOUT)
    }
}

/// A window over simulated BAR and config registers.
#[cfg(test)]
pub(crate) struct MockWindow {
    pub regs: RegisterWindow,
    pub bar: Arc<plx_hal::mock::MockRegisters>,
    pub config: Arc<plx_hal::mock::MockRegisters>,
    pub hal: Arc<plx_hal::mock::MockProvider>,
}

#[cfg(test)]
impl MockWindow {
    pub fn new(bar_size: usize) -> Self {
        use plx_hal::mock::{MockProvider, MockRegisters};
        let hal = MockProvider::new();
        let bar = Arc::new(MockRegisters::new(bar_size));
        let config = Arc::new(MockRegisters::new(0x1000));
        let regs = RegisterWindow::new(config.clone(), hal.clone());
        regs.map(bar.clone());
        MockWindow {
            regs,
            bar,
            config,
            hal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::intr::IntrSource;
    use plx_hal::mock::{MockProvider, MockRegisters};

    fn window() -> (RegisterWindow, Arc<MockRegisters>, Arc<MockProvider>) {
        let w = MockWindow::new(0x100);
        (w.regs, w.bar, w.hal)
    }

    #[test]
    fn modify_disables_interrupts() {
        let (regs, bar, hal) = window();
        bar.set(0x10, 0xF0);
        regs.modify(0x10, 0x1, 0x30);
        assert_eq!(bar.get(0x10), 0xC1);
        assert_eq!(hal.intr_off_count(), 1);
        assert!(hal.interrupts_enabled());
    }

    #[test]
    fn unmapped_reads_all_ones() {
        let (regs, bar, _) = window();
        regs.unmap();
        assert!(!regs.is_mapped());
        assert_eq!(regs.read(0x10), !0);
        regs.write(0x10, 5);
        assert!(bar.writes().is_empty());
    }

    #[test]
    fn pending_is_taken_once() {
        let (regs, _, _) = window();
        regs.service(|p| p.merge(IntrSet::new(IntrSource::PCI_MAIN, 0x2)));
        regs.service(|p| p.merge(IntrSet::new(IntrSource::empty(), 0x1)));
        assert_eq!(
            regs.take_pending(),
            IntrSet::new(IntrSource::PCI_MAIN, 0x3)
        );
        assert!(regs.take_pending().is_empty());
    }

    #[test]
    fn poll_gives_up() {
        let (regs, bar, hal) = window();
        let config = DriverConfig {
            dma_poll_limit: 3,
            dma_poll_delay_us: 1,
            ..Default::default()
        };
        assert_eq!(regs.poll_set(0x20, 0x4, &config), Err(PlxError::TIMEOUT));
        assert_eq!(hal.delays().len(), 3);
        bar.set(0x20, 0x6);
        assert_eq!(regs.poll_set(0x20, 0x4, &config), Ok(0x6));
    }
}
