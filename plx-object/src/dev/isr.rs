//! Interrupt service routine and its deferred half.

use super::intr::IntrSource;
use super::{Device, DeviceState};
use core::sync::atomic::Ordering;
use plx_hal::WorkQueue;

/// What the ISR did with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsrOutcome {
    /// None of the device's sources was active; the line is shared.
    NotHandled,
    Handled,
    /// Handled, and the deferred handler was queued.
    Scheduled,
}

impl IsrOutcome {
    pub fn is_handled(self) -> bool {
        self != IsrOutcome::NotHandled
    }
}

impl Device {
    /// Entry point from the platform interrupt dispatch.
    ///
    /// Runs in interrupt context: takes only the ISR lock and never blocks.
    pub fn handle_interrupt(&self) -> IsrOutcome {
        let ours = self
            .regs
            .service(|pending| self.caps.intr.service(&self.regs, pending));
        if !ours {
            return IsrOutcome::NotHandled;
        }
        if self.state() != DeviceState::Started {
            return IsrOutcome::Handled;
        }
        self.dpc_pending.store(true, Ordering::SeqCst);
        self.hal.schedule_work(&self.dpc);
        IsrOutcome::Scheduled
    }

    /// The deferred handler.
    ///
    /// Releases the pages of finished scatter-gather transfers before
    /// waking the waiters of their completion.
    pub(crate) fn run_dpc(&self) {
        if self.state() != DeviceState::Started || !self.regs.is_mapped() {
            self.dpc_pending.store(false, Ordering::SeqCst);
            return;
        }
        let active = self.regs.take_pending();
        trace!("dpc: {:?}", active);
        for ch in 0..self.channels.len() as u8 {
            let done = active.sources.of_channel(ch).contains(IntrSource::DMA_DONE);
            if done && self.sgl_pending(ch) {
                self.sgl_complete(ch);
            }
        }
        if !active.is_empty() {
            self.caps.intr.complete(&self.regs, &active);
            self.notify.signal(&active);
        }
        // last, so a draining stop sees the handler finished
        self.dpc_pending.store(false, Ordering::SeqCst);
    }

    /// Whether a deferred handler is queued or running.
    pub fn dpc_pending(&self) -> bool {
        self.dpc_pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::dma::{DmaDirection, DmaParams};
    use crate::dev::intr::{IntrSet, PlxInterrupt};
    use crate::dev::tests::mock_device;
    use crate::dev::Owner;
    use core::time::Duration;

    #[test]
    fn idle_device_is_not_handled() {
        let (dev, hw) = mock_device();
        assert_eq!(dev.handle_interrupt(), IsrOutcome::NotHandled);
        assert!(!IsrOutcome::NotHandled.is_handled());
        assert_eq!(hw.hal.pending_work(), 0);
    }

    #[test]
    fn interrupts_accumulate_until_the_dpc() {
        let (dev, hw) = mock_device();
        hw.raise_done(0);
        assert_eq!(dev.handle_interrupt(), IsrOutcome::Scheduled);
        hw.raise_done(2);
        assert_eq!(dev.handle_interrupt(), IsrOutcome::Scheduled);
        hw.raise_done(0);
        assert!(dev.handle_interrupt().is_handled());
        // queued once
        assert_eq!(hw.hal.pending_work(), 1);
        assert!(dev.dpc_pending());

        let pending = dev.regs.take_pending();
        assert_eq!(
            pending,
            IntrSet::new(
                IntrSource::DMA_DONE | IntrSource::DMA_DONE.on_channel(2),
                0
            )
        );
        assert!(dev.regs.take_pending().is_empty());
    }

    #[async_std::test]
    async fn dpc_completes_sgl_before_waking() {
        let (dev, hw) = mock_device();
        let owner = Owner(7);
        dev.dma_channel_open(1, owner).unwrap();
        let params = DmaParams {
            user_va: 0x20_0800,
            byte_count: 0x1000,
            direction: DmaDirection::USER_TO_PCI,
            ..Default::default()
        };
        dev.dma_transfer_user_buffer(1, &params, owner).unwrap();
        assert_eq!(hw.hal.pinned_pages(), 2);

        let handle = dev.notification_register(
            &PlxInterrupt {
                dma_done: 0b10,
                ..Default::default()
            },
            owner,
        )
        .unwrap();
        hw.raise_done(1);
        assert_eq!(dev.handle_interrupt(), IsrOutcome::Scheduled);
        assert_eq!(hw.hal.run_work(), 1);
        assert!(!dev.dpc_pending());
        assert!(!dev.sgl_pending(1));
        assert_eq!(hw.hal.pinned_pages(), 0);
        assert_eq!(
            dev.notification_wait(handle, Some(Duration::from_millis(100)))
                .await,
            Ok(())
        );
    }

    #[test]
    fn stopping_device_does_not_schedule() {
        let (dev, hw) = mock_device();
        dev.set_state(DeviceState::Stopping);
        hw.raise_done(0);
        assert_eq!(dev.handle_interrupt(), IsrOutcome::Handled);
        assert_eq!(hw.hal.pending_work(), 0);
        assert!(!dev.dpc_pending());
    }

    #[test]
    fn dpc_after_stop_is_a_no_op() {
        let (dev, hw) = mock_device();
        hw.raise_done(0);
        dev.handle_interrupt();
        dev.stop();
        assert_eq!(hw.hal.run_work(), 1);
        assert!(!dev.dpc_pending());
    }
}
