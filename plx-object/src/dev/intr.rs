//! Interrupt source sets.

use bitflags::bitflags;

bitflags! {
    /// Canonical interrupt sources, independent of the chip family.
    ///
    /// Bytes 0 to 3 hold the events of DMA channels 0 to 3. The constants
    /// named `DMA_*` are the channel 0 bits; use [`IntrSource::on_channel`]
    /// for the others.
    #[derive(Default)]
    pub struct IntrSource: u64 {
        const DMA_DONE              = 1 << 0;
        const DMA_PAUSE_DONE        = 1 << 1;
        const DMA_ABORT_DONE        = 1 << 2;
        const DMA_IMMED_STOP_DONE   = 1 << 3;
        const DMA_INVALID_DESCR     = 1 << 4;
        const DMA_ERROR             = 1 << 5;
        /// Every DMA event of every channel.
        const DMA_ALL               = 0x3F3F_3F3F;

        const PCI_MAIN              = 1 << 32;
        const PCI_ABORT             = 1 << 33;
        const LOCAL_1               = 1 << 34;
        const LOCAL_2               = 1 << 35;
        const OUTBOUND_POST         = 1 << 36;
        const OUTBOUND_OVERFLOW     = 1 << 37;
        const TARGET_RETRY_ABORT    = 1 << 38;
        const MESSAGE_0             = 1 << 39;
        const MESSAGE_1             = 1 << 40;
        const MESSAGE_2             = 1 << 41;
        const MESSAGE_3             = 1 << 42;
        const RSTIN                 = 1 << 43;
        const PME                   = 1 << 44;
        const GPIO_4_5              = 1 << 45;
        const GPIO_14_15            = 1 << 46;
        const LE_CORRECTABLE        = 1 << 47;
        const LE_UNCORRECTABLE      = 1 << 48;
        const LE_LINK_STATE_CHANGE  = 1 << 49;
        const LE_UNCORR_ERR_MSG     = 1 << 50;
        const SOFTWARE              = 1 << 51;
    }
}

impl IntrSource {
    /// Move the channel 0 DMA bits of `self` to channel `ch`.
    pub fn on_channel(self, ch: u8) -> Self {
        Self::from_bits_truncate((self.bits() & 0x3F) << (ch as u64 * 8))
    }

    /// DMA events of channel `ch`, expressed as channel 0 bits.
    pub fn of_channel(self, ch: u8) -> Self {
        Self::from_bits_truncate((self.bits() >> (ch as u64 * 8)) & 0x3F)
    }
}

/// A set of pending or subscribed interrupts: canonical sources plus the
/// doorbell bitmap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntrSet {
    pub sources: IntrSource,
    pub doorbell: u32,
}

impl IntrSet {
    pub const fn new(sources: IntrSource, doorbell: u32) -> Self {
        IntrSet { sources, doorbell }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.doorbell == 0
    }

    /// Accumulate `other`. Pending sets are only ever ORed together.
    pub fn merge(&mut self, other: IntrSet) {
        self.sources |= other.sources;
        self.doorbell |= other.doorbell;
    }

    pub fn intersect(&self, other: &IntrSet) -> IntrSet {
        IntrSet {
            sources: self.sources & other.sources,
            doorbell: self.doorbell & other.doorbell,
        }
    }
}

/// Interrupt selection as seen by callers, field for field the SDK's
/// `PLX_INTERRUPT`.
///
/// Channel fields are bitmaps with bit `n` standing for channel `n`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlxInterrupt {
    pub doorbell: u32,
    pub pci_main: bool,
    pub pci_abort: bool,
    /// Local to PCI interrupts 1 and 2.
    pub local_to_pci: u8,
    pub dma_done: u8,
    pub dma_pause_done: u8,
    pub dma_abort_done: u8,
    pub dma_immed_stop_done: u8,
    pub dma_invalid_descr: u8,
    pub dma_error: u8,
    pub mu_inbound_post: bool,
    pub mu_outbound_post: bool,
    pub mu_outbound_overflow: bool,
    pub target_retry_abort: bool,
    /// 6000 NT message interrupts 0 to 3.
    pub message: u8,
    pub sw_interrupt: bool,
    pub reset_deassert: bool,
    pub pme_deassert: bool,
    pub gpio_4_5: bool,
    pub gpio_14_15: bool,
    pub ntv_le_correctable: bool,
    pub ntv_le_uncorrectable: bool,
    pub ntv_le_link_state_change: bool,
    pub ntv_le_uncorr_error_msg: bool,
}

const CHANNEL_EVENTS: [IntrSource; 6] = [
    IntrSource::DMA_DONE,
    IntrSource::DMA_PAUSE_DONE,
    IntrSource::DMA_ABORT_DONE,
    IntrSource::DMA_IMMED_STOP_DONE,
    IntrSource::DMA_INVALID_DESCR,
    IntrSource::DMA_ERROR,
];

const FLAG_SOURCES: [IntrSource; 18] = [
    IntrSource::PCI_MAIN,
    IntrSource::PCI_ABORT,
    IntrSource::OUTBOUND_POST,
    IntrSource::OUTBOUND_OVERFLOW,
    IntrSource::TARGET_RETRY_ABORT,
    IntrSource::RSTIN,
    IntrSource::PME,
    IntrSource::GPIO_4_5,
    IntrSource::GPIO_14_15,
    IntrSource::LE_CORRECTABLE,
    IntrSource::LE_UNCORRECTABLE,
    IntrSource::LE_LINK_STATE_CHANGE,
    IntrSource::LE_UNCORR_ERR_MSG,
    IntrSource::MESSAGE_0,
    IntrSource::MESSAGE_1,
    IntrSource::MESSAGE_2,
    IntrSource::MESSAGE_3,
    IntrSource::SOFTWARE,
];

impl PlxInterrupt {
    fn channel_field(&self, event: IntrSource) -> u8 {
        match event {
            IntrSource::DMA_DONE => self.dma_done,
            IntrSource::DMA_PAUSE_DONE => self.dma_pause_done,
            IntrSource::DMA_ABORT_DONE => self.dma_abort_done,
            IntrSource::DMA_IMMED_STOP_DONE => self.dma_immed_stop_done,
            IntrSource::DMA_INVALID_DESCR => self.dma_invalid_descr,
            _ => self.dma_error,
        }
    }

    fn channel_field_mut(&mut self, event: IntrSource) -> &mut u8 {
        match event {
            IntrSource::DMA_DONE => &mut self.dma_done,
            IntrSource::DMA_PAUSE_DONE => &mut self.dma_pause_done,
            IntrSource::DMA_ABORT_DONE => &mut self.dma_abort_done,
            IntrSource::DMA_IMMED_STOP_DONE => &mut self.dma_immed_stop_done,
            IntrSource::DMA_INVALID_DESCR => &mut self.dma_invalid_descr,
            _ => &mut self.dma_error,
        }
    }

    fn flag(&self, source: IntrSource) -> bool {
        match source {
            IntrSource::PCI_MAIN => self.pci_main,
            IntrSource::PCI_ABORT => self.pci_abort,
            IntrSource::OUTBOUND_POST => self.mu_outbound_post,
            IntrSource::OUTBOUND_OVERFLOW => self.mu_outbound_overflow,
            IntrSource::TARGET_RETRY_ABORT => self.target_retry_abort,
            IntrSource::RSTIN => self.reset_deassert,
            IntrSource::PME => self.pme_deassert,
            IntrSource::GPIO_4_5 => self.gpio_4_5,
            IntrSource::GPIO_14_15 => self.gpio_14_15,
            IntrSource::LE_CORRECTABLE => self.ntv_le_correctable,
            IntrSource::LE_UNCORRECTABLE => self.ntv_le_uncorrectable,
            IntrSource::LE_LINK_STATE_CHANGE => self.ntv_le_link_state_change,
            IntrSource::LE_UNCORR_ERR_MSG => self.ntv_le_uncorr_error_msg,
            IntrSource::MESSAGE_0 => self.message & 1 != 0,
            IntrSource::MESSAGE_1 => self.message & 2 != 0,
            IntrSource::MESSAGE_2 => self.message & 4 != 0,
            IntrSource::MESSAGE_3 => self.message & 8 != 0,
            IntrSource::SOFTWARE => self.sw_interrupt,
            _ => false,
        }
    }

    fn set_flag(&mut self, source: IntrSource) {
        match source {
            IntrSource::PCI_MAIN => self.pci_main = true,
            IntrSource::PCI_ABORT => self.pci_abort = true,
            IntrSource::OUTBOUND_POST => self.mu_outbound_post = true,
            IntrSource::OUTBOUND_OVERFLOW => self.mu_outbound_overflow = true,
            IntrSource::TARGET_RETRY_ABORT => self.target_retry_abort = true,
            IntrSource::RSTIN => self.reset_deassert = true,
            IntrSource::PME => self.pme_deassert = true,
            IntrSource::GPIO_4_5 => self.gpio_4_5 = true,
            IntrSource::GPIO_14_15 => self.gpio_14_15 = true,
            IntrSource::LE_CORRECTABLE => self.ntv_le_correctable = true,
            IntrSource::LE_UNCORRECTABLE => self.ntv_le_uncorrectable = true,
            IntrSource::LE_LINK_STATE_CHANGE => self.ntv_le_link_state_change = true,
            IntrSource::LE_UNCORR_ERR_MSG => self.ntv_le_uncorr_error_msg = true,
            IntrSource::MESSAGE_0 => self.message |= 1,
            IntrSource::MESSAGE_1 => self.message |= 2,
            IntrSource::MESSAGE_2 => self.message |= 4,
            IntrSource::MESSAGE_3 => self.message |= 8,
            IntrSource::SOFTWARE => self.sw_interrupt = true,
            _ => {}
        }
    }

    /// Translate to canonical form. Only the first `channels` DMA channels
    /// are considered.
    pub fn to_set(&self, channels: u8) -> IntrSet {
        let mut sources = IntrSource::empty();
        for ch in 0..channels {
            for &event in CHANNEL_EVENTS.iter() {
                if self.channel_field(event) & (1 << ch) != 0 {
                    sources |= event.on_channel(ch);
                }
            }
        }
        for &source in FLAG_SOURCES.iter() {
            if self.flag(source) {
                sources |= source;
            }
        }
        if self.local_to_pci & 1 != 0 {
            sources |= IntrSource::LOCAL_1;
        }
        if self.local_to_pci & 2 != 0 {
            sources |= IntrSource::LOCAL_2;
        }
        IntrSet::new(sources, self.doorbell)
    }

    /// Translate back from canonical form.
    pub fn from_set(set: &IntrSet) -> Self {
        let mut intr = PlxInterrupt {
            doorbell: set.doorbell,
            ..Default::default()
        };
        for ch in 0..4 {
            let events = set.sources.of_channel(ch);
            for &event in CHANNEL_EVENTS.iter() {
                if events.contains(event) {
                    *intr.channel_field_mut(event) |= 1 << ch;
                }
            }
        }
        for &source in FLAG_SOURCES.iter() {
            if set.sources.contains(source) {
                intr.set_flag(source);
            }
        }
        if set.sources.contains(IntrSource::LOCAL_1) {
            intr.local_to_pci |= 1;
        }
        if set.sources.contains(IntrSource::LOCAL_2) {
            intr.local_to_pci |= 2;
        }
        intr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_shift() {
        let s = IntrSource::DMA_DONE | IntrSource::DMA_ERROR;
        assert_eq!(s.on_channel(2).bits(), 0x21 << 16);
        assert_eq!(s.on_channel(2).of_channel(2), s);
        assert!(s.on_channel(3).of_channel(1).is_empty());
    }

    #[test]
    fn caller_view_translation() {
        let intr = PlxInterrupt {
            doorbell: 0x5,
            dma_done: 0b10,
            message: 0b1001,
            ntv_le_correctable: true,
            local_to_pci: 2,
            sw_interrupt: true,
            ..Default::default()
        };
        let set = intr.to_set(4);
        assert_eq!(set.doorbell, 0x5);
        assert!(set.sources.contains(IntrSource::DMA_DONE.on_channel(1)));
        assert!(set.sources.contains(IntrSource::MESSAGE_0 | IntrSource::MESSAGE_3));
        assert!(set.sources.contains(IntrSource::LOCAL_2 | IntrSource::SOFTWARE));
        assert_eq!(PlxInterrupt::from_set(&set), intr);
    }

    #[test]
    fn channels_beyond_count_are_dropped() {
        let intr = PlxInterrupt {
            dma_done: 0b1111,
            ..Default::default()
        };
        let set = intr.to_set(2);
        assert_eq!(set.sources.bits(), 0x0101);
    }

    #[test]
    fn merge_accumulates() {
        let mut pending = IntrSet::default();
        pending.merge(IntrSet::new(IntrSource::PCI_MAIN, 0x1));
        pending.merge(IntrSet::new(IntrSource::RSTIN, 0x4));
        assert_eq!(pending.doorbell, 0x5);
        assert_eq!(pending.sources, IntrSource::PCI_MAIN | IntrSource::RSTIN);
    }
}
