//! DMA channels: ownership, block and scatter-gather transfers, control.

use super::memory::DmaBuffer;
use super::sgl::{self, PinnedPages};
use super::{Device, Owner};
use crate::chip::DmaOps;
use crate::{PlxError, PlxResult};
use alloc::sync::Arc;
use numeric_enum_macro::numeric_enum;
use plx_hal::Timer;

numeric_enum! {
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Transfer direction, named from the local bus side of a 9000 bridge.
    ///
    /// The 8000 DMA function uses the same values with user buffer names,
    /// see [`DmaDirection::USER_TO_PCI`] and [`DmaDirection::PCI_TO_USER`].
    pub enum DmaDirection {
        PciToLocal = 0,
        LocalToPci = 1,
    }
}

impl DmaDirection {
    /// Host memory is read.
    pub const USER_TO_PCI: Self = DmaDirection::PciToLocal;
    /// Host memory is written.
    pub const PCI_TO_USER: Self = DmaDirection::LocalToPci;

    pub(crate) fn hal_direction(self) -> plx_hal::DmaDirection {
        match self {
            DmaDirection::PciToLocal => plx_hal::DmaDirection::ToDevice,
            DmaDirection::LocalToPci => plx_hal::DmaDirection::FromDevice,
        }
    }
}

impl Default for DmaDirection {
    fn default() -> Self {
        DmaDirection::PciToLocal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaCommand {
    /// Halt after the current descriptor.
    Pause,
    /// Halt and hold off new read requests.
    PauseImmediate,
    Resume,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaStatus {
    Complete,
    InProgress,
    Paused,
}

impl From<DmaStatus> for PlxError {
    fn from(status: DmaStatus) -> Self {
        match status {
            DmaStatus::Complete => PlxError::COMPLETE,
            DmaStatus::InProgress => PlxError::IN_PROGRESS,
            DmaStatus::Paused => PlxError::PAUSED,
        }
    }
}

impl DmaStatus {
    /// `Ok` if the channel is idle, the status as error otherwise.
    pub fn idle(self) -> PlxResult {
        match self {
            DmaStatus::Complete => Ok(()),
            busy => Err(busy.into()),
        }
    }
}

/// Where the channel fetches its descriptors from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorMode {
    Block,
    /// Descriptor ring in host memory.
    Sgl,
    /// Descriptors in the chip's internal memory.
    SglInternal,
}

impl Default for DescriptorMode {
    fn default() -> Self {
        DescriptorMode::Block
    }
}

/// Channel properties of every family.
///
/// A family reads and writes only the fields it has bits for and leaves the
/// others at their default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DmaProp {
    // 8000
    pub cpl_status_write_back: bool,
    pub descriptor_mode: DescriptorMode,
    pub descriptor_poll_mode: bool,
    pub ring_halt_at_end: bool,
    pub ring_wrap_delay_time: u8,
    pub rel_order_descr_read: bool,
    pub rel_order_descr_write: bool,
    pub rel_order_data_read_req: bool,
    pub rel_order_data_write: bool,
    pub no_snoop_descr_read: bool,
    pub no_snoop_descr_write: bool,
    pub no_snoop_data_read_req: bool,
    pub no_snoop_data_write: bool,
    pub max_src_xfer_size: u8,
    pub max_dest_write_size: u8,
    pub traffic_class: u8,
    pub max_pending_read_req: u8,
    pub descriptor_poll_time: u8,
    pub max_descriptor_fetch: u8,
    pub read_req_delay_clocks: u16,

    // 9000
    pub ready_input: bool,
    pub burst: bool,
    pub burst_infinite: bool,
    pub sgl_mode: bool,
    pub done_interrupt: bool,
    pub route_int_to_pci: bool,
    pub const_addr_local: bool,
    pub write_invalid_mode: bool,
    pub demand_mode: bool,
    pub enable_eot: bool,
    pub fast_terminate_mode: bool,
    pub clear_count_mode: bool,
    pub dual_address_mode: bool,
    pub eot_end_link: bool,
    pub valid_mode: bool,
    pub valid_stop_control: bool,
    pub local_bus_width: u8,
    pub wait_states: u8,
}

/// Parameters of a transfer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DmaParams {
    /// User buffer of a scatter-gather transfer.
    pub user_va: usize,
    /// Block transfer addresses of the 8000 DMA function.
    pub addr_source: u64,
    pub addr_dest: u64,
    /// PCI side address of 9000 transfers and of 8000 user buffers.
    pub pci_addr: u64,
    pub local_addr: u32,
    pub byte_count: u32,
    pub direction: DmaDirection,
    pub const_addr_src: bool,
    pub const_addr_dest: bool,
    pub force_flush: bool,
    /// Don't interrupt when a block transfer is done.
    pub ignore_block_int: bool,
}

/// Software state of one channel.
#[derive(Default)]
pub(crate) struct DmaChannel {
    open: bool,
    owner: Option<Owner>,
    /// Bumped on every open and close, so a transfer started before a
    /// close can tell the channel was reopened meanwhile.
    generation: u64,
    /// A scatter-gather transfer was started and not yet cleaned up.
    sgl_pending: bool,
    sgl_buffer: Option<DmaBuffer>,
    pages: Option<PinnedPages>,
}

impl DmaChannel {
    fn check_owner(&self, owner: Owner) -> PlxResult {
        if !self.open {
            return Err(PlxError::INVALID_ACCESS);
        }
        if self.owner != Some(owner) {
            warn!("DMA channel owned by {:?}, not {:?}", self.owner, owner);
            return Err(PlxError::IN_USE);
        }
        Ok(())
    }
}

impl Device {
    fn dma_ops(&self, ch: u8) -> PlxResult<&Arc<dyn DmaOps>> {
        let ops = self.caps.dma.as_ref().ok_or(PlxError::UNSUPPORTED)?;
        if ch >= ops.channels() || ch as usize >= self.channels.len() {
            return Err(PlxError::INVALID_ACCESS);
        }
        if !self.regs.is_mapped() {
            return Err(PlxError::INVALID_STATE);
        }
        Ok(ops)
    }

    pub fn dma_channel_open(&self, ch: u8, owner: Owner) -> PlxResult {
        let ops = self.dma_ops(ch)?;
        if !ops.channel_enabled(&self.regs, ch) {
            return Err(PlxError::INVALID_ACCESS);
        }
        let mut chan = self.channels[ch as usize].lock();
        if chan.open {
            warn!("DMA channel {} is already open", ch);
            return Err(PlxError::INVALID_ACCESS);
        }
        chan.open = true;
        chan.owner = Some(owner);
        chan.generation = chan.generation.wrapping_add(1);
        chan.sgl_pending = false;
        ops.open(&self.regs, ch);
        info!("opened DMA channel {}", ch);
        Ok(())
    }

    /// Status of a channel. With `owner`, the channel must be open and
    /// belong to it.
    pub fn dma_status(&self, ch: u8, owner: Option<Owner>) -> PlxResult<DmaStatus> {
        let ops = self.dma_ops(ch)?;
        if let Some(owner) = owner {
            self.channels[ch as usize].lock().check_owner(owner)?;
        }
        if !ops.channel_enabled(&self.regs, ch) {
            return Err(PlxError::INVALID_ACCESS);
        }
        Ok(ops.status(&self.regs, ch))
    }

    pub fn dma_control(&self, ch: u8, cmd: DmaCommand, owner: Owner) -> PlxResult {
        let ops = self.dma_ops(ch)?;
        {
            let chan = self.channels[ch as usize].lock();
            if chan.open && chan.owner != Some(owner) {
                return Err(PlxError::IN_USE);
            }
        }
        debug!("DMA channel {} {:?}", ch, cmd);
        ops.control(&self.regs, ch, cmd, &self.config)
    }

    pub fn dma_get_properties(&self, ch: u8) -> PlxResult<DmaProp> {
        let ops = self.dma_ops(ch)?;
        Ok(ops.get_properties(&self.regs, ch))
    }

    pub fn dma_set_properties(&self, ch: u8, prop: &DmaProp, owner: Owner) -> PlxResult {
        self.dma_status(ch, Some(owner))?.idle()?;
        let ops = self.dma_ops(ch)?;
        ops.set_properties(&self.regs, ch, prop);
        Ok(())
    }

    /// Start a single block transfer. Completion is reported by interrupt.
    pub fn dma_transfer_block(&self, ch: u8, params: &DmaParams, owner: Owner) -> PlxResult {
        self.dma_status(ch, Some(owner))?.idle()?;
        let ops = self.dma_ops(ch)?;
        let _chan = self.channels[ch as usize].lock();
        debug!(
            "DMA channel {}: block of {:#x} bytes",
            ch, params.byte_count
        );
        ops.start_block(&self.regs, ch, params);
        Ok(())
    }

    /// Lock a user buffer, build its descriptors and start the channel.
    ///
    /// Only one scatter-gather transfer may be pending per channel. The
    /// pages stay locked until the completion interrupt is handled or the
    /// channel is closed.
    pub fn dma_transfer_user_buffer(
        &self,
        ch: u8,
        params: &DmaParams,
        owner: Owner,
    ) -> PlxResult {
        self.dma_status(ch, Some(owner))?.idle()?;
        let ops = self.dma_ops(ch)?;
        let (old, const_local, generation) = {
            let mut chan = self.channels[ch as usize].lock();
            chan.check_owner(owner)?;
            if chan.sgl_pending {
                warn!("DMA channel {} has an SGL transfer pending", ch);
                return Err(PlxError::IN_PROGRESS);
            }
            chan.sgl_pending = true;
            (
                chan.sgl_buffer.take(),
                ops.const_local(&self.regs, ch),
                chan.generation,
            )
        };

        // pinning may sleep, so the channel lock is not held
        let built = sgl::build(&self.hal, ops.sgl_format(), old, params, const_local, owner);

        let mut chan = self.channels[ch as usize].lock();
        if chan.generation != generation {
            // closed while the pages were being locked, and maybe reopened
            // by someone else whose state must be left alone
            warn!("DMA channel {} was closed during SGL setup", ch);
            drop(chan);
            drop(built);
            return Err(PlxError::INVALID_ACCESS);
        }
        let built = match built {
            Ok(built) => built,
            Err(e) => {
                chan.sgl_pending = false;
                return Err(e);
            }
        };
        ops.start_sgl(&self.regs, ch, &built.ring);
        chan.pages = Some(built.pages);
        chan.sgl_buffer = Some(built.buffer);
        Ok(())
    }

    /// Release the pages of a finished scatter-gather transfer.
    ///
    /// Does nothing if no transfer is pending, so the completion path and
    /// a forced close never release the same pages twice.
    pub(crate) fn sgl_complete(&self, ch: u8) {
        let pages = {
            let mut chan = match self.channels.get(ch as usize) {
                Some(chan) => chan.lock(),
                None => return,
            };
            if !chan.sgl_pending {
                return;
            }
            chan.sgl_pending = false;
            chan.pages.take()
        };
        debug!("DMA channel {}: SGL transfer complete", ch);
        drop(pages);
    }

    /// Whether a scatter-gather transfer is pending on `ch`.
    pub fn sgl_pending(&self, ch: u8) -> bool {
        self.channels
            .get(ch as usize)
            .map_or(false, |chan| chan.lock().sgl_pending)
    }

    /// Close a channel.
    ///
    /// A busy channel is left alone if `check_in_progress` is set, and
    /// aborted otherwise.
    pub fn dma_channel_close(&self, ch: u8, check_in_progress: bool, owner: Owner) -> PlxResult {
        let status = self.dma_status(ch, Some(owner))?;
        if status != DmaStatus::Complete {
            if check_in_progress {
                return Err(status.into());
            }
            if let Err(e) = self.dma_control(ch, DmaCommand::Abort, owner) {
                warn!("abort of DMA channel {} failed: {:?}", ch, e);
            }
            // let the abort interrupt run
            self.hal.delay(self.config.close_grace());
        }
        let (pages, buffer) = {
            let mut chan = self.channels[ch as usize].lock();
            chan.open = false;
            chan.owner = None;
            chan.generation = chan.generation.wrapping_add(1);
            chan.sgl_pending = false;
            (chan.pages.take(), chan.sgl_buffer.take())
        };
        drop(pages);
        drop(buffer);
        info!("closed DMA channel {}", ch);
        Ok(())
    }

    /// Close every channel `owner` still has open.
    pub fn dma_cleanup_owner(&self, owner: Owner) {
        for ch in 0..self.channels.len() as u8 {
            let owned = self.channels[ch as usize].lock().owner == Some(owner);
            if owned {
                if let Err(e) = self.dma_channel_close(ch, false, owner) {
                    warn!("closing DMA channel {} failed: {:?}", ch, e);
                }
            }
        }
    }

    /// Close every open channel, whoever owns it.
    pub(crate) fn dma_close_all(&self) {
        for ch in 0..self.channels.len() as u8 {
            let owner = self.channels[ch as usize].lock().owner;
            if let Some(owner) = owner {
                if let Err(e) = self.dma_channel_close(ch, false, owner) {
                    warn!("closing DMA channel {} failed: {:?}", ch, e);
                }
            }
            // a closed channel may still cache descriptors
            let buffer = self.channels[ch as usize].lock().sgl_buffer.take();
            drop(buffer);
        }
    }
}
