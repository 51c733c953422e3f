//! Devices and the driver context that owns them.

use self::dma::DmaChannel;
use self::intr::{IntrSet, PlxInterrupt};
use self::notify::NotifyList;
use self::regs::RegisterWindow;
use crate::chip::{self, Capabilities, ChipKey};
use crate::{DriverConfig, PlxError, PlxResult};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::convert::TryFrom;
use numeric_enum_macro::numeric_enum;
use plx_hal::{Provider, RegisterSpace, Timer, WorkFn};
use spin::{Mutex, RwLock};

pub mod dma;
pub mod intr;
pub mod regs;
pub mod sgl;

mod isr;
mod memory;
mod notify;

pub use self::isr::IsrOutcome;
pub use self::memory::{DmaBuffer, PhysMemInfo};
pub use self::notify::WaitHandle;

/// PCI address of a device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub domain: u16,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

/// Whoever holds a resource: an open file of the device, or the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner(pub usize);

impl Owner {
    /// The driver itself, owner of the common buffer.
    pub const DRIVER: Owner = Owner(0);
}

numeric_enum! {
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DeviceState {
        Stopped = 0,
        Starting = 1,
        Started = 2,
        Stopping = 3,
    }
}

/// One PLX function bound to the driver.
pub struct Device {
    location: Location,
    key: RwLock<ChipKey>,
    state: AtomicU8,
    hal: Arc<dyn Provider>,
    config: DriverConfig,
    regs: RegisterWindow,
    caps: Capabilities,
    channels: Vec<Mutex<DmaChannel>>,
    notify: NotifyList,
    memory: Mutex<Vec<DmaBuffer>>,
    /// Set by the ISR when it queues the deferred handler, cleared by the
    /// handler when it is done.
    dpc_pending: AtomicBool,
    dpc: WorkFn,
}

impl Device {
    /// Identify the chip behind `config_space` and set up its capabilities.
    ///
    /// The device starts out stopped; see [`Device::start`].
    pub fn create(
        location: Location,
        mut key: ChipKey,
        config_space: Arc<dyn RegisterSpace>,
        hal: Arc<dyn Provider>,
        config: DriverConfig,
    ) -> PlxResult<Arc<Self>> {
        chip::detect(&mut key, &*config_space)?;
        let caps = chip::select(&key);
        let channels = caps.dma.as_ref().map_or(0, |dma| dma.channels());
        let regs = RegisterWindow::new(config_space, hal.clone());
        Ok(Arc::new_cyclic(|weak: &Weak<Device>| {
            let weak = weak.clone();
            let dpc: WorkFn = Arc::new(move || {
                if let Some(dev) = weak.upgrade() {
                    dev.run_dpc();
                }
            });
            Device {
                location,
                key: RwLock::new(key),
                state: AtomicU8::new(DeviceState::Stopped as u8),
                hal,
                config,
                regs,
                caps,
                channels: (0..channels).map(|_| Mutex::new(DmaChannel::default())).collect(),
                notify: NotifyList::default(),
                memory: Mutex::new(Vec::new()),
                dpc_pending: AtomicBool::new(false),
                dpc,
            }
        }))
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn key(&self) -> ChipKey {
        *self.key.read()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        DeviceState::try_from(self.state.load(Ordering::SeqCst)).unwrap_or(DeviceState::Stopped)
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Number of DMA channels, 0 if the chip has no DMA engine.
    pub fn dma_channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Map BAR 0, finish identification and enable chip interrupts.
    pub fn start(&self, bar: Arc<dyn RegisterSpace>) -> PlxResult {
        if self.state() != DeviceState::Stopped {
            return Err(PlxError::INVALID_STATE);
        }
        self.set_state(DeviceState::Starting);
        self.regs.map(bar);
        let mut key = self.key();
        if let Err(e) = self.caps.intr.prepare(&self.regs, &mut key) {
            warn!("unable to start device at {:?}: {:?}", self.location, e);
            self.regs.unmap();
            self.set_state(DeviceState::Stopped);
            return Err(e);
        }
        *self.key.write() = key;
        self.caps.intr.enable_all(&self.regs);
        self.set_state(DeviceState::Started);
        info!(
            "started PLX {:04x} at {:?} ({:#x} byte BAR)",
            key.plx_chip,
            self.location,
            self.regs.bar_size()
        );
        Ok(())
    }

    /// Quiesce the device and unmap its registers.
    ///
    /// Open channels are aborted and closed, whoever owns them.
    pub fn stop(&self) {
        if self.state() != DeviceState::Started {
            return;
        }
        self.set_state(DeviceState::Stopping);
        self.caps.intr.disable_all(&self.regs);
        for _ in 0..self.config.dpc_drain_retries {
            if !self.dpc_pending() {
                break;
            }
            self.hal.delay(self.config.dpc_drain_step());
        }
        if self.dpc_pending() {
            warn!("deferred handler of {:?} still pending", self.location);
        }
        self.dma_close_all();
        self.regs.unmap();
        self.set_state(DeviceState::Stopped);
        info!("stopped device at {:?}", self.location);
    }

    /// Release everything `owner` holds on this device.
    pub async fn owner_release(&self, owner: Owner) {
        if let Err(e) = self.notification_cancel(None, owner).await {
            warn!("canceling notifications of {:?} failed: {:?}", owner, e);
        }
        self.dma_cleanup_owner(owner);
        self.phys_mem_free_all(owner);
    }

    fn check_register(&self, offset: usize) -> PlxResult {
        if offset & 0x3 != 0 {
            return Err(PlxError::INVALID_OFFSET);
        }
        if !self.regs.is_mapped() {
            return Err(PlxError::INVALID_STATE);
        }
        if offset + 4 > self.regs.bar_size() {
            return Err(PlxError::INVALID_ADDR);
        }
        Ok(())
    }

    /// Read a BAR 0 register.
    pub fn register_read(&self, offset: usize) -> PlxResult<u32> {
        self.check_register(offset)?;
        Ok(self.regs.read(offset))
    }

    pub fn register_write(&self, offset: usize, value: u32) -> PlxResult {
        self.check_register(offset)?;
        self.regs.write(offset, value);
        Ok(())
    }

    pub fn config_read(&self, offset: usize) -> PlxResult<u32> {
        if offset & 0x3 != 0 {
            return Err(PlxError::INVALID_OFFSET);
        }
        Ok(self.regs.config_read(offset))
    }

    pub fn config_write(&self, offset: usize, value: u32) -> PlxResult {
        if offset & 0x3 != 0 {
            return Err(PlxError::INVALID_OFFSET);
        }
        self.regs.config_write(offset, value);
        Ok(())
    }

    /// The sources of `intr` the chip can produce.
    pub(crate) fn supported_subset(&self, intr: &PlxInterrupt) -> IntrSet {
        let set = intr.to_set(self.dma_channel_count());
        set.intersect(&self.caps.intr.supported())
    }

    /// Enable the sources of `intr` the chip has. Others are ignored.
    pub fn interrupt_enable(&self, intr: &PlxInterrupt) -> PlxResult {
        if !self.regs.is_mapped() {
            return Err(PlxError::INVALID_STATE);
        }
        self.caps.intr.enable(&self.regs, &self.supported_subset(intr));
        Ok(())
    }

    pub fn interrupt_disable(&self, intr: &PlxInterrupt) -> PlxResult {
        if !self.regs.is_mapped() {
            return Err(PlxError::INVALID_STATE);
        }
        self.caps.intr.disable(&self.regs, &self.supported_subset(intr));
        Ok(())
    }
}

/// The driver context: configuration, attached devices, common buffer.
pub struct Driver {
    config: DriverConfig,
    devices: Mutex<Vec<Arc<Device>>>,
    common_buffer: Mutex<Option<DmaBuffer>>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Driver {
            config,
            devices: Mutex::new(Vec::new()),
            common_buffer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn attach(&self, device: Arc<Device>) -> PlxResult {
        let mut devices = self.devices.lock();
        if devices.iter().any(|d| d.location == device.location) {
            return Err(PlxError::IN_USE);
        }
        info!("attached device at {:?}", device.location);
        devices.push(device);
        Ok(())
    }

    pub fn device(&self, location: Location) -> Option<Arc<Device>> {
        let devices = self.devices.lock();
        devices.iter().find(|d| d.location == location).cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().clone()
    }

    /// Stop a device and free what it still holds.
    pub fn detach(&self, location: Location) -> PlxResult<Arc<Device>> {
        let device = {
            let mut devices = self.devices.lock();
            let index = devices
                .iter()
                .position(|d| d.location == location)
                .ok_or(PlxError::INVALID_OBJECT)?;
            devices.remove(index)
        };
        device.stop();
        device.notify.cancel_all();
        let memory = core::mem::take(&mut *device.memory.lock());
        drop(memory);
        info!("detached device at {:?}", location);
        Ok(device)
    }

    /// Allocate the buffer shared by every user of the driver.
    ///
    /// Allocated from the first device. A zero size allocates nothing.
    pub fn allocate_common_buffer(&self, size: usize) -> PlxResult<PhysMemInfo> {
        if size == 0 {
            return Ok(PhysMemInfo::default());
        }
        let mut common = self.common_buffer.lock();
        if common.is_some() {
            return Err(PlxError::IN_USE);
        }
        let device = self
            .devices
            .lock()
            .first()
            .cloned()
            .ok_or(PlxError::INVALID_OBJECT)?;
        let buffer = DmaBuffer::alloc_shrinking(
            &device.hal,
            size,
            true,
            self.config.alloc_shrink_percent,
            Owner::DRIVER,
        )?;
        let info = buffer.info();
        info!(
            "common buffer: {:#x} bytes at bus {:#x}",
            info.size, info.bus
        );
        *common = Some(buffer);
        Ok(info)
    }

    pub fn common_buffer(&self) -> Option<PhysMemInfo> {
        self.common_buffer.lock().as_ref().map(DmaBuffer::info)
    }

    /// Free the common buffer if there is one.
    pub fn free_common_buffer(&self) {
        let buffer = self.common_buffer.lock().take();
        drop(buffer);
    }

    /// Free the common buffer and detach every device.
    pub fn shutdown(&self) {
        self.free_common_buffer();
        let locations: Vec<Location> = self.devices.lock().iter().map(|d| d.location).collect();
        for location in locations {
            if let Err(e) = self.detach(location) {
                warn!("detaching {:?} failed: {:?}", location, e);
            }
        }
    }
}
