//! Mock platform, simulating registers, DMA memory, pinned pages, deferred
//! work and time on top of std and async-std.

mod regs;

pub use self::regs::MockRegisters;

use crate::*;
use async_std::task;
use std::boxed::Box;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::vec::Vec;

const DMA_BUS_BASE: BusAddr = 0x8000_0000;

/// Simulated platform services.
pub struct MockProvider {
    epoch: Instant,
    intr: AtomicBool,
    intr_off_count: AtomicUsize,
    delays: Mutex<Vec<Duration>>,
    dma: Mutex<DmaState>,
    pages: Mutex<PageState>,
    work: Mutex<Vec<WorkFn>>,
    pin_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

struct DmaState {
    limit: Option<usize>,
    next_bus: BusAddr,
    attempts: Vec<usize>,
    regions: BTreeMap<BusAddr, CoherentBlock>,
    freed_reserved: usize,
}

struct CoherentBlock {
    _backing: Vec<u64>,
    reserved: bool,
}

#[derive(Default)]
struct PageState {
    pin_limit: Option<usize>,
    bus_base: BusAddr,
    pinned: BTreeMap<PageFrame, usize>,
    reserved: BTreeSet<PageFrame>,
    dirty: BTreeSet<PageFrame>,
    mapped: BTreeMap<BusAddr, usize>,
    last_write: Option<bool>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(MockProvider {
            epoch: Instant::now(),
            intr: AtomicBool::new(true),
            intr_off_count: AtomicUsize::new(0),
            delays: Mutex::new(Vec::new()),
            dma: Mutex::new(DmaState {
                limit: None,
                next_bus: DMA_BUS_BASE,
                attempts: Vec::new(),
                regions: BTreeMap::new(),
                freed_reserved: 0,
            }),
            pages: Mutex::new(PageState::default()),
            work: Mutex::new(Vec::new()),
            pin_hook: Mutex::new(None),
        })
    }

    /// Run `f` at the start of the next pin request, before any page is
    /// pinned.
    pub fn on_next_pin(&self, f: impl FnOnce() + Send + 'static) {
        *self.pin_hook.lock().unwrap() = Some(Box::new(f));
    }

    /// Fail coherent allocations of `limit` bytes or more.
    pub fn set_dma_limit(&self, limit: Option<usize>) {
        self.dma.lock().unwrap().limit = limit;
    }

    /// Sizes of every coherent allocation attempt, failed ones included.
    pub fn dma_attempts(&self) -> Vec<usize> {
        self.dma.lock().unwrap().attempts.clone()
    }

    pub fn live_dma_regions(&self) -> usize {
        self.dma.lock().unwrap().regions.len()
    }

    pub fn dma_region_reserved(&self, bus: BusAddr) -> bool {
        let dma = self.dma.lock().unwrap();
        dma.regions.get(&bus).map_or(false, |b| b.reserved)
    }

    /// Number of regions that were freed while still tagged reserved.
    pub fn freed_while_reserved(&self) -> usize {
        self.dma.lock().unwrap().freed_reserved
    }

    /// Pin at most `limit` pages per request.
    pub fn set_pin_limit(&self, limit: Option<usize>) {
        self.pages.lock().unwrap().pin_limit = limit;
    }

    /// Offset added to every streaming mapping, e.g. above 4G.
    pub fn set_bus_base(&self, base: BusAddr) {
        self.pages.lock().unwrap().bus_base = base;
    }

    pub fn reserve_page(&self, page: PageFrame) {
        self.pages.lock().unwrap().reserved.insert(page);
    }

    /// Total outstanding pins.
    pub fn pinned_pages(&self) -> usize {
        self.pages.lock().unwrap().pinned.values().sum()
    }

    pub fn mapped_pages(&self) -> usize {
        self.pages.lock().unwrap().mapped.len()
    }

    pub fn is_dirty(&self, page: PageFrame) -> bool {
        self.pages.lock().unwrap().dirty.contains(&page)
    }

    /// Whether the last pin request asked for write access.
    pub fn last_pin_write(&self) -> Option<bool> {
        self.pages.lock().unwrap().last_write
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.intr.load(Ordering::SeqCst)
    }

    pub fn intr_off_count(&self) -> usize {
        self.intr_off_count.load(Ordering::SeqCst)
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn pending_work(&self) -> usize {
        self.work.lock().unwrap().len()
    }

    /// Run every queued work item. Returns how many ran.
    pub fn run_work(&self) -> usize {
        let queued: Vec<WorkFn> = core::mem::take(&mut *self.work.lock().unwrap());
        for work in queued.iter() {
            work();
        }
        queued.len()
    }
}

impl InterruptControl for MockProvider {
    fn intr_get(&self) -> bool {
        self.intr.load(Ordering::SeqCst)
    }

    fn intr_on(&self) {
        self.intr.store(true, Ordering::SeqCst);
    }

    fn intr_off(&self) {
        self.intr_off_count.fetch_add(1, Ordering::SeqCst);
        self.intr.store(false, Ordering::SeqCst);
    }
}

impl Timer for MockProvider {
    fn timer_now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn timer_set(&self, deadline: Duration, callback: Box<dyn FnOnce(Duration) + Send + Sync>) {
        let epoch = self.epoch;
        let dur = deadline.saturating_sub(epoch.elapsed());
        task::spawn(async move {
            task::sleep(dur).await;
            callback(epoch.elapsed());
        });
    }

    fn delay(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        std::thread::sleep(duration);
    }
}

impl DmaAllocator for MockProvider {
    fn dma_alloc_coherent(&self, size: usize) -> Option<DmaRegion> {
        let mut dma = self.dma.lock().unwrap();
        dma.attempts.push(size);
        if size == 0 || dma.limit.map_or(false, |limit| size >= limit) {
            return None;
        }
        // garbage fill, callers must clear what they hand out
        let backing = vec![0xCCCC_CCCC_CCCC_CCCCu64; (size + 7) / 8];
        let vaddr = backing.as_ptr() as VirtAddr;
        let bus = dma.next_bus;
        let pages = (size + PAGE_SIZE - 1) / PAGE_SIZE;
        dma.next_bus += (pages * PAGE_SIZE) as BusAddr;
        dma.regions.insert(
            bus,
            CoherentBlock {
                _backing: backing,
                reserved: false,
            },
        );
        debug!("mock dma alloc {:#x} bytes at bus {:#x}", size, bus);
        Some(DmaRegion {
            vaddr,
            paddr: bus as PhysAddr,
            bus,
            size,
        })
    }

    fn dma_free_coherent(&self, region: &DmaRegion) {
        let mut dma = self.dma.lock().unwrap();
        match dma.regions.remove(&region.bus) {
            Some(block) if block.reserved => dma.freed_reserved += 1,
            Some(_) => {}
            None => panic!("mock dma double free at {:#x}", region.bus),
        }
    }

    fn dma_set_reserved(&self, region: &DmaRegion, reserved: bool) {
        let mut dma = self.dma.lock().unwrap();
        if let Some(block) = dma.regions.get_mut(&region.bus) {
            block.reserved = reserved;
        }
    }
}

impl PagePinner for MockProvider {
    fn pin_user_pages(
        &self,
        vaddr: VirtAddr,
        count: usize,
        write: bool,
    ) -> HalResult<Vec<PageFrame>> {
        let hook = self.pin_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let mut pages = self.pages.lock().unwrap();
        pages.last_write = Some(write);
        let granted = pages.pin_limit.map_or(count, |limit| limit.min(count));
        if granted == 0 {
            return Err(HalError::PageLock);
        }
        let first = vaddr / PAGE_SIZE;
        let frames: Vec<PageFrame> = (first..first + granted).map(PageFrame).collect();
        for frame in frames.iter() {
            *pages.pinned.entry(*frame).or_insert(0) += 1;
        }
        Ok(frames)
    }

    fn put_page(&self, page: PageFrame) {
        let mut pages = self.pages.lock().unwrap();
        match pages.pinned.get_mut(&page) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                pages.pinned.remove(&page);
            }
            None => panic!("mock put_page on unpinned {:?}", page),
        }
    }

    fn set_page_dirty(&self, page: PageFrame) {
        self.pages.lock().unwrap().dirty.insert(page);
    }

    fn page_reserved(&self, page: PageFrame) -> bool {
        self.pages.lock().unwrap().reserved.contains(&page)
    }

    fn dma_map_page(
        &self,
        page: PageFrame,
        offset: usize,
        len: usize,
        _dir: DmaDirection,
    ) -> BusAddr {
        let mut pages = self.pages.lock().unwrap();
        let bus = pages.bus_base + (page.0 * PAGE_SIZE + offset) as BusAddr;
        pages.mapped.insert(bus, len);
        bus
    }

    fn dma_unmap_page(&self, bus: BusAddr, len: usize, _dir: DmaDirection) {
        let mut pages = self.pages.lock().unwrap();
        match pages.mapped.remove(&bus) {
            Some(mapped) => assert_eq!(mapped, len, "mock unmap length mismatch"),
            None => panic!("mock unmap of unmapped bus address {:#x}", bus),
        }
    }
}

impl WorkQueue for MockProvider {
    fn schedule_work(&self, work: &WorkFn) -> bool {
        let mut queue = self.work.lock().unwrap();
        let ptr = Arc::as_ptr(work) as *const u8;
        if queue.iter().any(|w| Arc::as_ptr(w) as *const u8 == ptr) {
            return false;
        }
        queue.push(work.clone());
        true
    }
}
