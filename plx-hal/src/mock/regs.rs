use crate::RegisterSpace;
use std::boxed::Box;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::vec::Vec;

type WriteHook = Box<dyn Fn(u32) -> u32 + Send>;

/// A simulated register file.
///
/// Unwritten registers read as zero. Bits registered with
/// [`MockRegisters::write_one_to_clear`] are cleared by writing one and kept
/// by writing zero. A write hook sees the value that would be stored and
/// returns what the hardware actually latches, which is how tests model
/// status bits that the device sets in response to a command.
pub struct MockRegisters {
    size: usize,
    inner: Mutex<RegFile>,
}

#[derive(Default)]
struct RegFile {
    values: BTreeMap<usize, u32>,
    w1c: BTreeMap<usize, u32>,
    hooks: BTreeMap<usize, WriteHook>,
    writes: Vec<(usize, u32)>,
}

impl MockRegisters {
    pub fn new(size: usize) -> Self {
        MockRegisters {
            size,
            inner: Mutex::new(RegFile::default()),
        }
    }

    /// Current value, bypassing hooks.
    pub fn get(&self, offset: usize) -> u32 {
        let file = self.inner.lock().unwrap();
        file.values.get(&offset).copied().unwrap_or(0)
    }

    /// Force a value, bypassing hooks and the write log.
    pub fn set(&self, offset: usize, value: u32) {
        self.inner.lock().unwrap().values.insert(offset, value);
    }

    /// OR bits into a register, as hardware raising a status would.
    pub fn raise(&self, offset: usize, bits: u32) {
        let mut file = self.inner.lock().unwrap();
        *file.values.entry(offset).or_insert(0) |= bits;
    }

    pub fn write_one_to_clear(&self, offset: usize, mask: u32) {
        self.inner.lock().unwrap().w1c.insert(offset, mask);
    }

    pub fn on_write(&self, offset: usize, hook: impl Fn(u32) -> u32 + Send + 'static) {
        self.inner
            .lock()
            .unwrap()
            .hooks
            .insert(offset, Box::new(hook));
    }

    /// Every write seen so far, in order.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        let file = self.inner.lock().unwrap();
        file.writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_log(&self) {
        self.inner.lock().unwrap().writes.clear();
    }
}

impl RegisterSpace for MockRegisters {
    fn size(&self) -> usize {
        self.size
    }

    fn read32(&self, offset: usize) -> u32 {
        if offset + 4 > self.size {
            return !0;
        }
        self.get(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        if offset + 4 > self.size {
            return;
        }
        let mut file = self.inner.lock().unwrap();
        file.writes.push((offset, value));
        let old = file.values.get(&offset).copied().unwrap_or(0);
        let mask = file.w1c.get(&offset).copied().unwrap_or(0);
        let mut new = (value & !mask) | (old & mask & !value);
        if let Some(hook) = file.hooks.get(&offset) {
            new = hook(new);
        }
        trace!("mock reg write {:#x} = {:#x} (latched {:#x})", offset, value, new);
        file.values.insert(offset, new);
    }
}
