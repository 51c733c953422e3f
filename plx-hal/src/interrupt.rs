//! Local interrupt control and the irq-save spinlock built on it.

use core::{
    fmt,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};
use spin::{Mutex, MutexGuard};

/// Interrupt-enable state of the executing CPU.
pub trait InterruptControl: Send + Sync {
    fn intr_get(&self) -> bool;
    fn intr_on(&self);
    fn intr_off(&self);
}

/// A spinlock shared with an interrupt handler.
///
/// Taken from normal context with [`IrqSaveLock::lock`], which disables
/// local interrupts for as long as the guard lives, so the handler can never
/// spin on a lock held by the code it interrupted. The handler itself uses
/// [`IrqSaveLock::lock_in_irq`].
pub struct IrqSaveLock<T: ?Sized> {
    inner: Mutex<T>,
}

impl<T> IrqSaveLock<T> {
    pub const fn new(data: T) -> Self {
        IrqSaveLock {
            inner: Mutex::new(data),
        }
    }
}

impl<T: ?Sized> IrqSaveLock<T> {
    /// Disable local interrupts, then acquire the lock.
    ///
    /// Like push_off/pop_off, nested guards restore the state that was
    /// current when they were taken, so interrupts come back on only when
    /// the outermost guard is dropped.
    pub fn lock<'a, I>(&'a self, intr: &'a I) -> IrqSaveGuard<'a, T, I>
    where
        I: InterruptControl + ?Sized,
    {
        let enabled = intr.intr_get();
        intr.intr_off();
        IrqSaveGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
            intr,
            enabled,
        }
    }

    /// Acquire the lock from interrupt context, where interrupts are
    /// already off.
    pub fn lock_in_irq(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T: ?Sized + Default> Default for IrqSaveLock<T> {
    fn default() -> Self {
        IrqSaveLock {
            inner: Mutex::new(T::default()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for IrqSaveLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IrqSaveLock {{ locked: {} }}", self.is_locked())
    }
}

pub struct IrqSaveGuard<'a, T: ?Sized, I: InterruptControl + ?Sized> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    intr: &'a I,
    enabled: bool,
}

impl<T: ?Sized, I: InterruptControl + ?Sized> Deref for IrqSaveGuard<'_, T, I> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized, I: InterruptControl + ?Sized> DerefMut for IrqSaveGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized, I: InterruptControl + ?Sized> Drop for IrqSaveGuard<'_, T, I> {
    fn drop(&mut self) {
        // release the lock before interrupts can fire again
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        if self.enabled {
            self.intr.intr_on();
        }
    }
}
