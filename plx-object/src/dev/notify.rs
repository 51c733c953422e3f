//! Wait objects: callers blocking on a subset of interrupt sources.

use super::intr::{IntrSet, PlxInterrupt};
use super::{Device, Owner};
use crate::{PlxError, PlxResult};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::task::{Context, Poll, Waker};
use core::time::Duration;
use futures::future::{pending, FutureExt};
use futures::{pin_mut, select_biased};
use hashbrown::HashMap;
use plx_hal::{sleep, sleep_until, Timer};
use spin::Mutex;

/// Handle of a registered wait object.
pub type WaitHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Triggered,
    MarkedForDelete,
}

struct WaitInner {
    state: WaitState,
    /// Sources seen since the last status query.
    triggered: IntrSet,
    wakers: Vec<Waker>,
}

pub(crate) struct WaitObject {
    owner: Owner,
    subscribed: IntrSet,
    inner: Mutex<WaitInner>,
    /// Callers currently blocked in a wait.
    sleeping: AtomicUsize,
}

impl WaitObject {
    fn new(owner: Owner, subscribed: IntrSet) -> Self {
        WaitObject {
            owner,
            subscribed,
            inner: Mutex::new(WaitInner {
                state: WaitState::Waiting,
                triggered: IntrSet::default(),
                wakers: Vec::new(),
            }),
            sleeping: AtomicUsize::new(0),
        }
    }

    fn set_state(&self, state: WaitState, active: Option<IntrSet>) {
        let wakers = {
            let mut inner = self.inner.lock();
            if let Some(active) = active {
                inner.triggered.merge(active);
            }
            inner.state = state;
            core::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Resolve once triggered or marked for delete.
    fn wait_triggered(self: &Arc<Self>) -> impl Future<Output = PlxResult> {
        struct TriggerFuture {
            object: Arc<WaitObject>,
        }

        impl Future for TriggerFuture {
            type Output = PlxResult;

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let mut inner = self.object.inner.lock();
                match inner.state {
                    WaitState::Triggered => {
                        inner.state = WaitState::Waiting;
                        Poll::Ready(Ok(()))
                    }
                    WaitState::MarkedForDelete => Poll::Ready(Err(PlxError::CANCELED)),
                    WaitState::Waiting => {
                        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                            inner.wakers.push(cx.waker().clone());
                        }
                        Poll::Pending
                    }
                }
            }
        }

        TriggerFuture {
            object: self.clone(),
        }
    }
}

/// Keeps the sleeping count raised while a wait is in progress.
struct SleepingGuard<'a>(&'a AtomicUsize);

impl<'a> SleepingGuard<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        SleepingGuard(count)
    }
}

impl Drop for SleepingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The wait objects of one device.
pub(crate) struct NotifyList {
    next_handle: AtomicU64,
    objects: Mutex<HashMap<WaitHandle, Arc<WaitObject>>>,
}

impl Default for NotifyList {
    fn default() -> Self {
        NotifyList {
            next_handle: AtomicU64::new(1),
            objects: Mutex::new(HashMap::new()),
        }
    }
}

impl NotifyList {
    fn get(&self, handle: WaitHandle) -> PlxResult<Arc<WaitObject>> {
        self.objects
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(PlxError::FAILED)
    }

    /// Trigger every object subscribed to one of `active`.
    ///
    /// The list lock is held for the whole pass, so an object is either
    /// signaled before a cancel removes it or not at all.
    pub(crate) fn signal(&self, active: &IntrSet) {
        let objects = self.objects.lock();
        for object in objects.values() {
            let hit = object.subscribed.intersect(active);
            if !hit.is_empty() {
                trace!("wait object of {:?} triggered by {:?}", object.owner, hit);
                object.set_state(WaitState::Triggered, Some(hit));
            }
        }
    }

    /// Drop every object and wake its waiters with `CANCELED`.
    ///
    /// Used on detach, when nobody is left to drain the sleepers. A waiter
    /// still holds its own reference to the object.
    pub(crate) fn cancel_all(&self) {
        let objects: Vec<Arc<WaitObject>> = {
            let mut objects = self.objects.lock();
            objects.drain().map(|(_, o)| o).collect()
        };
        for object in objects {
            object.set_state(WaitState::MarkedForDelete, None);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.lock().len()
    }
}

impl Device {
    /// Register a wait object for the sources in `intr`.
    ///
    /// Sources the chip cannot produce are dropped from the subscription.
    pub fn notification_register(
        &self,
        intr: &PlxInterrupt,
        owner: Owner,
    ) -> PlxResult<WaitHandle> {
        let subscribed = self.supported_subset(intr);
        let mut objects = self.notify.objects.lock();
        objects
            .try_reserve(1)
            .map_err(|_| PlxError::INSUFFICIENT_RES)?;
        let handle = self.notify.next_handle.fetch_add(1, Ordering::Relaxed);
        objects.insert(handle, Arc::new(WaitObject::new(owner, subscribed)));
        debug!(
            "registered wait object {} for {:?}: {:?}",
            handle, owner, subscribed
        );
        Ok(handle)
    }

    /// Block until the object is triggered or `timeout` expires.
    ///
    /// `None` waits forever.
    pub async fn notification_wait(&self, handle: WaitHandle, timeout: Option<Duration>) -> PlxResult {
        self.notification_wait_interruptible(handle, timeout, pending::<()>())
            .await
    }

    /// Like [`Device::notification_wait`], but gives up with `CANCELED` as
    /// soon as `interrupt` resolves.
    pub async fn notification_wait_interruptible(
        &self,
        handle: WaitHandle,
        timeout: Option<Duration>,
        interrupt: impl Future<Output = ()>,
    ) -> PlxResult {
        let object = self.notify.get(handle)?;
        let deadline = timeout.map(|t| self.hal.timer_now().saturating_add(t));
        let hal = &*self.hal;
        let timer = async move {
            match deadline {
                Some(deadline) => sleep_until(hal, deadline).await,
                None => pending::<()>().await,
            }
        }
        .fuse();
        let interrupt = interrupt.fuse();
        let triggered = object.wait_triggered().fuse();
        pin_mut!(timer, interrupt, triggered);

        let _sleeping = SleepingGuard::new(&object.sleeping);
        select_biased! {
            ret = triggered => ret,
            _ = interrupt => Err(PlxError::CANCELED),
            _ = timer => Err(PlxError::TIMEOUT),
        }
    }

    /// Fetch and clear the sources that triggered the object.
    pub fn notification_status(&self, handle: WaitHandle) -> PlxResult<PlxInterrupt> {
        let object = self.notify.get(handle)?;
        let triggered = core::mem::take(&mut object.inner.lock().triggered);
        Ok(PlxInterrupt::from_set(&triggered))
    }

    /// Cancel one object of `owner`, or with `None` all of them.
    ///
    /// An object registered by another owner is left alone and gives
    /// `FAILED`.
    ///
    /// Blocked waiters are woken with `CANCELED`. If one does not leave
    /// within the drain bound, its object is leaked rather than freed.
    pub async fn notification_cancel(&self, handle: Option<WaitHandle>, owner: Owner) -> PlxResult {
        let removed: Vec<Arc<WaitObject>> = {
            let mut objects = self.notify.objects.lock();
            match handle {
                Some(handle) => {
                    let object = objects.get(&handle).ok_or(PlxError::FAILED)?;
                    if object.owner != owner {
                        warn!(
                            "wait object {} belongs to {:?}, not {:?}",
                            handle, object.owner, owner
                        );
                        return Err(PlxError::FAILED);
                    }
                    objects.remove(&handle).into_iter().collect()
                }
                None => {
                    let handles: Vec<WaitHandle> = objects
                        .iter()
                        .filter(|(_, o)| o.owner == owner)
                        .map(|(&h, _)| h)
                        .collect();
                    handles
                        .iter()
                        .filter_map(|h| objects.remove(h))
                        .collect()
                }
            }
        };
        for object in removed {
            debug!("canceling wait object of {:?}", object.owner);
            object.set_state(WaitState::MarkedForDelete, None);
            self.drain_sleepers(object).await;
        }
        Ok(())
    }

    async fn drain_sleepers(&self, object: Arc<WaitObject>) {
        for _ in 0..self.config.cancel_drain_retries {
            if object.sleeping.load(Ordering::SeqCst) == 0 {
                return;
            }
            sleep(&*self.hal, self.config.cancel_drain_step()).await;
        }
        if object.sleeping.load(Ordering::SeqCst) == 0 {
            return;
        }
        error!(
            "wait object of {:?} still has sleepers, leaking it",
            object.owner
        );
        core::mem::forget(object);
    }

    /// Number of registered wait objects.
    pub fn notification_count(&self) -> usize {
        self.notify.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::intr::IntrSource;
    use crate::dev::tests::{mock_device, mock_device_with, nt_device};
    use crate::DriverConfig;
    use async_std::task;

    const A: Owner = Owner(1);
    const B: Owner = Owner(2);

    fn doorbell(bits: u32) -> PlxInterrupt {
        PlxInterrupt {
            doorbell: bits,
            ..Default::default()
        }
    }

    #[async_std::test]
    async fn doorbell_wait() {
        let (dev, _) = nt_device();
        let handle = dev.notification_register(&doorbell(0x1), A).unwrap();

        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x2));
        assert_eq!(
            dev.notification_wait(handle, Some(Duration::from_millis(100)))
                .await,
            Err(PlxError::TIMEOUT)
        );

        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x1));
        assert_eq!(
            dev.notification_wait(handle, Some(Duration::from_millis(100)))
                .await,
            Ok(())
        );
        assert_eq!(dev.notification_status(handle), Ok(doorbell(0x1)));
        assert_eq!(dev.notification_status(handle), Ok(doorbell(0)));
    }

    #[async_std::test]
    async fn signal_wakes_a_blocked_waiter() {
        let (dev, _) = mock_device();
        let intr = PlxInterrupt {
            dma_done: 0b10,
            ..Default::default()
        };
        let handle = dev.notification_register(&intr, A).unwrap();
        let waiter = {
            let dev = dev.clone();
            task::spawn(async move { dev.notification_wait(handle, None).await })
        };
        task::sleep(Duration::from_millis(20)).await;
        dev.notify.signal(&IntrSet::new(IntrSource::DMA_DONE.on_channel(0), 0));
        dev.notify.signal(&IntrSet::new(IntrSource::DMA_DONE.on_channel(1), 0));
        assert_eq!(waiter.await, Ok(()));
        assert_eq!(dev.notification_status(handle).unwrap().dma_done, 0b10);
    }

    #[async_std::test]
    async fn interrupted_wait_is_canceled() {
        let (dev, _) = nt_device();
        let handle = dev.notification_register(&doorbell(0xFF), A).unwrap();
        assert_eq!(
            dev.notification_wait_interruptible(handle, None, futures::future::ready(()))
                .await,
            Err(PlxError::CANCELED)
        );
        // the object survives an interrupted wait
        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x4));
        assert_eq!(dev.notification_wait(handle, None).await, Ok(()));
    }

    #[async_std::test]
    async fn cancel_wakes_waiter() {
        let (dev, _) = nt_device();
        let handle = dev.notification_register(&doorbell(0x1), A).unwrap();
        let waiter = {
            let dev = dev.clone();
            task::spawn(async move { dev.notification_wait(handle, None).await })
        };
        task::sleep(Duration::from_millis(20)).await;
        dev.notification_cancel(Some(handle), A).await.unwrap();
        assert_eq!(waiter.await, Err(PlxError::CANCELED));
        assert_eq!(dev.notification_count(), 0);
        assert_eq!(
            dev.notification_wait(handle, None).await,
            Err(PlxError::FAILED)
        );
        assert_eq!(
            dev.notification_cancel(Some(handle), A).await,
            Err(PlxError::FAILED)
        );
    }

    #[async_std::test]
    async fn signal_and_cancel_in_either_order() {
        let (dev, _) = nt_device();
        let first = dev.notification_register(&doorbell(0x1), A).unwrap();
        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x1));
        dev.notification_cancel(Some(first), A).await.unwrap();
        assert_eq!(dev.notification_status(first), Err(PlxError::FAILED));

        let second = dev.notification_register(&doorbell(0x1), A).unwrap();
        dev.notification_cancel(Some(second), A).await.unwrap();
        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x1));
        assert_eq!(dev.notification_count(), 0);
    }

    #[async_std::test]
    async fn cancel_all_of_one_owner() {
        let (dev, _) = nt_device();
        dev.notification_register(&doorbell(0x1), A).unwrap();
        let kept = dev.notification_register(&doorbell(0x1), B).unwrap();
        dev.notification_register(&doorbell(0x2), A).unwrap();
        dev.notification_cancel(None, A).await.unwrap();
        assert_eq!(dev.notification_count(), 1);
        assert!(dev.notification_status(kept).is_ok());
    }

    #[async_std::test]
    async fn cancel_by_another_owner_is_refused() {
        let (dev, _) = nt_device();
        let handle = dev.notification_register(&doorbell(0x1), A).unwrap();
        let waiter = {
            let dev = dev.clone();
            task::spawn(async move {
                dev.notification_wait(handle, Some(Duration::from_millis(500)))
                    .await
            })
        };
        task::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            dev.notification_cancel(Some(handle), B).await,
            Err(PlxError::FAILED)
        );
        assert_eq!(dev.notification_count(), 1);
        assert_eq!(dev.notification_status(handle), Ok(doorbell(0)));

        // the waiter is still blocked and sees the next doorbell
        dev.notify.signal(&IntrSet::new(IntrSource::empty(), 0x1));
        assert_eq!(waiter.await, Ok(()));
        dev.notification_cancel(Some(handle), A).await.unwrap();
        assert_eq!(dev.notification_count(), 0);
    }

    #[test]
    fn subscription_is_masked_to_the_chip() {
        let (dev, _) = mock_device();
        let intr = PlxInterrupt {
            doorbell: 0xFF,
            dma_done: 0b1,
            message: 0b1,
            ..Default::default()
        };
        let handle = dev.notification_register(&intr, A).unwrap();
        let object = dev.notify.get(handle).unwrap();
        assert_eq!(object.subscribed, IntrSet::new(IntrSource::DMA_DONE, 0));

        let (nt, _) = nt_device();
        let handle = nt.notification_register(&intr, A).unwrap();
        let object = nt.notify.get(handle).unwrap();
        assert_eq!(object.subscribed, IntrSet::new(IntrSource::MESSAGE_0, 0xFF));
    }

    #[async_std::test]
    async fn stuck_sleeper_is_leaked() {
        let (dev, _) = mock_device_with(DriverConfig {
            cancel_drain_retries: 2,
            cancel_drain_step_ms: 1,
            ..Default::default()
        });
        let handle = dev.notification_register(&doorbell(0x1), A).unwrap();
        let object = dev.notify.get(handle).unwrap();
        // a sleeper that never leaves
        object.sleeping.fetch_add(1, Ordering::SeqCst);
        dev.notification_cancel(Some(handle), A).await.unwrap();
        assert_eq!(dev.notification_count(), 0);
        assert_eq!(Arc::strong_count(&object), 2);
    }
}
