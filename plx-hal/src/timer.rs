use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;

pub trait Timer: Send + Sync {
    /// Monotonic time since an arbitrary epoch.
    fn timer_now(&self) -> Duration;

    /// Call `callback` once `deadline` has passed.
    fn timer_set(&self, deadline: Duration, callback: Box<dyn FnOnce(Duration) + Send + Sync>);

    /// Block the current context for `duration`.
    fn delay(&self, duration: Duration);
}

/// Sleep until `deadline`.
pub fn sleep_until<T: Timer + ?Sized>(timer: &T, deadline: Duration) -> SleepFuture<'_, T> {
    SleepFuture {
        timer,
        deadline,
        armed: false,
    }
}

/// Sleep for `duration`.
pub fn sleep<T: Timer + ?Sized>(timer: &T, duration: Duration) -> SleepFuture<'_, T> {
    let deadline = timer.timer_now().saturating_add(duration);
    sleep_until(timer, deadline)
}

#[must_use = "`sleep_until()` does nothing unless polled/`await`-ed"]
pub struct SleepFuture<'a, T: Timer + ?Sized> {
    timer: &'a T,
    deadline: Duration,
    armed: bool,
}

impl<T: Timer + ?Sized> Future for SleepFuture<'_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        if self.timer.timer_now() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.armed && self.deadline.as_nanos() < i64::max_value() as u128 {
            let waker = cx.waker().clone();
            self.timer
                .timer_set(self.deadline, Box::new(move |_| waker.wake()));
            self.armed = true;
        }
        Poll::Pending
    }
}
