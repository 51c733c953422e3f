use alloc::sync::Arc;

/// A deferred work item.
pub type WorkFn = Arc<dyn Fn() + Send + Sync>;

pub trait WorkQueue: Send + Sync {
    /// Queue `work` to run later outside interrupt context.
    ///
    /// An item never runs concurrently with itself. Returns `false` if the
    /// item was already queued and has not started yet.
    fn schedule_work(&self, work: &WorkFn) -> bool;
}
