//! The async microtask driver.
//!
//! A never-completing local task that drains the microtask queue in bounded
//! batches, yielding to tokio between batches so other local tasks (and the
//! future passed to `block_on`) make progress. When the queue is empty the
//! driver parks its waker on the queue and sleeps until the next enqueue.

use std::cell::RefCell;
use std::future::{Future, poll_fn};
use std::rc::Rc;
use std::task::Poll;

use deferred_config::RuntimeConfig;
use deferred_core::{MicrotaskQueue, PromiseId};

/// Record of rejections that reached the end of a checkpoint unhandled.
#[derive(Debug, Clone, Default)]
pub struct RejectionLog {
    seen: Rc<RefCell<Vec<PromiseId>>>,
}

impl RejectionLog {
    #[must_use]
    pub fn snapshot(&self) -> Vec<PromiseId> {
        self.seen.borrow().clone()
    }

    /// Return everything recorded so far and clear the log.
    #[must_use]
    pub fn take(&self) -> Vec<PromiseId> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }

    /// Move the queue's unhandled set into the log. Only meaningful once the
    /// queue is fully drained, since a later microtask may still attach a
    /// handler.
    pub(crate) fn collect(&self, queue: &MicrotaskQueue, report: bool) -> usize {
        let unhandled = queue.take_unhandled_rejections();
        if report {
            for promise in &unhandled {
                tracing::warn!(promise = %promise, "unhandled promise rejection");
            }
        }
        let count = unhandled.len();
        self.seen.borrow_mut().extend(unhandled);
        count
    }
}

/// Drive `queue` forever. Spawn with `tokio::task::spawn_local` and abort the
/// handle when done.
pub fn drive_microtasks(
    queue: MicrotaskQueue,
    config: &RuntimeConfig,
    rejections: RejectionLog,
) -> impl Future<Output = ()> + use<> {
    let budget = config.checkpoint_budget();
    let report = config.report_unhandled_rejections();
    tracing::debug!(budget, report, "microtask driver started");

    poll_fn(move |cx| {
        let ran = queue.perform_checkpoint_bounded(budget);
        if ran > 0 {
            tracing::trace!(ran, remaining = queue.len(), "checkpoint");
        }

        if queue.is_empty() {
            rejections.collect(&queue, report);
            queue.register_driver(cx.waker());
        } else {
            cx.waker().wake_by_ref();
        }
        Poll::<()>::Pending
    })
}
