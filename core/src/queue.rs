//! The microtask queue.
//!
//! Every promise reaction and every scheduled producer runs as a microtask.
//! Jobs run strictly in FIFO order; jobs enqueued while a checkpoint is
//! draining run in the same checkpoint, after everything queued before them.
//!
//! The queue does not drive itself. A driver (the engine's event loop, or a
//! test calling [`MicrotaskQueue::perform_checkpoint`]) decides when to drain.
//! A driver that parks itself registers a waker with
//! [`MicrotaskQueue::register_driver`] and is woken by the next enqueue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::task::Waker;

use deferred_types::PromiseId;

/// A unit of work on the queue.
struct Microtask {
    label: &'static str,
    job: Box<dyn FnOnce()>,
}

/// Host-side rejection tracking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RejectionOp {
    /// A promise rejected with no handler attached.
    Reject,
    /// A handler was attached to a promise previously reported via `Reject`.
    Handle,
}

#[derive(Default)]
struct QueueInner {
    jobs: RefCell<VecDeque<Microtask>>,
    draining: Cell<bool>,
    driver: RefCell<Option<Waker>>,
    unhandled: RefCell<Vec<PromiseId>>,
}

/// Handle to a single-threaded FIFO microtask queue.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    inner: Rc<QueueInner>,
}

impl MicrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the back of the queue and wake a parked driver.
    pub fn enqueue(&self, label: &'static str, job: impl FnOnce() + 'static) {
        let depth = {
            let mut jobs = self.inner.jobs.borrow_mut();
            jobs.push_back(Microtask {
                label,
                job: Box::new(job),
            });
            jobs.len()
        };
        tracing::trace!(label, depth, "microtask enqueued");

        let driver = self.inner.driver.borrow_mut().take();
        if let Some(waker) = driver {
            waker.wake();
        }
    }

    /// Drain the queue until it is empty. Returns the number of jobs run.
    pub fn perform_checkpoint(&self) -> usize {
        self.perform_checkpoint_bounded(usize::MAX)
    }

    /// Run at most `budget` jobs, leaving the rest queued in order.
    ///
    /// A checkpoint requested from inside a running job is a no-op: microtasks
    /// never nest.
    pub fn perform_checkpoint_bounded(&self, budget: usize) -> usize {
        if self.inner.draining.replace(true) {
            return 0;
        }
        let _draining = DrainingGuard(&self.inner.draining);

        let mut ran = 0;
        while ran < budget {
            let next = self.inner.jobs.borrow_mut().pop_front();
            let Some(task) = next else { break };
            tracing::trace!(label = task.label, "microtask run");
            (task.job)();
            ran += 1;
        }
        ran
    }

    /// Park a driver: `waker` is woken by the next [`enqueue`](Self::enqueue).
    ///
    /// Only one driver is tracked; registering replaces the previous waker.
    pub fn register_driver(&self, waker: &Waker) {
        let mut driver = self.inner.driver.borrow_mut();
        match driver.as_ref() {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *driver = Some(waker.clone()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.jobs.borrow().is_empty()
    }

    /// Take the promises that are currently rejected with no handler.
    ///
    /// A promise that got a handler before this call is not reported.
    #[must_use]
    pub fn take_unhandled_rejections(&self) -> Vec<PromiseId> {
        std::mem::take(&mut *self.inner.unhandled.borrow_mut())
    }

    pub(crate) fn track_rejection(&self, promise: PromiseId, op: RejectionOp) {
        let mut unhandled = self.inner.unhandled.borrow_mut();
        match op {
            RejectionOp::Reject => {
                tracing::trace!(promise = %promise, "rejection without handler");
                if !unhandled.contains(&promise) {
                    unhandled.push(promise);
                }
            }
            RejectionOp::Handle => {
                tracing::trace!(promise = %promise, "late rejection handler");
                unhandled.retain(|id| *id != promise);
            }
        }
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.len())
            .field("draining", &self.inner.draining.get())
            .finish_non_exhaustive()
    }
}

struct DrainingGuard<'a>(&'a Cell<bool>);

impl Drop for DrainingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
