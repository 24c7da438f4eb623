//! Lazily scheduled promises.
//!
//! A [`DeferredPromise`] stores its producer and does nothing until the first
//! continuation is attached. That first attachment enqueues exactly one
//! microtask which installs the creation-time context snapshot, runs the
//! producer, and settles the inner promise.
//!
//! ```text
//! new(producer)          state = Unscheduled, snapshot captured
//!   │
//!   ├── then/catch/finally/.await ──> attach()
//!   │                                   ├─ Unscheduled -> Scheduled, enqueue "deferred producer"
//!   │                                   └─ chain onto the inner promise
//!   │
//!   └── deferred_then/catch/finally ──> new stage whose producer attaches here
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::rc::{Rc, Weak};

use deferred_context::ContextSnapshot;
use deferred_types::{PromiseId, ScheduleState, SettledKind, Settlement};

use crate::future::PromiseFuture;
use crate::promise::{Promise, Resolver};
use crate::queue::MicrotaskQueue;

type Producer<T, E> = Box<dyn FnOnce(Resolver<T, E>) -> Result<(), E>>;

struct PendingProducer<T, E> {
    producer: Producer<T, E>,
    resolver: Resolver<T, E>,
}

struct DeferredCell<T, E> {
    state: Cell<ScheduleState>,
    continuations: Cell<usize>,
    context: ContextSnapshot,
    /// Taken by the scheduled microtask, so the producer runs at most once.
    pending: RefCell<Option<PendingProducer<T, E>>>,
    inner: Promise<T, E>,
}

impl<T, E> DeferredCell<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn run_producer(&self) {
        let pending = self.pending.borrow_mut().take();
        let Some(PendingProducer { producer, resolver }) = pending else {
            return;
        };
        tracing::trace!(promise = %self.inner.id(), "running deferred producer");

        let outcome = self.context.enter(|| producer(resolver.clone()));
        if let Err(reason) = outcome {
            resolver.reject(reason);
        }
    }

    fn mark_settled(&self, kind: SettledKind) {
        let mut state = self.state.get();
        match state.settle(kind) {
            Ok(()) => self.state.set(state),
            Err(err) => tracing::warn!(promise = %self.inner.id(), %err, "deferred state not advanced"),
        }
    }
}

/// A promise whose producer runs only once something consumes it.
///
/// Cloning yields another handle to the same deferred promise; attaching
/// through any clone counts toward the same one-shot schedule.
#[must_use = "a deferred promise does nothing until a continuation is attached"]
pub struct DeferredPromise<T, E> {
    cell: Rc<DeferredCell<T, E>>,
}

impl<T, E> Clone for DeferredPromise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T, E> DeferredPromise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Store `producer` and capture the ambient context. Nothing runs and
    /// nothing is queued.
    ///
    /// Once scheduled, the producer settles the promise through the
    /// [`Resolver`] it receives; returning `Err(reason)` rejects it unless it
    /// was already settled. `Ok(())` on its own settles nothing.
    pub fn new<P>(queue: &MicrotaskQueue, producer: P) -> Self
    where
        P: FnOnce(Resolver<T, E>) -> Result<(), E> + 'static,
    {
        let (inner, resolver) = Promise::pending(queue);
        let cell = Rc::new(DeferredCell {
            state: Cell::new(ScheduleState::Unscheduled),
            continuations: Cell::new(0),
            context: ContextSnapshot::capture(),
            pending: RefCell::new(Some(PendingProducer {
                producer: Box::new(producer),
                resolver,
            })),
            inner,
        });

        let weak: Weak<DeferredCell<T, E>> = Rc::downgrade(&cell);
        cell.inner.on_settle(move |kind| {
            if let Some(cell) = weak.upgrade() {
                cell.mark_settled(kind);
            }
        });
        Self { cell }
    }

    /// The continuation attachment hook. Every consumer goes through here.
    fn attach(&self) -> &Promise<T, E> {
        let cell = &self.cell;
        cell.continuations.set(cell.continuations.get() + 1);

        let mut state = cell.state.get();
        let outcome = state.attach();
        cell.state.set(state);

        if outcome.must_schedule() {
            tracing::debug!(promise = %cell.inner.id(), "deferred promise scheduled");
            let task = Rc::clone(cell);
            cell.inner
                .queue()
                .enqueue("deferred producer", move || task.run_producer());
        }
        &cell.inner
    }

    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
        R: FnOnce(E) -> Result<U, E> + 'static,
    {
        self.attach().then(on_fulfilled, on_rejected)
    }

    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<T, E> + 'static,
    {
        self.attach().catch(on_rejected)
    }

    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<(), E> + 'static,
    {
        self.attach().finally(on_settled)
    }

    /// Lazy `then`: returns a new stage without scheduling it.
    ///
    /// The returned stage's producer is the attachment to `self`, so this
    /// stage is scheduled once the returned stage is consumed. Creating the
    /// stage alone schedules nothing, which keeps `a.deferred_then(f)
    /// .deferred_then(g)` inert until its last stage has a consumer.
    pub fn deferred_then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> DeferredPromise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
        R: FnOnce(E) -> Result<U, E> + 'static,
    {
        let upstream = self.clone();
        DeferredPromise::new(self.cell.inner.queue(), move |resolver| {
            resolver.resolve_with(&upstream.then(on_fulfilled, on_rejected));
            Ok(())
        })
    }

    pub fn deferred_catch<R>(&self, on_rejected: R) -> DeferredPromise<T, E>
    where
        R: FnOnce(E) -> Result<T, E> + 'static,
    {
        let upstream = self.clone();
        DeferredPromise::new(self.cell.inner.queue(), move |resolver| {
            resolver.resolve_with(&upstream.catch(on_rejected));
            Ok(())
        })
    }

    pub fn deferred_finally<F>(&self, on_settled: F) -> DeferredPromise<T, E>
    where
        F: FnOnce() -> Result<(), E> + 'static,
    {
        let upstream = self.clone();
        DeferredPromise::new(self.cell.inner.queue(), move |resolver| {
            resolver.resolve_with(&upstream.finally(on_settled));
            Ok(())
        })
    }

    #[must_use]
    pub fn state(&self) -> ScheduleState {
        self.cell.state.get()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.cell.state.get().is_scheduled()
    }

    /// How many continuations have been attached through any handle.
    #[must_use]
    pub fn continuation_count(&self) -> usize {
        self.cell.continuations.get()
    }

    /// Id of the inner promise.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.cell.inner.id()
    }

    /// Inspect the settlement. Does not attach, so never schedules.
    #[must_use]
    pub fn settlement(&self) -> Option<Settlement<T, E>> {
        self.cell.inner.settlement()
    }
}

impl<T, E> fmt::Debug for DeferredPromise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredPromise")
            .field("state", &self.cell.state.get())
            .field("continuations", &self.cell.continuations.get())
            .field("context", &self.cell.context)
            .finish_non_exhaustive()
    }
}

impl<T, E> IntoFuture for DeferredPromise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture::attach(self.attach())
    }
}

impl<T, E> IntoFuture for &DeferredPromise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture::attach(self.attach())
    }
}
