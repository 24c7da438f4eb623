//! Eager promises and their resolving functions.
//!
//! [`Promise`] is the standard, eagerly evaluated promise: the executor passed
//! to [`Promise::new`] runs immediately. It is also the `innerPromise` of every
//! [`DeferredPromise`](crate::DeferredPromise) and the result type of
//! `then`/`catch`/`finally`.
//!
//! Settlement happens through a [`Resolver`]. Reactions attached with
//! `then`/`catch`/`finally` always run as microtasks, never synchronously,
//! whether the promise is pending or already settled when they are attached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use deferred_types::{PromiseId, PromiseState, SettledKind, Settlement};

use crate::queue::{MicrotaskQueue, RejectionOp};

type Reaction<T, E> = Box<dyn FnOnce(Settlement<T, E>)>;
type SettleHook = Box<dyn FnOnce(SettledKind)>;

enum Slot<T, E> {
    Pending {
        reactions: Vec<Reaction<T, E>>,
        hooks: Vec<SettleHook>,
    },
    Settled(Settlement<T, E>),
}

struct PromiseCell<T, E> {
    id: PromiseId,
    queue: MicrotaskQueue,
    slot: RefCell<Slot<T, E>>,
    /// Whether any reaction was ever attached. Settle hooks do not count.
    handled: Cell<bool>,
}

/// An eager, single-threaded promise of `Result<T, E>`.
///
/// Cloning yields another handle to the same promise.
pub struct Promise<T, E> {
    cell: Rc<PromiseCell<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Create a promise and run `executor` synchronously.
    ///
    /// An `Err` returned by the executor rejects the promise unless the
    /// executor already settled it.
    pub fn new<P>(queue: &MicrotaskQueue, executor: P) -> Self
    where
        P: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (promise, resolver) = Self::pending(queue);
        if let Err(reason) = executor(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// A pending promise together with the resolver that settles it.
    #[must_use]
    pub fn pending(queue: &MicrotaskQueue) -> (Self, Resolver<T, E>) {
        let promise = Self {
            cell: Rc::new(PromiseCell {
                id: PromiseId::next(),
                queue: queue.clone(),
                slot: RefCell::new(Slot::Pending {
                    reactions: Vec::new(),
                    hooks: Vec::new(),
                }),
                handled: Cell::new(false),
            }),
        };
        let resolver = Resolver {
            promise: promise.clone(),
            resolved: Rc::new(Cell::new(false)),
        };
        (promise, resolver)
    }

    #[must_use]
    pub fn resolved(queue: &MicrotaskQueue, value: T) -> Self {
        let (promise, resolver) = Self::pending(queue);
        resolver.resolve(value);
        promise
    }

    #[must_use]
    pub fn rejected(queue: &MicrotaskQueue, reason: E) -> Self {
        let (promise, resolver) = Self::pending(queue);
        resolver.reject(reason);
        promise
    }

    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.cell.id
    }

    #[must_use]
    pub fn state(&self) -> PromiseState {
        match &*self.cell.slot.borrow() {
            Slot::Pending { .. } => PromiseState::Pending,
            Slot::Settled(settlement) => settlement.kind().into(),
        }
    }

    /// The settlement, if any, without attaching a reaction.
    #[must_use]
    pub fn settlement(&self) -> Option<Settlement<T, E>> {
        match &*self.cell.slot.borrow() {
            Slot::Pending { .. } => None,
            Slot::Settled(settlement) => Some(settlement.clone()),
        }
    }

    /// Chain handlers for both outcomes.
    ///
    /// The returned promise settles with whatever the invoked handler returns.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
        R: FnOnce(E) -> Result<U, E> + 'static,
    {
        let (derived, resolver) = Promise::<U, E>::pending(&self.cell.queue);
        self.add_reaction(Box::new(move |settlement| {
            let outcome = match settlement {
                Settlement::Fulfilled(value) => on_fulfilled(value),
                Settlement::Rejected(reason) => on_rejected(reason),
            };
            resolver.settle(outcome.into());
        }));
        derived
    }

    /// Chain a rejection handler; fulfilment passes through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<T, E> + 'static,
    {
        self.then(Ok, on_rejected)
    }

    /// Run `on_settled` after either outcome.
    ///
    /// The original settlement passes through unless `on_settled` fails, in
    /// which case the returned promise rejects with that error.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<(), E> + 'static,
    {
        let (derived, resolver) = Self::pending(&self.cell.queue);
        self.add_reaction(Box::new(move |settlement| match on_settled() {
            Ok(()) => resolver.settle(settlement),
            Err(reason) => resolver.reject(reason),
        }));
        derived
    }

    pub(crate) fn queue(&self) -> &MicrotaskQueue {
        &self.cell.queue
    }

    /// Attach a reaction; it runs as a microtask once the promise settles.
    pub(crate) fn add_reaction(&self, reaction: Reaction<T, E>) {
        let was_handled = self.cell.handled.replace(true);
        let mut slot = self.cell.slot.borrow_mut();
        let settlement = match &mut *slot {
            Slot::Pending { reactions, .. } => {
                reactions.push(reaction);
                return;
            }
            Slot::Settled(settlement) => settlement.clone(),
        };
        drop(slot);

        if settlement.is_rejected() && !was_handled {
            self.cell.queue.track_rejection(self.cell.id, RejectionOp::Handle);
        }
        self.cell
            .queue
            .enqueue("promise reaction", move || reaction(settlement));
    }

    /// Observe settlement synchronously, without counting as a handler.
    ///
    /// Runs immediately if the promise is already settled.
    pub(crate) fn on_settle(&self, hook: impl FnOnce(SettledKind) + 'static) {
        let mut slot = self.cell.slot.borrow_mut();
        let kind = match &mut *slot {
            Slot::Pending { hooks, .. } => {
                hooks.push(Box::new(hook));
                return;
            }
            Slot::Settled(settlement) => settlement.kind(),
        };
        drop(slot);
        hook(kind);
    }

    /// Move from pending to settled. A second settlement is ignored.
    fn settle(&self, settlement: Settlement<T, E>) {
        let (reactions, hooks) = {
            let mut slot = self.cell.slot.borrow_mut();
            match &mut *slot {
                Slot::Settled(_) => {
                    tracing::trace!(promise = %self.cell.id, "settlement ignored: already settled");
                    return;
                }
                Slot::Pending { reactions, hooks } => {
                    let taken = (std::mem::take(reactions), std::mem::take(hooks));
                    *slot = Slot::Settled(settlement.clone());
                    taken
                }
            }
        };

        let kind = settlement.kind();
        tracing::debug!(
            promise = %self.cell.id,
            outcome = %kind,
            reactions = reactions.len(),
            "promise settled"
        );

        if kind == SettledKind::Rejected && reactions.is_empty() && !self.cell.handled.get() {
            self.cell.queue.track_rejection(self.cell.id, RejectionOp::Reject);
        }
        for hook in hooks {
            hook(kind);
        }
        for reaction in reactions {
            let settlement = settlement.clone();
            self.cell
                .queue
                .enqueue("promise reaction", move || reaction(settlement));
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.cell.slot.borrow() {
            Slot::Pending { .. } => PromiseState::Pending,
            Slot::Settled(settlement) => settlement.kind().into(),
        };
        f.debug_struct("Promise")
            .field("id", &self.cell.id)
            .field("state", &state)
            .finish()
    }
}

/// The resolving functions of a promise.
///
/// All clones share one "already resolved" flag: the first call to
/// [`resolve`](Self::resolve), [`reject`](Self::reject),
/// [`settle`](Self::settle) or [`resolve_with`](Self::resolve_with) wins and
/// every later call is silently ignored.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
    resolved: Rc<Cell<bool>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            resolved: Rc::clone(&self.resolved),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn resolve(&self, value: T) {
        self.settle(Settlement::Fulfilled(value));
    }

    pub fn reject(&self, reason: E) {
        self.settle(Settlement::Rejected(reason));
    }

    pub fn settle(&self, settlement: Settlement<T, E>) {
        if self.lock(settlement.kind().as_str()) {
            self.promise.settle(settlement);
        }
    }

    /// Resolve with another promise: this promise follows `other`'s eventual
    /// settlement.
    ///
    /// The resolver is locked immediately; the subscription to `other` is
    /// made one microtask later. Resolving a promise with itself can never
    /// settle, so it is logged and the promise stays pending.
    pub fn resolve_with(&self, other: &Promise<T, E>) {
        if !self.lock("resolve_with") {
            return;
        }
        if Rc::ptr_eq(&self.promise.cell, &other.cell) {
            tracing::warn!(promise = %other.id(), "promise resolved with itself; it will never settle");
            return;
        }

        let target = self.promise.clone();
        let source = other.clone();
        tracing::trace!(promise = %target.id(), source = %source.id(), "adopting promise");
        self.promise.queue().enqueue("adopt promise", move || {
            source.add_reaction(Box::new(move |settlement| target.settle(settlement)));
        });
    }

    /// Whether a resolving call has already been made.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.get()
    }

    /// Id of the promise this resolver settles.
    #[must_use]
    pub fn promise_id(&self) -> PromiseId {
        self.promise.id()
    }

    fn lock(&self, op: &'static str) -> bool {
        if self.resolved.replace(true) {
            tracing::trace!(promise = %self.promise.id(), op, "resolver call ignored: already resolved");
            false
        } else {
            true
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise.cell.id)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
