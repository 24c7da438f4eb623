//! `.await` support for promises.
//!
//! Awaiting is a continuation like any other: the reaction is attached when
//! the future is created (at `into_future()`), not when it is first polled.
//! The future itself only observes the slot that the reaction fills in.

use std::cell::RefCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use deferred_types::{PromiseId, Settlement};

use crate::promise::Promise;

struct AwaitSlot<T, E> {
    settlement: Option<Settlement<T, E>>,
    waker: Option<Waker>,
}

/// Future returned by awaiting a [`Promise`] or
/// [`DeferredPromise`](crate::DeferredPromise).
///
/// Resolves to `Ok(value)` or `Err(reason)`. The settlement is only ever
/// delivered by a microtask, so some driver must keep performing checkpoints.
#[must_use = "futures do nothing unless polled"]
pub struct PromiseFuture<T, E> {
    promise: PromiseId,
    slot: Rc<RefCell<AwaitSlot<T, E>>>,
}

impl<T, E> PromiseFuture<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub(crate) fn attach(promise: &Promise<T, E>) -> Self {
        let slot = Rc::new(RefCell::new(AwaitSlot {
            settlement: None,
            waker: None,
        }));
        let filled = Rc::clone(&slot);
        promise.add_reaction(Box::new(move |settlement| {
            let waker = {
                let mut slot = filled.borrow_mut();
                slot.settlement = Some(settlement);
                slot.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }));
        Self {
            promise: promise.id(),
            slot,
        }
    }
}

impl<T, E> Future for PromiseFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(settlement) = slot.settlement.take() {
            return Poll::Ready(settlement.into_result());
        }
        match &slot.waker {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            _ => slot.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<T, E> fmt::Debug for PromiseFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseFuture")
            .field("promise", &self.promise)
            .field("ready", &self.slot.borrow().settlement.is_some())
            .finish()
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture::attach(&self)
    }
}

impl<T, E> IntoFuture for &Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture::attach(self)
    }
}
