//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use deferred_core::{DeferredPromise, MicrotaskQueue};
use deferred_engine::EventLoop;

pub type Reason = String;

pub fn event_loop() -> EventLoop {
    EventLoop::new().expect("current-thread runtime builds")
}

/// Shared call counter for producers and handlers.
#[derive(Clone, Default)]
pub struct Calls(Rc<Cell<usize>>);

impl Calls {
    pub fn hit(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }
}

/// Ordered record of named steps.
#[derive(Clone, Default)]
pub struct Steps(Rc<RefCell<Vec<&'static str>>>);

impl Steps {
    pub fn push(&self, step: &'static str) {
        self.0.borrow_mut().push(step);
    }

    pub fn taken(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }
}

/// A deferred promise that counts producer runs and resolves with `value`.
pub fn counting<T: Clone + 'static>(
    queue: &MicrotaskQueue,
    calls: &Calls,
    value: T,
) -> DeferredPromise<T, Reason> {
    let calls = calls.clone();
    DeferredPromise::new(queue, move |resolver| {
        calls.hit();
        resolver.resolve(value);
        Ok(())
    })
}

/// A deferred promise whose producer fails with `reason`.
pub fn failing<T: Clone + 'static>(
    queue: &MicrotaskQueue,
    calls: &Calls,
    reason: &str,
) -> DeferredPromise<T, Reason> {
    let calls = calls.clone();
    let reason = reason.to_string();
    DeferredPromise::new(queue, move |_| {
        calls.hit();
        Err(reason)
    })
}
