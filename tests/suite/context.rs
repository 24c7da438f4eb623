//! Producers observe the ambient context captured at construction.

use std::cell::RefCell;
use std::rc::Rc;

use deferred_context::{ContextSnapshot, ContextVariable};
use deferred_core::DeferredPromise;

use crate::common::{Reason, event_loop};

fn reading_producer(
    ev: &deferred_engine::EventLoop,
    var: &ContextVariable<&'static str>,
) -> DeferredPromise<Option<&'static str>, Reason> {
    let var = var.clone();
    DeferredPromise::new(ev.queue(), move |resolver| {
        resolver.resolve(var.get());
        Ok(())
    })
}

#[test]
fn producer_sees_creation_context_not_consumer_context() {
    let ev = event_loop();
    let tenant = ContextVariable::new("tenant");

    let dp = tenant.run("acme", || reading_producer(&ev, &tenant));
    let seen = tenant.run("globex", || ev.block_on(dp.into_future()));

    assert_eq!(seen, Ok(Some("acme")));
    assert_eq!(tenant.get(), None);
}

#[test]
fn producer_created_outside_any_binding_sees_unbound() {
    let ev = event_loop();
    let tenant = ContextVariable::new("tenant");

    let dp = reading_producer(&ev, &tenant);
    let seen = tenant.run("late", || ev.block_on(dp.into_future()));
    assert_eq!(seen, Ok(None));
}

#[test]
fn default_value_applies_when_unbound_at_creation() {
    let ev = event_loop();
    let locale = ContextVariable::with_default("locale", "en");

    let dp = reading_producer(&ev, &locale);
    let seen = locale.run("fr", || ev.block_on(dp.into_future()));
    assert_eq!(seen, Ok(Some("en")));
}

#[test]
fn independent_promises_keep_their_own_snapshots() {
    let ev = event_loop();
    let user = ContextVariable::new("user");

    let first = user.run("ada", || reading_producer(&ev, &user));
    let second = user.run("grace", || reading_producer(&ev, &user));

    let (a, b) = ev.block_on(async { (second.await, first.await) });
    assert_eq!(a, Ok(Some("grace")));
    assert_eq!(b, Ok(Some("ada")));
}

#[test]
fn snapshot_covers_every_variable_in_scope() {
    let ev = event_loop();
    let user = ContextVariable::<&'static str>::new("user");
    let trace = ContextVariable::<u64>::new("trace");
    let seen = Rc::new(RefCell::new(None));

    let (u, t, sink) = (user.clone(), trace.clone(), Rc::clone(&seen));
    let dp = user.run("ada", || {
        trace.run(7, || {
            DeferredPromise::<(), Reason>::new(ev.queue(), move |resolver| {
                *sink.borrow_mut() = Some((u.get(), t.get(), ContextSnapshot::capture().len()));
                resolver.resolve(());
                Ok(())
            })
        })
    });

    assert_eq!(ev.block_on(dp.into_future()), Ok(()));
    assert_eq!(*seen.borrow(), Some((Some("ada"), Some(7), 2)));
}

#[test]
fn context_restored_after_failing_producer() {
    let ev = event_loop();
    let phase = ContextVariable::new("phase");

    let var = phase.clone();
    let dp = phase.run("setup", || {
        DeferredPromise::<(), Reason>::new(ev.queue(), move |_| {
            Err(format!("failed during {}", var.get().unwrap_or("?")))
        })
    });

    phase.run("teardown", || {
        let out = ev.block_on(dp.into_future());
        assert_eq!(out, Err("failed during setup".to_string()));
        assert_eq!(phase.get(), Some("teardown"));
    });
}
