//! Producer errors become ordinary rejections, observed only once consumed.

use std::cell::RefCell;
use std::future::IntoFuture;
use std::rc::Rc;

use deferred_core::{DeferredPromise, Promise, ScheduleState, SettledKind, Settlement};

use crate::common::{Calls, Reason, event_loop, failing};

#[test]
fn failing_producer_observed_by_first_catch() {
    let ev = event_loop();
    let calls = Calls::default();
    let dp = failing::<u8>(ev.queue(), &calls, "x");

    ev.block_on(ev.yield_macrotask());
    assert!(ev.unhandled_rejections().is_empty());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let caught = dp.catch(move |reason| {
        sink.borrow_mut().push(reason);
        Ok(0)
    });
    assert_eq!(ev.block_on(caught.into_future()), Ok(0));

    assert_eq!(*seen.borrow(), vec!["x".to_string()]);
    assert_eq!(dp.state(), ScheduleState::Settled(SettledKind::Rejected));
    assert!(ev.unhandled_rejections().is_empty());
}

#[test]
fn awaiting_failed_producer_yields_err() {
    let ev = event_loop();
    let calls = Calls::default();
    let dp = failing::<u8>(ev.queue(), &calls, "boom");
    assert_eq!(ev.block_on(dp.into_future()), Err("boom".to_string()));
    assert_eq!(calls.count(), 1);
}

#[test]
fn rejection_propagates_through_deferred_stages() {
    let ev = event_loop();
    let calls = Calls::default();
    let handler = Calls::default();
    let hit = handler.clone();

    let dp = failing::<u8>(ev.queue(), &calls, "upstream")
        .deferred_then(
            move |v| {
                hit.hit();
                Ok(v)
            },
            Err,
        )
        .deferred_then(|v| Ok(u32::from(v)), Err);

    assert_eq!(ev.block_on(dp.into_future()), Err("upstream".to_string()));
    assert_eq!(handler.count(), 0);
    assert!(ev.unhandled_rejections().is_empty());
}

#[test]
fn settlement_after_resolve_is_silently_ignored() {
    let ev = event_loop();
    let dp = DeferredPromise::<u8, Reason>::new(ev.queue(), |resolver| {
        resolver.resolve(1);
        resolver.reject("second".to_string());
        resolver.resolve(2);
        Err("thrown after settle".to_string())
    });
    assert_eq!(ev.block_on(dp.into_future()), Ok(1));
    assert!(ev.unhandled_rejections().is_empty());
}

#[test]
fn finally_error_replaces_settlement() {
    let ev = event_loop();
    let calls = Calls::default();
    let dp = crate::common::counting(ev.queue(), &calls, 5_u8);
    let out = dp.finally(|| Err("cleanup".to_string()));
    assert_eq!(ev.block_on(out.into_future()), Err("cleanup".to_string()));
}

#[test]
fn eager_rejection_without_handler_is_reported() {
    let ev = event_loop();
    let lost = Promise::<u8, Reason>::rejected(ev.queue(), "nobody listens".to_string());
    let handled = Promise::<u8, Reason>::rejected(ev.queue(), "somebody listens".to_string());
    let _ = handled.catch(|_| Ok(0));

    ev.block_on(ev.yield_macrotask());
    assert_eq!(ev.unhandled_rejections(), vec![lost.id()]);
    assert_eq!(
        handled.settlement(),
        Some(Settlement::Rejected("somebody listens".to_string()))
    );
}

#[test]
fn rejected_stage_with_unconsumed_continuation_is_reported() {
    let ev = event_loop();
    let calls = Calls::default();
    let dp = failing::<u8>(ev.queue(), &calls, "ignored result");

    // The derived promise rejects and nothing handles it.
    let derived = dp.then(Ok, Err);
    ev.block_on(ev.yield_macrotask());
    assert_eq!(ev.unhandled_rejections(), vec![derived.id()]);
}
