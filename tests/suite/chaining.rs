//! Eager and deferred chaining across stages.

use std::future::IntoFuture;

use deferred_core::{DeferredPromise, Promise, ScheduleState, SettledKind};

use crate::common::{Calls, Reason, Steps, counting, event_loop, failing};

#[test]
fn unconsumed_deferred_chain_runs_nothing() {
    let ev = event_loop();
    let calls = Calls::default();
    let steps = Steps::default();

    let a = counting(ev.queue(), &calls, 1_i32);
    let (s1, s2) = (steps.clone(), steps.clone());
    let b = a.deferred_then(
        move |v| {
            s1.push("f");
            Ok(v + 1)
        },
        Err,
    );
    let c = b.deferred_then(
        move |v| {
            s2.push("g");
            Ok(v * 100)
        },
        Err,
    );

    ev.block_on(ev.yield_macrotask());
    assert_eq!(calls.count(), 0);
    assert!(steps.taken().is_empty());
    for state in [a.state(), b.state(), c.state()] {
        assert_eq!(state, ScheduleState::Unscheduled);
    }
}

#[test]
fn consuming_second_stage_runs_first() {
    let ev = event_loop();
    let calls = Calls::default();
    let steps = Steps::default();

    let a = counting(ev.queue(), &calls, 1_i32);
    let (s1, s2) = (steps.clone(), steps.clone());
    let c = a
        .deferred_then(
            move |v| {
                s1.push("f");
                Ok(v + 1)
            },
            Err,
        )
        .deferred_then(
            move |v| {
                s2.push("g");
                Ok(v * 100)
            },
            Err,
        );

    assert_eq!(ev.block_on(c.into_future()), Ok(200));
    assert_eq!(calls.count(), 1);
    assert_eq!(steps.taken(), vec!["f", "g"]);
}

#[test]
fn consuming_first_stage_leaves_second_unscheduled() {
    let ev = event_loop();
    let calls = Calls::default();
    let steps = Steps::default();

    let a = counting(ev.queue(), &calls, 3_i32);
    let s = steps.clone();
    let b = a.deferred_then(
        move |v| {
            s.push("f");
            Ok(v)
        },
        Err,
    );

    assert_eq!(ev.block_on((&a).into_future()), Ok(3));
    assert!(steps.taken().is_empty());
    assert_eq!(b.state(), ScheduleState::Unscheduled);
}

#[test]
fn stage_scheduling_is_per_stage() {
    let ev = event_loop();
    let calls = Calls::default();
    let a = counting(ev.queue(), &calls, 2_u8);
    let b = a.deferred_then(|v| Ok(v + 1), Err);

    let _ = b.then(Ok, Err);
    assert_eq!(b.state(), ScheduleState::Scheduled);
    assert_eq!(a.state(), ScheduleState::Unscheduled, "upstream schedules from b's producer");

    ev.run_until_idle();
    assert_eq!(a.state(), ScheduleState::Settled(SettledKind::Fulfilled));
    assert_eq!(b.state(), ScheduleState::Settled(SettledKind::Fulfilled));
}

#[test]
fn deferred_catch_and_finally_compose() {
    let ev = event_loop();
    let calls = Calls::default();
    let cleanup = Calls::default();

    let source = failing::<u32>(ev.queue(), &calls, "disk full");
    let hook = cleanup.clone();
    let recovered = source
        .deferred_catch(|reason| Ok(u32::try_from(reason.len()).unwrap_or(0)))
        .deferred_finally(move || {
            hook.hit();
            Ok(())
        });

    ev.block_on(ev.yield_macrotask());
    assert_eq!((calls.count(), cleanup.count()), (0, 0));

    assert_eq!(ev.block_on(recovered.into_future()), Ok(9));
    assert_eq!((calls.count(), cleanup.count()), (1, 1));
    assert!(ev.unhandled_rejections().is_empty());
}

#[test]
fn eager_chain_from_deferred_returns_promise() {
    let ev = event_loop();
    let calls = Calls::default();
    let dp = counting(ev.queue(), &calls, 6_i32);

    let chained: Promise<String, Reason> = dp
        .then(|v| Ok(v * 7), Err)
        .then(|v| Ok(format!("{v}")), Err);
    assert_eq!(ev.block_on(chained.into_future()), Ok("42".to_string()));
}

#[test]
fn producer_can_adopt_an_eager_promise() {
    let ev = event_loop();
    let (eager, resolver) = Promise::<&'static str, Reason>::pending(ev.queue());
    let source = eager.clone();
    let dp = DeferredPromise::new(ev.queue(), move |r| {
        r.resolve_with(&source);
        Ok(())
    });

    let out = dp.then(Ok, Err);
    ev.block_on(ev.yield_macrotask());
    assert_eq!(dp.state(), ScheduleState::Scheduled);

    resolver.resolve("adopted");
    assert_eq!(ev.block_on(out.into_future()), Ok("adopted"));
    assert_eq!(dp.state(), ScheduleState::Settled(SettledKind::Fulfilled));
}
