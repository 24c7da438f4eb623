//! Runnable demonstrations of deferred promise semantics.
//!
//! Each scenario checks its own expectations and fails with a description of
//! the broken guarantee, so the binary doubles as a smoke test.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Result, bail, ensure};

use deferred_core::{ContextVariable, DeferredPromise, ScheduleState};
use deferred_engine::EventLoop;

#[derive(Debug)]
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    run: fn(&EventLoop) -> Result<String>,
}

impl Scenario {
    pub fn run(&self, ev: &EventLoop) -> Result<String> {
        tracing::info!(scenario = self.name, "running scenario");
        (self.run)(ev)
    }
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "lazy",
        summary: "producer runs only once the promise is awaited",
        run: lazy,
    },
    Scenario {
        name: "context",
        summary: "producer sees the context from creation, not from consumption",
        run: context,
    },
    Scenario {
        name: "chain",
        summary: "deferred stages schedule upstream only when consumed",
        run: chain,
    },
    Scenario {
        name: "reject",
        summary: "a failing producer rejects without an early unhandled report",
        run: reject,
    },
];

/// All scenarios when `name` is `None`, otherwise the named one.
pub fn select(name: Option<&str>) -> Result<Vec<&'static Scenario>> {
    let Some(name) = name else {
        return Ok(SCENARIOS.iter().collect());
    };
    match SCENARIOS.iter().find(|s| s.name == name) {
        Some(scenario) => Ok(vec![scenario]),
        None => {
            let known: Vec<&str> = SCENARIOS.iter().map(|s| s.name).collect();
            bail!("unknown scenario `{name}` (expected one of: {})", known.join(", "))
        }
    }
}

fn lazy(ev: &EventLoop) -> Result<String> {
    let called = Rc::new(Cell::new(false));
    let flag = Rc::clone(&called);
    let dp = DeferredPromise::<u32, String>::new(ev.queue(), move |resolver| {
        flag.set(true);
        resolver.resolve(123);
        Ok(())
    });

    ev.block_on(ev.yield_macrotask());
    ensure!(!called.get(), "producer ran before anything consumed it");
    ensure!(dp.state() == ScheduleState::Unscheduled, "unconsumed promise was scheduled");

    let value = ev.block_on(dp.into_future()).map_err(anyhow::Error::msg)?;
    ensure!(called.get(), "producer did not run after await");
    ensure!(value == 123, "expected 123, got {value}");
    Ok(format!("awaited {value}; producer ran only after await"))
}

fn context(ev: &EventLoop) -> Result<String> {
    let request = ContextVariable::<&'static str>::new("request");

    let var = request.clone();
    let dp = request.run("created", || {
        DeferredPromise::<&'static str, String>::new(ev.queue(), move |resolver| {
            resolver.resolve(var.get().unwrap_or("unbound"));
            Ok(())
        })
    });

    let seen = request.run("consumed", || ev.block_on(dp.into_future()));
    let seen = seen.map_err(anyhow::Error::msg)?;
    ensure!(seen == "created", "producer saw `{seen}` instead of the creation context");
    ensure!(request.get().is_none(), "ambient context leaked out of the scenario");
    Ok(format!("producer saw request={seen} while consumed under request=consumed"))
}

fn chain(ev: &EventLoop) -> Result<String> {
    let steps: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&steps);
    let source = DeferredPromise::<u32, String>::new(ev.queue(), move |resolver| {
        log.borrow_mut().push("source");
        resolver.resolve(21);
        Ok(())
    });
    let log = Rc::clone(&steps);
    let doubled = source.deferred_then(
        move |v| {
            log.borrow_mut().push("double");
            Ok(v * 2)
        },
        Err,
    );
    let log = Rc::clone(&steps);
    let labelled = doubled.deferred_then(
        move |v| {
            log.borrow_mut().push("label");
            Ok(format!("answer={v}"))
        },
        Err,
    );

    ev.block_on(ev.yield_macrotask());
    ensure!(steps.borrow().is_empty(), "unconsumed chain ran: {:?}", steps.borrow());

    let out = ev
        .block_on(labelled.into_future())
        .map_err(anyhow::Error::msg)?;
    let order = steps.borrow().join(" -> ");
    if order != "source -> double -> label" {
        bail!("stages ran out of order: {order}");
    }
    Ok(format!("{out} via {order}"))
}

fn reject(ev: &EventLoop) -> Result<String> {
    let dp = DeferredPromise::<u32, String>::new(ev.queue(), |_| Err("x".to_string()));

    ev.block_on(ev.yield_macrotask());
    ensure!(
        ev.unhandled_rejections().is_empty(),
        "unconsumed rejection was reported"
    );

    let reason = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&reason);
    let caught = dp.catch(move |e| {
        *sink.borrow_mut() = Some(e);
        Ok(0)
    });
    let recovered = ev.block_on(caught.into_future()).map_err(anyhow::Error::msg)?;

    let reason = reason.borrow_mut().take();
    ensure!(reason.as_deref() == Some("x"), "catch saw {reason:?}");
    ensure!(recovered == 0, "catch result was {recovered}");
    ensure!(
        ev.unhandled_rejections().is_empty(),
        "rejection was reported despite the catch handler"
    );
    Ok("caught reason `x`; no unhandled rejection reported".to_string())
}
