//! Event loop for the deferred promise runtime.
//!
//! Pairs a tokio current-thread runtime and `LocalSet` with a
//! [`MicrotaskQueue`]. Futures passed to [`EventLoop::block_on`] can `.await`
//! promises and deferred promises directly; a local driver task keeps the
//! microtask queue drained while they run.

mod driver;

use std::cell::Cell;
use std::future::Future;
use std::panic;
use std::pin::pin;

use futures_util::future::{Either, select};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::task::LocalSet;

use deferred_config::RuntimeConfig;
use deferred_core::{MicrotaskQueue, PromiseId};

pub use driver::{RejectionLog, drive_microtasks};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build tokio runtime")]
    Runtime(#[source] std::io::Error),
}

/// A single-threaded event loop owning one microtask queue.
pub struct EventLoop {
    runtime: Runtime,
    local: LocalSet,
    queue: MicrotaskQueue,
    config: RuntimeConfig,
    rejections: RejectionLog,
    /// Set while `block_on` has a driver task running.
    driving: Cell<bool>,
}

impl EventLoop {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, EngineError> {
        let runtime = Builder::new_current_thread()
            .build()
            .map_err(EngineError::Runtime)?;
        tracing::debug!(
            budget = config.checkpoint_budget(),
            report = config.report_unhandled_rejections(),
            "event loop created"
        );
        Ok(Self {
            runtime,
            local: LocalSet::new(),
            queue: MicrotaskQueue::new(),
            config,
            rejections: RejectionLog::default(),
            driving: Cell::new(false),
        })
    }

    /// The queue every promise on this loop should be created with.
    #[must_use]
    pub fn queue(&self) -> &MicrotaskQueue {
        &self.queue
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `future` to completion while a local task drains the microtask
    /// queue.
    ///
    /// A panic inside a microtask (a panicking producer or handler) stops the
    /// driver and is resumed on the caller's thread. Must not be called from
    /// inside another runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut driver = self.local.spawn_local(drive_microtasks(
            self.queue.clone(),
            &self.config,
            self.rejections.clone(),
        ));
        let _driving = DrivingGuard::enter(&self.driving);

        let outcome = self.local.block_on(&self.runtime, async {
            match select(pin!(future), &mut driver).await {
                Either::Left((output, _)) => Ok(output),
                Either::Right((stopped, _)) => Err(stopped),
            }
        });
        driver.abort();

        match outcome {
            Ok(output) => output,
            Err(Ok(())) => unreachable!("microtask driver never completes"),
            Err(Err(err)) => match err.try_into_panic() {
                Ok(payload) => {
                    tracing::error!("microtask panicked; resuming on the caller");
                    panic::resume_unwind(payload)
                }
                Err(err) => panic!("microtask driver stopped: {err}"),
            },
        }
    }

    /// Synchronously drain the queue, then collect unhandled rejections.
    /// Returns the number of microtasks run.
    pub fn run_until_idle(&self) -> usize {
        let ran = self.queue.perform_checkpoint();
        self.rejections
            .collect(&self.queue, self.config.report_unhandled_rejections());
        ran
    }

    /// Yield to the event loop until the microtask queue has been drained.
    ///
    /// The `await sleep(0)` of this runtime: everything already queued, and
    /// everything those microtasks queue in turn, has run when this returns.
    /// Polled outside [`block_on`](Self::block_on) there is no driver to yield
    /// to, so the queue is drained inline instead.
    pub async fn yield_macrotask(&self) {
        if !self.driving.get() {
            tracing::warn!("yield_macrotask outside block_on; draining inline");
            self.run_until_idle();
            return;
        }
        tokio::task::yield_now().await;
        while !self.queue.is_empty() {
            tokio::task::yield_now().await;
        }
    }

    /// Promises that finished a checkpoint rejected with no handler, since
    /// the loop was created or last drained.
    #[must_use]
    pub fn unhandled_rejections(&self) -> Vec<PromiseId> {
        self.rejections.snapshot()
    }

    /// Like [`unhandled_rejections`](Self::unhandled_rejections), but clears
    /// the record. Long-lived loops should drain it periodically.
    #[must_use]
    pub fn take_unhandled_rejections(&self) -> Vec<PromiseId> {
        self.rejections.take()
    }
}

struct DrivingGuard<'a>(&'a Cell<bool>);

impl<'a> DrivingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DrivingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
