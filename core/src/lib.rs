//! Promise runtime: the microtask queue, eager promises, and deferred promises.
//!
//! Everything here is single-threaded. A [`MicrotaskQueue`] handle is shared
//! by every promise created on it, and nothing runs until some driver performs
//! a checkpoint (see `deferred-engine` for an async driver).
//!
//! ```text
//! DeferredPromise ──attach──> "deferred producer" microtask
//!       │                          │ ContextSnapshot::enter
//!       │                          └─> producer(Resolver) ──> inner Promise settles
//!       └── inner: Promise ──reactions──> microtasks ──> derived Promise / PromiseFuture
//! ```

mod deferred;
mod future;
mod promise;
mod queue;

pub use deferred::DeferredPromise;
pub use future::PromiseFuture;
pub use promise::{Promise, Resolver};
pub use queue::MicrotaskQueue;

pub use deferred_context::{ContextSnapshot, ContextVariable};
pub use deferred_types::{PromiseId, PromiseState, ScheduleState, SettledKind, Settlement};
