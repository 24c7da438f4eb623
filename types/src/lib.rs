//! Core domain types for deferred promises.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the runtime.

mod ids;
mod schedule;

pub use ids::PromiseId;
pub use schedule::{AttachOutcome, ScheduleState, ScheduleTransitionError};

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Promise State
// ============================================================================

/// How a promise settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettledKind {
    Fulfilled,
    Rejected,
}

impl SettledKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SettledKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a standard (eager) promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PromiseState {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseState {
    #[must_use]
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }

    #[must_use]
    pub fn settled_kind(self) -> Option<SettledKind> {
        match self {
            Self::Pending => None,
            Self::Fulfilled => Some(SettledKind::Fulfilled),
            Self::Rejected => Some(SettledKind::Rejected),
        }
    }
}

impl From<SettledKind> for PromiseState {
    fn from(kind: SettledKind) -> Self {
        match kind {
            SettledKind::Fulfilled => Self::Fulfilled,
            SettledKind::Rejected => Self::Rejected,
        }
    }
}

// ============================================================================
// Settlement
// ============================================================================

/// The outcome a settled promise delivers to its reactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settlement<T, E> {
    #[must_use]
    pub fn kind(&self) -> SettledKind {
        match self {
            Self::Fulfilled(_) => SettledKind::Fulfilled,
            Self::Rejected(_) => SettledKind::Rejected,
        }
    }

    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settlement<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(reason) => Self::Rejected(reason),
        }
    }
}

impl<T, E> From<Settlement<T, E>> for Result<T, E> {
    fn from(settlement: Settlement<T, E>) -> Self {
        settlement.into_result()
    }
}
