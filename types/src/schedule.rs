//! Scheduling state of a deferred promise.
//!
//! # State Machine
//! ```text
//! ┌──────────────┐  first attach   ┌────────────┐  inner settles  ┌───────────────────┐
//! │ Unscheduled  │ ──────────────> │ Scheduled  │ ──────────────> │ Settled(kind)     │
//! └──────────────┘                 └────────────┘                 └───────────────────┘
//! ```
//!
//! Transitions only move forward. `attach()` is the test-and-set that decides
//! whether the caller must enqueue the producer microtask.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SettledKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScheduleState {
    /// Producer stored, nothing queued.
    #[default]
    Unscheduled,
    /// Producer microtask queued (or already running); awaiting settlement.
    Scheduled,
    /// Inner promise settled.
    Settled(SettledKind),
}

/// Result of [`ScheduleState::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// This attachment performed `Unscheduled -> Scheduled`; the caller owns
    /// the obligation to enqueue the producer.
    Scheduled,
    AlreadyScheduled,
    AlreadySettled,
}

impl AttachOutcome {
    #[must_use]
    pub fn must_schedule(self) -> bool {
        self == Self::Scheduled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid schedule transition from {from} to {to}")]
pub struct ScheduleTransitionError {
    pub from: ScheduleState,
    pub to: ScheduleState,
}

impl ScheduleState {
    #[must_use]
    pub fn is_unscheduled(self) -> bool {
        self == Self::Unscheduled
    }

    /// Scheduled or settled: the producer has been (or will be) invoked.
    #[must_use]
    pub fn is_scheduled(self) -> bool {
        !self.is_unscheduled()
    }

    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Settled(_))
    }

    #[must_use]
    pub fn settled_kind(self) -> Option<SettledKind> {
        match self {
            Self::Settled(kind) => Some(kind),
            Self::Unscheduled | Self::Scheduled => None,
        }
    }

    /// Record a continuation attachment.
    ///
    /// Only the first call on an `Unscheduled` state moves it to `Scheduled`
    /// and reports [`AttachOutcome::Scheduled`]; every later call is a no-op.
    pub fn attach(&mut self) -> AttachOutcome {
        match *self {
            Self::Unscheduled => {
                *self = Self::Scheduled;
                AttachOutcome::Scheduled
            }
            Self::Scheduled => AttachOutcome::AlreadyScheduled,
            Self::Settled(_) => AttachOutcome::AlreadySettled,
        }
    }

    /// Transition: `Scheduled -> Settled(kind)`.
    ///
    /// Settling an unscheduled state would mean the producer ran without a
    /// consumer; settling twice would mean the inner promise settled twice.
    /// Both are rejected and leave the state untouched.
    pub fn settle(&mut self, kind: SettledKind) -> Result<(), ScheduleTransitionError> {
        let to = Self::Settled(kind);
        match *self {
            Self::Scheduled => {
                *self = to;
                Ok(())
            }
            from @ (Self::Unscheduled | Self::Settled(_)) => {
                Err(ScheduleTransitionError { from, to })
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unscheduled => "unscheduled",
            Self::Scheduled => "scheduled",
            Self::Settled(SettledKind::Fulfilled) => "settled(fulfilled)",
            Self::Settled(SettledKind::Rejected) => "settled(rejected)",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
