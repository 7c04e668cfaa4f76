//! Lifecycle of one elevation.
//!
//! ```text
//! Idle ──► Granting ──► Granted ──► Running ──► Revoking ──► Done
//!             │            │           │           │
//!             └────────────┴───────────┴───────────┴──► Failed
//! ```
//!
//! `Granted ──► Done` is also valid: under the deferred strategy the
//! invocation finishes while the revoke is still scheduled.
//!
//! Any other transition is an [`InvalidTransition`]; the service fails
//! the invocation with a generic error when it sees one.

use elevate_auth::SudoError;
use std::fmt;
use thiserror::Error;

/// Phase of an elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElevationPhase {
    #[default]
    Idle,
    /// Adding the user to the privileges group.
    Granting,
    Granted,
    /// The elevated command is running.
    Running,
    /// Removing the user from the privileges group.
    Revoking,
    Done,
    Failed,
}

impl ElevationPhase {
    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow `self`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use ElevationPhase::*;
        match (self, next) {
            (Idle, Granting)
            | (Granting, Granted)
            | (Granted, Running)
            | (Granted, Done)
            | (Running, Revoking)
            | (Revoking, Done) => true,
            (from, Failed) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

impl fmt::Display for ElevationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Granting => "granting",
            Self::Granted => "granted",
            Self::Running => "running",
            Self::Revoking => "revoking",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// A phase change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid elevation transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ElevationPhase,
    pub to: ElevationPhase,
}

impl From<InvalidTransition> for SudoError {
    fn from(e: InvalidTransition) -> Self {
        SudoError::internal(e.to_string())
    }
}

/// Tracks the phase of one invocation and traces every transition.
#[derive(Debug, Default)]
pub struct Elevation {
    phase: ElevationPhase,
}

impl Elevation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> ElevationPhase {
        self.phase
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// [`InvalidTransition`] if `next` may not follow the current phase.
    /// The phase is left unchanged.
    pub fn advance(&mut self, next: ElevationPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(from = %self.phase, to = %next, "invalid elevation transition");
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!(from = %self.phase, to = %next, "elevation phase");
        self.phase = next;
        Ok(())
    }

    /// Moves to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = ElevationPhase::Failed;
        }
    }
}
