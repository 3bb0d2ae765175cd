//! Lifecycle state machine.
//!
//! ```text
//!                 setup ok
//!  Uninitialized ─────────▶ Configured ──start──▶ Started ◀──start── Stopped
//!        ▲                      │                   │                  ▲  │
//!        │                      │                   └──────stop────────┘  │
//!        │ invalidate           └────────teardown──▶ TornDown ◀─teardown──┘
//!        └── (Configured | Started | Stopped)
//! ```
//!
//! [`plan`] is a pure function over `(state, operation)`. The manager calls it
//! before touching the hardware, so an illegal request never reaches the
//! session.

use std::fmt;

/// Lifecycle state of one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Nothing negotiated yet, or invalidated after a failed resume.
    #[default]
    Uninitialized,
    /// Parameters negotiated, hardware active, not rendering.
    Configured,
    /// Rendering.
    Started,
    /// Rendering stopped, hardware still active.
    Stopped,
    /// Resources released. Terminal.
    TornDown,
}

impl LifecycleState {
    /// Whether negotiated parameters are exposed in this state.
    pub fn is_negotiated(self) -> bool {
        matches!(self, Self::Configured | Self::Started)
    }

    /// Whether the session is still active in this state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Configured | Self::Started | Self::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::TornDown => "torn down",
        };
        f.write_str(s)
    }
}

/// Operations that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Negotiate and activate.
    Setup,
    /// Arm the hardware.
    Start,
    /// Disarm the hardware.
    Stop,
    /// Deactivate and release.
    Teardown,
    /// Drop back to `Uninitialized` after an unrecoverable interruption.
    Invalidate,
}

impl Operation {
    /// Lowercase name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Teardown => "teardown",
            Self::Invalidate => "invalidate",
        }
    }
}

/// Outcome of planning an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Perform the operation, then enter this state.
    Move(LifecycleState),
    /// Already there. Succeed without touching the hardware.
    Stay,
}

/// An operation that is not allowed in the given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// State at the time of the request.
    pub state: LifecycleState,
    /// Rejected operation.
    pub operation: Operation,
}

/// Decide what `operation` does from `state`.
pub fn plan(state: LifecycleState, operation: Operation) -> Result<Step, InvalidTransition> {
    use LifecycleState::{Configured, Started, Stopped, TornDown, Uninitialized};

    let step = match (operation, state) {
        (Operation::Setup, Uninitialized) => Step::Move(Configured),

        (Operation::Start, Configured | Stopped) => Step::Move(Started),
        (Operation::Start, Started) => Step::Stay,

        (Operation::Stop, Started) => Step::Move(Stopped),
        (Operation::Stop, _) => Step::Stay,

        (Operation::Teardown, Configured | Stopped) => Step::Move(TornDown),
        (Operation::Teardown, TornDown) => Step::Stay,

        (Operation::Invalidate, Configured | Started | Stopped) => Step::Move(Uninitialized),

        _ => return Err(InvalidTransition { state, operation }),
    };
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::{Configured, Started, Stopped, TornDown, Uninitialized};

    #[test]
    fn happy_path() {
        assert_eq!(plan(Uninitialized, Operation::Setup), Ok(Step::Move(Configured)));
        assert_eq!(plan(Configured, Operation::Start), Ok(Step::Move(Started)));
        assert_eq!(plan(Started, Operation::Stop), Ok(Step::Move(Stopped)));
        assert_eq!(plan(Stopped, Operation::Start), Ok(Step::Move(Started)));
        assert_eq!(plan(Stopped, Operation::Teardown), Ok(Step::Move(TornDown)));
    }

    #[test]
    fn idempotent_requests() {
        assert_eq!(plan(Started, Operation::Start), Ok(Step::Stay));
        assert_eq!(plan(Configured, Operation::Stop), Ok(Step::Stay));
        assert_eq!(plan(Uninitialized, Operation::Stop), Ok(Step::Stay));
        assert_eq!(plan(TornDown, Operation::Teardown), Ok(Step::Stay));
    }

    #[test]
    fn rejected_requests() {
        assert!(plan(Uninitialized, Operation::Start).is_err());
        assert!(plan(TornDown, Operation::Start).is_err());
        assert!(plan(Configured, Operation::Setup).is_err());
        assert!(plan(Started, Operation::Teardown).is_err());
        assert!(plan(Uninitialized, Operation::Teardown).is_err());
        assert!(plan(TornDown, Operation::Setup).is_err());
        assert!(plan(Uninitialized, Operation::Invalidate).is_err());
    }

    #[test]
    fn negotiated_states() {
        assert!(Configured.is_negotiated());
        assert!(Started.is_negotiated());
        assert!(!Stopped.is_negotiated());
        assert!(!Uninitialized.is_negotiated());
        assert!(!TornDown.is_negotiated());
    }
}
