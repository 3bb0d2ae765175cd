//! Error types for configuration and runtime operations.
//!
//! Two families, split by when they surface:
//!
//! - [`ConfigError`]: returned synchronously by `setup()`
//! - [`RuntimeError`]: returned by `start()`/`stop()`/`teardown()` or delivered
//!   asynchronously through the error callback
//!
//! The platform session's own [`SessionError`] is mapped into both at the
//! boundary. Nothing here is ever constructed on the render thread.

use thiserror::Error;

use crate::config::Direction;
use crate::lifecycle::LifecycleState;
use crate::session::SessionError;

/// Errors raised while negotiating a stream configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The platform audio session could not be reached or activated.
    #[error("audio session unavailable: {0}")]
    SessionUnavailable(String),

    /// More channels were requested than the hardware offers.
    #[error("unsupported {direction} channel count {requested} (hardware maximum {max})")]
    UnsupportedChannelCount {
        /// Direction of the offending request.
        direction: Direction,
        /// Requested channel count.
        requested: u16,
        /// Hardware maximum for this direction.
        max: u16,
    },

    /// Another client holds the hardware.
    #[error("audio hardware busy: {0}")]
    HardwareBusy(String),

    /// The request itself is malformed.
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// `setup()` was called in a state that does not allow it.
    #[error("setup not allowed in state {0}")]
    InvalidState(LifecycleState),
}

impl ConfigError {
    /// Build an [`ConfigError::UnsupportedChannelCount`].
    pub fn unsupported_channels(direction: Direction, requested: u16, max: u16) -> Self {
        Self::UnsupportedChannelCount {
            direction,
            requested,
            max,
        }
    }
}

impl From<SessionError> for ConfigError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unavailable(msg) | SessionError::Backend(msg) => {
                Self::SessionUnavailable(msg)
            }
            SessionError::Busy(msg) | SessionError::DeviceClaimed(msg) => Self::HardwareBusy(msg),
        }
    }
}

/// Errors raised while the stream runs, or while starting and stopping it.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Another client claimed the device.
    #[error("audio device claimed by another client: {0}")]
    DeviceClaimed(String),

    /// An interruption ended without permission to resume. Run `setup()` again.
    #[error("interruption ended without permission to resume")]
    InterruptionNotResumable,

    /// The operation cannot run while an interruption is in progress.
    #[error("audio session is interrupted")]
    Interrupted,

    /// The hardware reported a failure.
    #[error("audio hardware error: {0}")]
    Hardware(String),

    /// The operation is not allowed in the current lifecycle state.
    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// State the manager was in.
        state: LifecycleState,
    },

    /// Renegotiation after a route change failed.
    #[error("reconfiguration failed: {0}")]
    Reconfiguration(#[from] ConfigError),

    /// The event observer thread could not be spawned.
    #[error("failed to spawn event observer: {0}")]
    ObserverSpawn(#[source] std::io::Error),
}

impl RuntimeError {
    /// Build a [`RuntimeError::InvalidState`].
    pub fn invalid_state(operation: &'static str, state: LifecycleState) -> Self {
        Self::InvalidState { operation, state }
    }
}

impl From<SessionError> for RuntimeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::DeviceClaimed(msg) | SessionError::Busy(msg) => Self::DeviceClaimed(msg),
            SessionError::Unavailable(msg) | SessionError::Backend(msg) => Self::Hardware(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn channel_count_display() {
        let err = ConfigError::unsupported_channels(Direction::Input, 4, 1);
        let msg = err.to_string();
        assert!(msg.contains("input"));
        assert!(msg.contains('4'));
        assert!(msg.contains("maximum 1"));
    }

    #[test]
    fn session_error_maps_to_config_error() {
        assert!(matches!(
            ConfigError::from(SessionError::Busy("x".into())),
            ConfigError::HardwareBusy(_)
        ));
        assert!(matches!(
            ConfigError::from(SessionError::Unavailable("x".into())),
            ConfigError::SessionUnavailable(_)
        ));
    }

    #[test]
    fn session_error_maps_to_runtime_error() {
        assert!(matches!(
            RuntimeError::from(SessionError::DeviceClaimed("x".into())),
            RuntimeError::DeviceClaimed(_)
        ));
        assert!(matches!(
            RuntimeError::from(SessionError::Backend("x".into())),
            RuntimeError::Hardware(_)
        ));
    }

    #[test]
    fn invalid_state_display() {
        let err = RuntimeError::invalid_state("teardown", LifecycleState::Started);
        assert_eq!(err.to_string(), "teardown not allowed in state started");
    }

    #[test]
    fn reconfiguration_has_source() {
        let err = RuntimeError::from(ConfigError::HardwareBusy("claimed".into()));
        assert!(err.source().is_some());
    }
}
