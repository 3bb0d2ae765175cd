//! Asynchronous hardware events published by an [`AudioSession`](crate::AudioSession).

use std::fmt;

/// Why the output route changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteChangeReason {
    /// A new device became available (headphones plugged in, etc.).
    NewDeviceAvailable,
    /// The previous device went away.
    OldDeviceUnavailable,
    /// The session category changed.
    CategoryChange,
    /// The route was overridden by the application or the user.
    Override,
    /// Anything else.
    Unknown,
}

impl fmt::Display for RouteChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewDeviceAvailable => "new device available",
            Self::OldDeviceUnavailable => "old device unavailable",
            Self::CategoryChange => "category change",
            Self::Override => "override",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A route change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    /// Reason reported by the platform.
    pub reason: RouteChangeReason,
    /// Human readable description of the new route.
    pub description: String,
}

impl RouteChange {
    /// Create a route change.
    pub fn new(reason: RouteChangeReason, description: impl Into<String>) -> Self {
        Self {
            reason,
            description: description.into(),
        }
    }
}

/// Phase of an audio interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionPhase {
    /// The platform revoked hardware access. Rendering has stopped.
    Began,
    /// The interruption is over.
    Ended {
        /// Whether the platform allows resuming playback.
        should_resume: bool,
    },
}

/// Event delivered from the platform session to the observer thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The output route changed.
    RouteChanged(RouteChange),
    /// An interruption began or ended.
    Interruption(InterruptionPhase),
    /// The system output volume changed. Value in `[0, 1]`.
    VolumeChanged(f64),
    /// The backend reported a stream failure.
    Failed(String),
}
