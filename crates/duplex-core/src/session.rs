//! The platform audio session contract consumed by the core.
//!
//! An [`AudioSession`] wraps whatever the platform offers for category
//! negotiation, activation and stream ownership. The core treats its
//! negotiation algorithm as a black box: it submits a [`SessionRequest`], then
//! reads back the [`GrantedFormat`] the hardware actually settled on.
//!
//! ## Engine ownership
//!
//! ```text
//!   manager ──arm(engine)──▶ session ──▶ hardware thread calls engine.render()
//!   manager ◀──disarm()───── session ◀── engine handed back after the stream stops
//! ```
//!
//! The [`RenderEngine`] moves into the session on [`arm`](AudioSession::arm)
//! and comes back on [`disarm`](AudioSession::disarm). After `disarm` returns
//! the hardware must not invoke the engine again.
//!
//! Implementations: [`StubSession`](crate::stub::StubSession) in this crate,
//! and the cpal-backed session in `duplex-io`.

use std::time::Duration;

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::config::{InputOrientation, PolarPattern};
use crate::events::SessionEvent;
use crate::render::RenderEngine;

/// Channel the session publishes asynchronous events into.
pub type EventSink = Sender<SessionEvent>;

/// Session category derived from the requested channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCategory {
    /// Output only.
    Playback,
    /// Input only.
    Record,
    /// Input and output.
    PlayAndRecord,
}

impl SessionCategory {
    /// Derive the category from channel counts. `None` when both are zero.
    pub fn for_channels(input: u16, output: u16) -> Option<Self> {
        match (input > 0, output > 0) {
            (true, true) => Some(Self::PlayAndRecord),
            (true, false) => Some(Self::Record),
            (false, true) => Some(Self::Playback),
            (false, false) => None,
        }
    }
}

/// Category options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryOptions {
    /// Keep other applications' audio playing.
    pub mix_with_others: bool,
    /// Route output to the speaker instead of the receiver.
    pub default_to_speaker: bool,
}

/// Everything submitted to the platform in one negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    /// Session category.
    pub category: SessionCategory,
    /// Category options.
    pub options: CategoryOptions,
    /// Preferred sample rate in Hz.
    pub preferred_sample_rate: f64,
    /// Preferred frames per render cycle.
    pub preferred_buffer_frames: u32,
    /// Preferred IO buffer duration.
    pub preferred_io_buffer_duration: Duration,
    /// Requested input channels.
    pub input_channels: u16,
    /// Requested output channels.
    pub output_channels: u16,
    /// Input data source orientation.
    pub input_orientation: Option<InputOrientation>,
    /// Input polar pattern.
    pub input_polar_pattern: Option<PolarPattern>,
}

/// What the hardware can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCapabilities {
    /// Maximum input channels (0 if there is no input).
    pub max_input_channels: u16,
    /// Maximum output channels (0 if there is no output).
    pub max_output_channels: u16,
    /// Whether input data source orientation and polar pattern can be chosen.
    pub supports_input_selection: bool,
}

/// The format the hardware granted after activation.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedFormat {
    /// Effective sample rate in Hz.
    pub sample_rate: f64,
    /// Effective input channels.
    pub input_channels: u16,
    /// Effective output channels.
    pub output_channels: u16,
    /// Effective frames per render cycle.
    pub buffer_frame_count: u32,
    /// Name of the current route.
    pub route: String,
}

/// Errors reported by a platform session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session could not be reached.
    #[error("session unavailable: {0}")]
    Unavailable(String),
    /// The hardware is in use.
    #[error("hardware busy: {0}")]
    Busy(String),
    /// Another client claimed the device.
    #[error("device claimed: {0}")]
    DeviceClaimed(String),
    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A failed [`AudioSession::arm`]. Carries the engine back so the binding survives.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ArmError {
    /// Cause.
    #[source]
    pub error: SessionError,
    /// The engine, if the session could hand it back.
    pub engine: Option<RenderEngine>,
}

impl ArmError {
    /// Wrap an error together with the engine that failed to arm.
    pub fn new(error: SessionError, engine: RenderEngine) -> Self {
        Self {
            error,
            engine: Some(engine),
        }
    }
}

/// Platform audio session.
///
/// All methods run on non-real-time threads.
pub trait AudioSession: Send {
    /// Human readable name, for logs.
    fn name(&self) -> &str;

    /// Report hardware capabilities.
    fn capabilities(&self) -> Result<HardwareCapabilities, SessionError>;

    /// Submit category, options and preferred parameters.
    fn apply(&mut self, request: &SessionRequest) -> Result<(), SessionError>;

    /// Activate the session.
    fn activate(&mut self) -> Result<(), SessionError>;

    /// Deactivate the session. Idempotent.
    fn deactivate(&mut self) -> Result<(), SessionError>;

    /// Read back the effective format. Only meaningful while active.
    fn current_format(&self) -> Result<GrantedFormat, SessionError>;

    /// Current output volume in `[0, 1]`.
    fn output_volume(&self) -> f64 {
        1.0
    }

    /// Register the sink for asynchronous events.
    fn subscribe(&mut self, sink: EventSink);

    /// Hand the engine to the hardware and start rendering.
    fn arm(&mut self, engine: RenderEngine) -> Result<(), ArmError>;

    /// Stop rendering and take the engine back. `Ok(None)` if nothing was armed.
    fn disarm(&mut self) -> Result<Option<RenderEngine>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_channels() {
        assert_eq!(SessionCategory::for_channels(0, 2), Some(SessionCategory::Playback));
        assert_eq!(SessionCategory::for_channels(1, 0), Some(SessionCategory::Record));
        assert_eq!(
            SessionCategory::for_channels(1, 2),
            Some(SessionCategory::PlayAndRecord)
        );
        assert_eq!(SessionCategory::for_channels(0, 0), None);
    }
}
