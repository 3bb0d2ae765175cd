//! Stream configuration requested by the consumer and the parameters the
//! hardware actually granted.
//!
//! A [`StreamConfig`] is a *request*. The platform may answer with a different
//! sample rate or buffer size, so everything downstream of negotiation works
//! from [`NegotiatedParams`] instead.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default buffer size in frames.
pub const DEFAULT_BUFFER_FRAMES: u32 = 256;

/// Default preferred sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Upper bound accepted for `buffer_frame_count`.
pub const MAX_BUFFER_FRAMES: u32 = 8192;

/// Lowest preferred sample rate accepted, in Hz.
pub const MIN_SAMPLE_RATE: f64 = 1000.0;

/// Highest preferred sample rate accepted, in Hz.
pub const MAX_SAMPLE_RATE: f64 = 768_000.0;

/// Length of `frames` at `sample_rate`, or zero when the rate is unusable.
fn period(frames: u32, sample_rate: f64) -> Duration {
    Duration::try_from_secs_f64(f64::from(frames) / sample_rate).unwrap_or(Duration::ZERO)
}

/// Physical orientation of the input data source (microphone) to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InputOrientation {
    /// Microphone facing the user.
    Front,
    /// Microphone on the back of the device.
    Back,
    /// Microphone at the top edge.
    Top,
    /// Microphone at the bottom edge.
    Bottom,
}

/// Polar pattern requested for the selected input data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PolarPattern {
    /// Equal sensitivity in every direction.
    Omnidirectional,
    /// Heart-shaped, rejects sound from behind.
    Cardioid,
    /// Between omnidirectional and cardioid.
    Subcardioid,
}

/// Stream direction, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Capture.
    Input,
    /// Playback.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Requested stream parameters for one session.
///
/// ## Fields
///
/// - `input_channels` / `output_channels`: zero disables that direction
/// - `preferred_sample_rate`: a preference, the hardware may grant another rate
/// - `buffer_frame_count`: frames per render cycle, fixed for the session
/// - `route_to_speaker`: prefer the built-in speaker over the receiver
/// - `mix_with_others`: keep other applications' audio playing
/// - `input_orientation` / `input_polar_pattern`: input data source selection
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StreamConfig {
    /// Number of input channels (0 = output only).
    pub input_channels: u16,
    /// Number of output channels (0 = input only).
    pub output_channels: u16,
    /// Preferred sample rate in Hz.
    pub preferred_sample_rate: f64,
    /// Frames per render cycle.
    pub buffer_frame_count: u32,
    /// Route playback to the speaker by default.
    pub route_to_speaker: bool,
    /// Mix with audio from other applications instead of silencing it.
    pub mix_with_others: bool,
    /// Input data source orientation, if the hardware offers a choice.
    pub input_orientation: Option<InputOrientation>,
    /// Input polar pattern, if the hardware offers a choice.
    pub input_polar_pattern: Option<PolarPattern>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_channels: 0,
            output_channels: 2,
            preferred_sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frame_count: DEFAULT_BUFFER_FRAMES,
            route_to_speaker: false,
            mix_with_others: false,
            input_orientation: None,
            input_polar_pattern: None,
        }
    }
}

impl StreamConfig {
    /// Playback-only configuration with `channels` outputs.
    pub fn output_only(channels: u16) -> Self {
        Self {
            input_channels: 0,
            output_channels: channels,
            ..Self::default()
        }
    }

    /// Capture-only configuration with `channels` inputs.
    pub fn input_only(channels: u16) -> Self {
        Self {
            input_channels: channels,
            output_channels: 0,
            ..Self::default()
        }
    }

    /// Full-duplex configuration.
    pub fn duplex(input_channels: u16, output_channels: u16) -> Self {
        Self {
            input_channels,
            output_channels,
            ..Self::default()
        }
    }

    /// Set the preferred sample rate.
    pub fn with_sample_rate(mut self, hz: f64) -> Self {
        self.preferred_sample_rate = hz;
        self
    }

    /// Set the buffer size in frames.
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frame_count = frames;
        self
    }

    /// Whether capture is requested.
    pub fn has_input(&self) -> bool {
        self.input_channels > 0
    }

    /// Whether playback is requested.
    pub fn has_output(&self) -> bool {
        self.output_channels > 0
    }

    /// Preferred IO buffer duration (`buffer_frame_count / preferred_sample_rate`).
    pub fn buffer_duration(&self) -> Duration {
        period(self.buffer_frame_count, self.preferred_sample_rate)
    }

    /// Check the request for values no hardware could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_input() && !self.has_output() {
            return Err(ConfigError::InvalidConfig(
                "at least one input or output channel is required".to_string(),
            ));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.preferred_sample_rate) {
            return Err(ConfigError::InvalidConfig(format!(
                "sample rate must be in {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz, got {}",
                self.preferred_sample_rate
            )));
        }
        if self.buffer_frame_count == 0 || self.buffer_frame_count > MAX_BUFFER_FRAMES {
            return Err(ConfigError::InvalidConfig(format!(
                "buffer frame count must be in 1..={MAX_BUFFER_FRAMES}, got {}",
                self.buffer_frame_count
            )));
        }
        Ok(())
    }
}

/// Parameters granted by the hardware after negotiation.
///
/// Input and output share a single sample rate and buffer size per session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiatedParams {
    /// Effective sample rate in Hz.
    pub sample_rate: f64,
    /// Effective number of input channels.
    pub input_channels: u16,
    /// Effective number of output channels.
    pub output_channels: u16,
    /// Effective frames per render cycle.
    pub buffer_frame_count: u32,
}

impl NegotiatedParams {
    /// Duration of one render cycle.
    pub fn buffer_period(&self) -> Duration {
        period(self.buffer_frame_count, self.sample_rate)
    }

    /// Number of channels in the consumer's view: the wider of input and output.
    pub fn view_channels(&self) -> usize {
        usize::from(self.input_channels.max(self.output_channels))
    }
}

impl fmt::Display for NegotiatedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} in / {} out, {} frames",
            self.sample_rate, self.input_channels, self.output_channels, self.buffer_frame_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_stereo_playback() {
        let config = StreamConfig::default();
        assert_eq!(config.output_channels, 2);
        assert_eq!(config.input_channels, 0);
        assert_eq!(config.buffer_frame_count, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_no_channels() {
        let config = StreamConfig::duplex(0, 0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_bad_sample_rate() {
        for rate in [0.0, -44100.0, f64::NAN, f64::INFINITY, 1e-300, 999.0, 1e9] {
            let config = StreamConfig::output_only(1).with_sample_rate(rate);
            assert!(config.validate().is_err(), "rate {rate} accepted");
        }
    }

    #[test]
    fn rejects_bad_buffer_size() {
        assert!(StreamConfig::output_only(1).with_buffer_frames(0).validate().is_err());
        assert!(
            StreamConfig::output_only(1)
                .with_buffer_frames(MAX_BUFFER_FRAMES + 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn buffer_duration_follows_rate() {
        let config = StreamConfig::output_only(2)
            .with_sample_rate(48000.0)
            .with_buffer_frames(480);
        assert_eq!(config.buffer_duration(), Duration::from_millis(10));
    }

    #[test]
    fn negotiated_period_and_view() {
        let params = NegotiatedParams {
            sample_rate: 48000.0,
            input_channels: 1,
            output_channels: 2,
            buffer_frame_count: 256,
        };
        assert_eq!(params.view_channels(), 2);
        let period = params.buffer_period().as_secs_f64();
        assert!((period - 256.0 / 48000.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_rates_give_zero_period() {
        let mut params = NegotiatedParams {
            sample_rate: 1e-300,
            input_channels: 0,
            output_channels: 2,
            buffer_frame_count: 256,
        };
        assert_eq!(params.buffer_period(), Duration::ZERO);
        params.sample_rate = 0.0;
        assert_eq!(params.buffer_period(), Duration::ZERO);
        params.sample_rate = f64::NAN;
        assert_eq!(params.buffer_period(), Duration::ZERO);

        let config = StreamConfig::output_only(1).with_sample_rate(-1.0);
        assert_eq!(config.buffer_duration(), Duration::ZERO);
    }
}
