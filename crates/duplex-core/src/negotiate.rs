//! Stream configuration negotiator.
//!
//! Turns a [`StreamConfig`] request into the [`NegotiatedParams`] the hardware
//! actually granted:
//!
//! 1. validate the request
//! 2. check channel counts against [`HardwareCapabilities`]
//! 3. build and submit a [`SessionRequest`]
//! 4. activate the session
//! 5. read back the granted format
//!
//! Any failure after submission deactivates the session again, so a failed
//! negotiation never leaves the hardware half-configured.

use crate::config::{Direction, NegotiatedParams, StreamConfig};
use crate::error::ConfigError;
use crate::session::{
    AudioSession, CategoryOptions, GrantedFormat, HardwareCapabilities, SessionCategory,
    SessionRequest,
};

/// Validate `config` against `caps` and build the request to submit.
pub fn build_request(
    config: &StreamConfig,
    caps: &HardwareCapabilities,
) -> Result<SessionRequest, ConfigError> {
    config.validate()?;

    if config.input_channels > caps.max_input_channels {
        return Err(ConfigError::unsupported_channels(
            Direction::Input,
            config.input_channels,
            caps.max_input_channels,
        ));
    }
    if config.output_channels > caps.max_output_channels {
        return Err(ConfigError::unsupported_channels(
            Direction::Output,
            config.output_channels,
            caps.max_output_channels,
        ));
    }

    let category = SessionCategory::for_channels(config.input_channels, config.output_channels)
        .ok_or_else(|| ConfigError::InvalidConfig("no channels requested".to_string()))?;

    let selectable = config.has_input() && caps.supports_input_selection;
    if !selectable && (config.input_orientation.is_some() || config.input_polar_pattern.is_some())
    {
        tracing::warn!(
            orientation = ?config.input_orientation,
            polar_pattern = ?config.input_polar_pattern,
            "input data source selection unavailable, ignoring"
        );
    }

    Ok(SessionRequest {
        category,
        options: CategoryOptions {
            mix_with_others: config.mix_with_others,
            default_to_speaker: config.route_to_speaker,
        },
        preferred_sample_rate: config.preferred_sample_rate,
        preferred_buffer_frames: config.buffer_frame_count,
        preferred_io_buffer_duration: config.buffer_duration(),
        input_channels: config.input_channels,
        output_channels: config.output_channels,
        input_orientation: config.input_orientation.filter(|_| selectable),
        input_polar_pattern: config.input_polar_pattern.filter(|_| selectable),
    })
}

/// Shrink `config` to what `caps` can carry, for renegotiation on a new route.
///
/// Fails only when a requested direction has no channels left at all.
pub fn fit_to_capabilities(
    config: &StreamConfig,
    caps: &HardwareCapabilities,
) -> Result<StreamConfig, ConfigError> {
    if config.has_input() && caps.max_input_channels == 0 {
        return Err(ConfigError::unsupported_channels(
            Direction::Input,
            config.input_channels,
            0,
        ));
    }
    if config.has_output() && caps.max_output_channels == 0 {
        return Err(ConfigError::unsupported_channels(
            Direction::Output,
            config.output_channels,
            0,
        ));
    }

    let fitted = StreamConfig {
        input_channels: config.input_channels.min(caps.max_input_channels),
        output_channels: config.output_channels.min(caps.max_output_channels),
        ..config.clone()
    };
    if fitted.input_channels != config.input_channels
        || fitted.output_channels != config.output_channels
    {
        tracing::info!(
            input = fitted.input_channels,
            output = fitted.output_channels,
            "route carries fewer channels than requested"
        );
    }
    Ok(fitted)
}

/// Convert a granted format into negotiated parameters.
///
/// Channel counts are capped at what was requested: the view never grows
/// beyond what the consumer asked for.
pub fn params_from_format(
    config: &StreamConfig,
    format: &GrantedFormat,
) -> Result<NegotiatedParams, ConfigError> {
    if !(format.sample_rate.is_finite() && format.sample_rate > 0.0) {
        return Err(ConfigError::SessionUnavailable(format!(
            "hardware reported sample rate {}",
            format.sample_rate
        )));
    }
    if format.buffer_frame_count == 0 {
        return Err(ConfigError::SessionUnavailable(
            "hardware reported a zero buffer size".to_string(),
        ));
    }
    Ok(NegotiatedParams {
        sample_rate: format.sample_rate,
        input_channels: format.input_channels.min(config.input_channels),
        output_channels: format.output_channels.min(config.output_channels),
        buffer_frame_count: format.buffer_frame_count,
    })
}

/// Negotiate `config` with `session`. On failure the session is left inactive.
pub fn negotiate(
    session: &mut dyn AudioSession,
    config: &StreamConfig,
) -> Result<NegotiatedParams, ConfigError> {
    let caps = session.capabilities()?;
    let request = build_request(config, &caps)?;

    let result = submit(session, config, &request);
    if result.is_err()
        && let Err(err) = session.deactivate()
    {
        tracing::warn!(error = %err, "deactivate after failed negotiation");
    }
    result
}

fn submit(
    session: &mut dyn AudioSession,
    config: &StreamConfig,
    request: &SessionRequest,
) -> Result<NegotiatedParams, ConfigError> {
    session.apply(request)?;
    session.activate()?;
    let format = session.current_format()?;
    let params = params_from_format(config, &format)?;

    if params.sample_rate != config.preferred_sample_rate {
        tracing::info!(
            requested = config.preferred_sample_rate,
            granted = params.sample_rate,
            "hardware granted a different sample rate"
        );
    }
    if params.buffer_frame_count != config.buffer_frame_count {
        tracing::info!(
            requested = config.buffer_frame_count,
            granted = params.buffer_frame_count,
            "hardware granted a different buffer size"
        );
    }
    tracing::info!(route = %format.route, %params, "negotiated");
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputOrientation, PolarPattern};

    fn caps(input: u16, output: u16, selection: bool) -> HardwareCapabilities {
        HardwareCapabilities {
            max_input_channels: input,
            max_output_channels: output,
            supports_input_selection: selection,
        }
    }

    #[test]
    fn builds_play_and_record_request() {
        let mut config = StreamConfig::duplex(1, 2).with_sample_rate(48000.0);
        config.mix_with_others = true;
        config.route_to_speaker = true;

        let request = build_request(&config, &caps(2, 2, false)).unwrap();

        assert_eq!(request.category, SessionCategory::PlayAndRecord);
        assert!(request.options.mix_with_others);
        assert!(request.options.default_to_speaker);
        assert_eq!(request.preferred_buffer_frames, 256);
    }

    #[test]
    fn rejects_too_many_channels() {
        let err = build_request(&StreamConfig::output_only(8), &caps(0, 2, false)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnsupportedChannelCount {
                direction: Direction::Output,
                requested: 8,
                max: 2
            }
        );

        let err = build_request(&StreamConfig::input_only(1), &caps(0, 2, false)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedChannelCount {
                direction: Direction::Input,
                ..
            }
        ));
    }

    #[test]
    fn drops_input_selection_when_unsupported() {
        let mut config = StreamConfig::duplex(1, 1);
        config.input_orientation = Some(InputOrientation::Front);
        config.input_polar_pattern = Some(PolarPattern::Cardioid);

        let plain = build_request(&config, &caps(1, 1, false)).unwrap();
        assert_eq!(plain.input_orientation, None);
        assert_eq!(plain.input_polar_pattern, None);

        let selected = build_request(&config, &caps(1, 1, true)).unwrap();
        assert_eq!(selected.input_orientation, Some(InputOrientation::Front));
        assert_eq!(selected.input_polar_pattern, Some(PolarPattern::Cardioid));
    }

    #[test]
    fn granted_channels_are_capped() {
        let config = StreamConfig::output_only(1);
        let format = GrantedFormat {
            sample_rate: 48000.0,
            input_channels: 2,
            output_channels: 2,
            buffer_frame_count: 256,
            route: "Speaker".into(),
        };
        let params = params_from_format(&config, &format).unwrap();
        assert_eq!(params.output_channels, 1);
        assert_eq!(params.input_channels, 0);
    }

    #[test]
    fn fitting_caps_channels_to_route() {
        let config = StreamConfig::duplex(2, 2).with_sample_rate(48000.0);

        let fitted = fit_to_capabilities(&config, &caps(1, 1, false)).unwrap();
        assert_eq!((fitted.input_channels, fitted.output_channels), (1, 1));
        assert_eq!(fitted.preferred_sample_rate, 48000.0);

        let same = fit_to_capabilities(&config, &caps(8, 8, false)).unwrap();
        assert_eq!(same, config);
    }

    #[test]
    fn fitting_fails_when_a_direction_vanishes() {
        let err = fit_to_capabilities(&StreamConfig::duplex(1, 2), &caps(0, 2, false)).unwrap_err();
        assert_eq!(err, ConfigError::unsupported_channels(Direction::Input, 1, 0));

        let err = fit_to_capabilities(&StreamConfig::output_only(2), &caps(2, 0, false)).unwrap_err();
        assert_eq!(err, ConfigError::unsupported_channels(Direction::Output, 2, 0));

        assert!(fit_to_capabilities(&StreamConfig::output_only(2), &caps(0, 1, false)).is_ok());
    }

    #[test]
    fn zero_rate_format_is_rejected() {
        let format = GrantedFormat {
            sample_rate: 0.0,
            input_channels: 0,
            output_channels: 2,
            buffer_frame_count: 256,
            route: String::new(),
        };
        assert!(params_from_format(&StreamConfig::default(), &format).is_err());
    }
}
