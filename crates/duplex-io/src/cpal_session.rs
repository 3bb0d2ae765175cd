//! [`AudioSession`] over the system cpal host.
//!
//! Desktop hosts have no session categories, so negotiation maps onto device
//! selection: the preferred sample rate is granted when the device supports
//! it and falls back to the device default otherwise, and the fixed buffer
//! size is clamped into the device's reported range. In duplex mode the input
//! device follows the rate picked for the output device.
//!
//! Category options (`mix_with_others`, `default_to_speaker`) have no desktop
//! equivalent and are logged and ignored.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use duplex_core::{
    ArmError, AudioSession, EventSink, GrantedFormat, HardwareCapabilities, RenderEngine,
    SessionError, SessionRequest,
};

use crate::devices::{DeviceKind, device_name, find_device, max_channels};
use crate::format::{ConfigRange, DirectionFormat, choose, clamp_frames};
use crate::route_poll::{RoutePoller, Watch};
use crate::stream_thread::StreamThread;

/// How often the default devices are polled for route changes.
pub const DEFAULT_ROUTE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One side of a resolved stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub device: String,
    /// Channels the cpal stream is opened with.
    pub stream_channels: u16,
    /// Channels granted to the consumer.
    pub channels: u16,
}

/// The concrete stream configuration for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub input: Option<Endpoint>,
    pub output: Option<Endpoint>,
}

impl Resolved {
    pub(crate) fn route(&self) -> String {
        match (&self.input, &self.output) {
            (Some(input), Some(output)) if input.device != output.device => {
                format!("{} / {}", input.device, output.device)
            }
            (_, Some(endpoint)) | (Some(endpoint), None) => endpoint.device.clone(),
            (None, None) => String::new(),
        }
    }

    fn granted(&self) -> GrantedFormat {
        GrantedFormat {
            sample_rate: f64::from(self.sample_rate),
            input_channels: self.input.as_ref().map_or(0, |e| e.channels),
            output_channels: self.output.as_ref().map_or(0, |e| e.channels),
            buffer_frame_count: self.buffer_frames,
            route: self.route(),
        }
    }
}

/// What one device offers.
struct Probe {
    name: String,
    ranges: Vec<ConfigRange>,
    default_rate: u32,
}

impl Probe {
    fn of(device: &cpal::Device, kind: DeviceKind) -> Result<Self, SessionError> {
        let name = device_name(device).unwrap_or_else(|_| "Unknown".to_string());
        let (ranges, default) = match kind {
            DeviceKind::Input => (
                device
                    .supported_input_configs()
                    .map(|configs| configs.map(|c| ConfigRange::from(&c)).collect::<Vec<_>>()),
                device.default_input_config(),
            ),
            DeviceKind::Output => (
                device
                    .supported_output_configs()
                    .map(|configs| configs.map(|c| ConfigRange::from(&c)).collect::<Vec<_>>()),
                device.default_output_config(),
            ),
        };
        let ranges: Vec<ConfigRange> =
            ranges.map_err(|e| SessionError::Backend(format!("{name}: {e}")))?;

        Ok(Self {
            default_rate: default.map(|c| c.sample_rate()).unwrap_or(48000),
            name,
            ranges,
        })
    }

    fn endpoint(&self, format: DirectionFormat) -> Endpoint {
        Endpoint {
            device: self.name.clone(),
            stream_channels: format.stream_channels,
            channels: format.channels,
        }
    }
}

/// Audio session backed by the default cpal host.
///
/// Devices are chosen by name or index (see [`select_device`](crate::select_device));
/// unset devices follow the host default and are watched for route changes.
#[derive(Debug)]
pub struct CpalSession {
    name: String,
    input_device: Option<String>,
    output_device: Option<String>,
    route_poll_interval: Duration,
    request: Option<SessionRequest>,
    resolved: Option<Resolved>,
    sink: Option<EventSink>,
    poller: Option<RoutePoller>,
    stream: Option<StreamThread>,
}

impl Default for CpalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalSession {
    /// Create a session on the default host's default devices.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal session created");
        Self {
            name: format!("cpal/{}", host.id().name()),
            input_device: None,
            output_device: None,
            route_poll_interval: DEFAULT_ROUTE_POLL_INTERVAL,
            request: None,
            resolved: None,
            sink: None,
            poller: None,
            stream: None,
        }
    }

    /// Use this input device (name, partial name or index) instead of the default.
    pub fn with_input_device(mut self, device: Option<String>) -> Self {
        self.input_device = device;
        self
    }

    /// Use this output device (name, partial name or index) instead of the default.
    pub fn with_output_device(mut self, device: Option<String>) -> Self {
        self.output_device = device;
        self
    }

    /// Set how often default devices are polled for route changes.
    pub fn with_route_poll_interval(mut self, interval: Duration) -> Self {
        self.route_poll_interval = interval;
        self
    }

    fn device(&self, kind: DeviceKind) -> Result<cpal::Device, SessionError> {
        let host = cpal::default_host();
        let query = match kind {
            DeviceKind::Input => self.input_device.as_deref(),
            DeviceKind::Output => self.output_device.as_deref(),
        };
        find_device(&host, kind, query).map_err(|e| SessionError::Unavailable(e.to_string()))
    }

    /// Work out the stream configuration the current devices grant for `request`.
    fn resolve(&self, request: &SessionRequest) -> Result<Resolved, SessionError> {
        let preferred = request.preferred_sample_rate.round() as u32;

        let output = if request.output_channels > 0 {
            let probe = Probe::of(&self.device(DeviceKind::Output)?, DeviceKind::Output)?;
            let format = choose(
                &probe.ranges,
                request.output_channels,
                &[preferred, probe.default_rate],
            )
            .ok_or_else(|| {
                SessionError::Backend(format!("{}: no usable output configuration", probe.name))
            })?;
            Some((probe, format))
        } else {
            None
        };

        let input = if request.input_channels > 0 {
            let probe = Probe::of(&self.device(DeviceKind::Input)?, DeviceKind::Input)?;
            let rates = match &output {
                Some((_, out)) => [out.sample_rate, out.sample_rate],
                None => [preferred, probe.default_rate],
            };
            let format = choose(&probe.ranges, request.input_channels, &rates).ok_or_else(|| {
                SessionError::Backend(format!(
                    "{}: no usable input configuration at {} Hz",
                    probe.name, rates[0]
                ))
            })?;
            Some((probe, format))
        } else {
            None
        };

        let sample_rate = output
            .as_ref()
            .or(input.as_ref())
            .map(|(_, f)| f.sample_rate)
            .ok_or_else(|| SessionError::Backend("no stream direction requested".into()))?;
        let limits = [
            output.as_ref().and_then(|(_, f)| f.buffer),
            input.as_ref().and_then(|(_, f)| f.buffer),
        ];

        Ok(Resolved {
            sample_rate,
            buffer_frames: clamp_frames(request.preferred_buffer_frames, &limits),
            input: input.map(|(probe, format)| probe.endpoint(format)),
            output: output.map(|(probe, format)| probe.endpoint(format)),
        })
    }

    fn start_poller(&mut self) {
        let watch = Watch {
            input: self.input_device.is_none(),
            output: self.output_device.is_none(),
        };
        if self.poller.is_some() || !(watch.input || watch.output) {
            return;
        }
        let Some(sink) = self.sink.clone() else {
            return;
        };
        match RoutePoller::spawn(sink, watch, self.route_poll_interval) {
            Ok(poller) => self.poller = Some(poller),
            Err(err) => tracing::warn!(error = %err, "route poller not started"),
        }
    }
}

impl AudioSession for CpalSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Result<HardwareCapabilities, SessionError> {
        let widest = |kind| match self.device(kind) {
            Ok(device) => Ok(max_channels(&device, kind)),
            // A missing default device has no channels; a missing named one is an error
            Err(err) => match kind {
                DeviceKind::Input if self.input_device.is_some() => Err(err),
                DeviceKind::Output if self.output_device.is_some() => Err(err),
                _ => Ok(0),
            },
        };

        Ok(HardwareCapabilities {
            max_input_channels: widest(DeviceKind::Input)?,
            max_output_channels: widest(DeviceKind::Output)?,
            supports_input_selection: false,
        })
    }

    fn apply(&mut self, request: &SessionRequest) -> Result<(), SessionError> {
        if request.options.mix_with_others {
            tracing::debug!("mix with others has no effect on desktop hosts");
        }
        if request.options.default_to_speaker {
            tracing::debug!("default to speaker has no effect on desktop hosts");
        }
        tracing::debug!(
            category = ?request.category,
            sample_rate = request.preferred_sample_rate,
            buffer_frames = request.preferred_buffer_frames,
            "session request applied"
        );
        self.request = Some(request.clone());
        Ok(())
    }

    fn activate(&mut self) -> Result<(), SessionError> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| SessionError::Unavailable("no request applied".into()))?;
        let resolved = self.resolve(request)?;
        tracing::info!(
            sample_rate = resolved.sample_rate,
            buffer_frames = resolved.buffer_frames,
            route = %resolved.route(),
            "cpal session active"
        );
        self.resolved = Some(resolved);
        self.start_poller();
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SessionError> {
        self.poller = None;
        if self.resolved.take().is_some() {
            tracing::debug!("cpal session inactive");
        }
        Ok(())
    }

    fn current_format(&self) -> Result<GrantedFormat, SessionError> {
        let (Some(request), Some(_)) = (&self.request, &self.resolved) else {
            return Err(SessionError::Unavailable("session inactive".into()));
        };
        // Resolve again so a changed default device shows up in the format
        Ok(self.resolve(request)?.granted())
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    fn arm(&mut self, engine: RenderEngine) -> Result<(), ArmError> {
        if self.stream.is_some() {
            return Err(ArmError::new(
                SessionError::Busy("stream already running".into()),
                engine,
            ));
        }
        let Some(resolved) = self.resolved.clone() else {
            return Err(ArmError::new(
                SessionError::Unavailable("session inactive".into()),
                engine,
            ));
        };
        self.stream = Some(StreamThread::spawn(resolved, engine, self.sink.clone())?);
        Ok(())
    }

    fn disarm(&mut self) -> Result<Option<RenderEngine>, SessionError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        match stream.stop()? {
            Some(engine) => Ok(Some(engine)),
            None => Err(SessionError::Backend(
                "render engine was not returned by the stream".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(device: &str, channels: u16) -> Endpoint {
        Endpoint {
            device: device.to_string(),
            stream_channels: channels,
            channels,
        }
    }

    #[test]
    fn route_names_both_devices_when_they_differ() {
        let resolved = Resolved {
            sample_rate: 48000,
            buffer_frames: 256,
            input: Some(endpoint("USB Mic", 1)),
            output: Some(endpoint("Speakers", 2)),
        };
        assert_eq!(resolved.route(), "USB Mic / Speakers");
    }

    #[test]
    fn route_names_a_shared_device_once() {
        let resolved = Resolved {
            sample_rate: 48000,
            buffer_frames: 256,
            input: Some(endpoint("Interface", 2)),
            output: Some(endpoint("Interface", 2)),
        };
        assert_eq!(resolved.route(), "Interface");
    }

    #[test]
    fn granted_format_reports_consumer_channels() {
        let resolved = Resolved {
            sample_rate: 44100,
            buffer_frames: 512,
            input: None,
            output: Some(Endpoint {
                device: "Speakers".into(),
                stream_channels: 4,
                channels: 2,
            }),
        };
        let granted = resolved.granted();
        assert_eq!(granted.sample_rate, 44100.0);
        assert_eq!(granted.input_channels, 0);
        assert_eq!(granted.output_channels, 2);
        assert_eq!(granted.buffer_frame_count, 512);
        assert_eq!(granted.route, "Speakers");
    }

    #[test]
    fn inactive_session_has_no_format() {
        let session = CpalSession::new();
        assert!(matches!(
            session.current_format(),
            Err(SessionError::Unavailable(_))
        ));
    }

    #[test]
    fn activate_without_request_fails() {
        let mut session = CpalSession::new();
        assert!(session.activate().is_err());
        assert!(session.disarm().unwrap().is_none());
    }
}
