//! The thread that owns the cpal streams.
//!
//! `cpal::Stream` is not `Send` on every platform, so the streams are built,
//! played and dropped on one dedicated thread. The [`RenderEngine`] rides into
//! the stream callbacks inside an [`EngineParcel`]; when cpal drops the
//! callback, the parcel sends the engine back.
//!
//! ```text
//!   arm ──spawn──▶ duplex-cpal thread ──build/play──▶ cpal callback (owns parcel)
//!                       │                                  │
//!   disarm ──stop──▶ drop streams ──────────────▶ parcel dropped ──engine──▶ disarm
//! ```
//!
//! In duplex mode the input callback pushes interleaved samples into an
//! `rtrb` ring; the output callback drains it into a preallocated scratch
//! buffer and renders input and output together.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use duplex_core::buffer::{HardwareBuffer, HardwareBufferMut};
use duplex_core::{
    ArmError, Direction, EventSink, RenderEngine, RouteChange, RouteChangeReason, SessionError,
    SessionEvent,
};

use crate::cpal_session::{Endpoint, Resolved};
use crate::devices::{DeviceKind, find_device};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const ENGINE_RETURN_TIMEOUT: Duration = Duration::from_secs(1);

/// Buffer periods of input the duplex ring can hold.
const RING_PERIODS: usize = 8;

/// Queued input beyond the current cycle that triggers a trim.
const MAX_BACKLOG_PERIODS: usize = 2;

/// Samples of stale input to discard before reading `wanted` samples.
///
/// Once more than [`MAX_BACKLOG_PERIODS`] periods are queued behind the
/// current cycle, the oldest whole frames are dropped until one period is left.
fn stale_samples(queued: usize, wanted: usize, period: usize, stride: usize) -> usize {
    if queued <= wanted + MAX_BACKLOG_PERIODS * period {
        return 0;
    }
    let excess = queued - wanted - period;
    excess - excess % stride.max(1)
}

/// Owns a [`RenderEngine`] inside a stream callback and sends it home on drop.
struct EngineParcel {
    engine: Option<RenderEngine>,
    home: Sender<RenderEngine>,
}

impl EngineParcel {
    fn engine(&mut self) -> Option<&mut RenderEngine> {
        self.engine.as_mut()
    }
}

impl Drop for EngineParcel {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            let _ = self.home.try_send(engine);
        }
    }
}

/// Handle to the running stream thread.
#[derive(Debug)]
pub(crate) struct StreamThread {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    engines: Receiver<RenderEngine>,
}

impl StreamThread {
    /// Open and start the streams for `resolved` on a new thread.
    ///
    /// Blocks until the streams are playing or have failed. On failure the
    /// engine comes back inside the [`ArmError`].
    pub(crate) fn spawn(
        resolved: Resolved,
        engine: RenderEngine,
        sink: Option<EventSink>,
    ) -> Result<Self, ArmError> {
        let (home, engines) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown, stopped) = crossbeam_channel::bounded::<()>(1);
        let parcel = EngineParcel {
            engine: Some(engine),
            home,
        };

        let spawned = thread::Builder::new()
            .name("duplex-cpal".into())
            .spawn(move || match open_streams(&resolved, parcel, sink) {
                Ok(streams) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stopped.recv();
                    drop(streams);
                    tracing::debug!("stream thread exiting");
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            });

        let mut this = Self {
            shutdown: Some(shutdown),
            thread: None,
            engines,
        };
        match spawned {
            Ok(thread) => this.thread = Some(thread),
            Err(err) => {
                return Err(this.fail(SessionError::Backend(format!(
                    "failed to spawn stream thread: {err}"
                ))));
            }
        }

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => Ok(this),
            Ok(Err(err)) => Err(this.fail(err)),
            Err(_) => Err(this.fail(SessionError::Backend(
                "stream thread did not start".into(),
            ))),
        }
    }

    /// Stop the streams and take the engine back.
    pub(crate) fn stop(&mut self) -> Result<Option<RenderEngine>, SessionError> {
        self.shutdown.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            return Err(SessionError::Backend("stream thread panicked".into()));
        }
        Ok(self.engines.recv_timeout(ENGINE_RETURN_TIMEOUT).ok())
    }

    fn fail(mut self, error: SessionError) -> ArmError {
        let engine = self.stop().ok().flatten();
        ArmError { error, engine }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn open_streams(
    resolved: &Resolved,
    parcel: EngineParcel,
    sink: Option<EventSink>,
) -> Result<Vec<cpal::Stream>, SessionError> {
    let streams = match (&resolved.input, &resolved.output) {
        (None, Some(output)) => vec![output_only(resolved, output, parcel, sink)?],
        (Some(input), None) => vec![input_only(resolved, input, parcel, sink)?],
        (Some(input), Some(output)) => duplex(resolved, input, output, parcel, sink)?,
        (None, None) => {
            return Err(SessionError::Backend("no stream direction requested".into()));
        }
    };

    for stream in &streams {
        stream
            .play()
            .map_err(|e| SessionError::Backend(e.to_string()))?;
    }
    tracing::info!(
        sample_rate = resolved.sample_rate,
        buffer_frames = resolved.buffer_frames,
        route = %resolved.route(),
        "cpal streams started"
    );
    Ok(streams)
}

fn stream_config(resolved: &Resolved, endpoint: &Endpoint) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: endpoint.stream_channels,
        sample_rate: resolved.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(resolved.buffer_frames),
    }
}

fn open_device(kind: DeviceKind, endpoint: &Endpoint) -> Result<cpal::Device, SessionError> {
    let host = cpal::default_host();
    find_device(&host, kind, Some(&endpoint.device))
        .map_err(|e| SessionError::Unavailable(e.to_string()))
}

fn output_only(
    resolved: &Resolved,
    output: &Endpoint,
    mut parcel: EngineParcel,
    sink: Option<EventSink>,
) -> Result<cpal::Stream, SessionError> {
    let device = open_device(DeviceKind::Output, output)?;
    let channels = output.stream_channels;

    device
        .build_output_stream(
            &stream_config(resolved, output),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match parcel.engine() {
                Some(engine) => engine.render(None, &mut [HardwareBufferMut::new(channels, data)]),
                None => data.fill(0.0),
            },
            error_callback(sink, Direction::Output),
            None,
        )
        .map_err(build_error)
}

fn input_only(
    resolved: &Resolved,
    input: &Endpoint,
    mut parcel: EngineParcel,
    sink: Option<EventSink>,
) -> Result<cpal::Stream, SessionError> {
    let device = open_device(DeviceKind::Input, input)?;
    let channels = input.stream_channels;

    device
        .build_input_stream(
            &stream_config(resolved, input),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Some(engine) = parcel.engine() {
                    engine.render(Some(&[HardwareBuffer::new(channels, data)]), &mut []);
                }
            },
            error_callback(sink, Direction::Input),
            None,
        )
        .map_err(build_error)
}

fn duplex(
    resolved: &Resolved,
    input: &Endpoint,
    output: &Endpoint,
    mut parcel: EngineParcel,
    sink: Option<EventSink>,
) -> Result<Vec<cpal::Stream>, SessionError> {
    let in_device = open_device(DeviceKind::Input, input)?;
    let out_device = open_device(DeviceKind::Output, output)?;
    let in_channels = input.stream_channels;
    let out_channels = output.stream_channels;
    let stride = usize::from(in_channels);
    let period = stride * resolved.buffer_frames as usize;

    let capacity = period * RING_PERIODS;
    let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(capacity);
    let mut scratch = vec![0.0f32; capacity];

    let input_stream = in_device
        .build_input_stream(
            &stream_config(resolved, input),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Whole frames only; on overflow the newest input is dropped
                let n = producer.slots().min(data.len());
                let n = n - n % stride;
                if let Ok(mut chunk) = producer.write_chunk(n) {
                    let (first, second) = chunk.as_mut_slices();
                    let split = first.len();
                    first.copy_from_slice(&data[..split]);
                    second.copy_from_slice(&data[split..n]);
                    chunk.commit_all();
                }
            },
            error_callback(sink.clone(), Direction::Input),
            None,
        )
        .map_err(build_error)?;

    let output_stream = out_device
        .build_output_stream(
            &stream_config(resolved, output),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Some(engine) = parcel.engine() else {
                    data.fill(0.0);
                    return;
                };
                let frames = data.len() / usize::from(out_channels).max(1);
                let wanted = (frames * stride).min(scratch.len());

                let stale = stale_samples(consumer.slots(), wanted, period, stride);
                if stale > 0
                    && let Ok(chunk) = consumer.read_chunk(stale)
                {
                    chunk.commit_all();
                }

                let available = consumer.slots().min(wanted);
                let available = available - available % stride;

                if let Ok(chunk) = consumer.read_chunk(available) {
                    let (first, second) = chunk.as_slices();
                    scratch[..first.len()].copy_from_slice(first);
                    scratch[first.len()..available].copy_from_slice(second);
                    chunk.commit_all();
                }
                // Underrun: the consumer hears silence for the missing frames
                scratch[available..wanted].fill(0.0);

                engine.render(
                    Some(&[HardwareBuffer::new(in_channels, &scratch[..wanted])]),
                    &mut [HardwareBufferMut::new(out_channels, data)],
                );
            },
            error_callback(sink, Direction::Output),
            None,
        )
        .map_err(build_error)?;

    Ok(vec![input_stream, output_stream])
}

fn build_error(err: cpal::BuildStreamError) -> SessionError {
    match &err {
        cpal::BuildStreamError::DeviceNotAvailable => SessionError::Unavailable(err.to_string()),
        _ => SessionError::Backend(err.to_string()),
    }
}

/// Forward stream errors to the session's event sink.
///
/// A vanished device is reported as a route change so the manager can move to
/// the new default; anything else is a stream failure.
fn error_callback(
    sink: Option<EventSink>,
    direction: Direction,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        tracing::error!(%direction, error = %err, "stream error");
        let Some(sink) = &sink else {
            return;
        };
        let event = match &err {
            cpal::StreamError::DeviceNotAvailable => SessionEvent::RouteChanged(RouteChange::new(
                RouteChangeReason::OldDeviceUnavailable,
                format!("{direction} device unavailable"),
            )),
            _ => SessionEvent::Failed(err.to_string()),
        };
        let _ = sink.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_backlog_is_kept() {
        // stereo, 256-frame periods
        assert_eq!(stale_samples(0, 512, 512, 2), 0);
        assert_eq!(stale_samples(512 * 3, 512, 512, 2), 0);
    }

    #[test]
    fn long_backlog_is_trimmed_to_one_period() {
        let queued = 512 * 8;
        let stale = stale_samples(queued, 512, 512, 2);
        assert_eq!(queued - stale, 512 + 512);
    }

    #[test]
    fn trim_keeps_whole_frames() {
        let stale = stale_samples(3 * 100 + 3 * 400 + 1, 300, 300, 3);
        assert_eq!(stale % 3, 0);
        assert!(stale > 0);
    }
}
