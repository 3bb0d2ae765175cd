//! Deterministic in-process audio hardware.
//!
//! [`StubSession`] implements [`AudioSession`] without touching a device. Its
//! clock is manual: nothing renders until [`StubHandle::render_cycle`] is
//! called, which makes every test reproducible. A [`StubHandle`] stays with
//! the test after the session moves into a manager and is used to inspect
//! state, inject failures and post hardware events.
//!
//! [`StubHandle::spawn_clock`] drives the clock from a thread at the buffer
//! period, for demos that need the stub to behave like real hardware.
//!
//! ## Example
//!
//! ```rust
//! use duplex_core::{AudioIoManager, StreamConfig};
//! use duplex_core::stub::StubSession;
//!
//! let (session, hw) = StubSession::new();
//! hw.set_granted_sample_rate(Some(48000.0));
//!
//! let manager = AudioIoManager::with_callback(session, |buf, _| buf.fill(0.25))?;
//! manager.set_stream_config(StreamConfig::output_only(1))?;
//! manager.setup()?;
//! manager.start()?;
//!
//! let out = hw.render_cycle().expect("armed");
//! assert_eq!(manager.sample_rate(), 48000.0);
//! assert!(out[0].iter().all(|&s| s == 0.25));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::buffer::{HardwareBuffer, HardwareBufferMut};
use crate::events::{InterruptionPhase, RouteChange, RouteChangeReason, SessionEvent};
use crate::render::RenderEngine;
use crate::session::{
    ArmError, AudioSession, EventSink, GrantedFormat, HardwareCapabilities, SessionError,
    SessionRequest,
};

/// Value written into output buffers before each cycle, so untouched output is detectable.
pub const OUTPUT_PREFILL: f32 = 0.5;

#[derive(Debug)]
struct StubState {
    capabilities: HardwareCapabilities,
    granted_sample_rate: Option<f64>,
    granted_buffer_frames: Option<u32>,
    route: String,
    volume: f64,
    interleaved: bool,
    input_level: f32,

    fail_apply: Option<SessionError>,
    fail_activate: Option<SessionError>,
    fail_arm: Option<SessionError>,

    request: Option<SessionRequest>,
    active: bool,
    suspended: bool,
    activations: u32,
    deactivations: u32,
    arms: u32,
    engine: Option<RenderEngine>,
    sink: Option<EventSink>,

    input: Vec<f32>,
    output: Vec<f32>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            capabilities: HardwareCapabilities {
                max_input_channels: 2,
                max_output_channels: 2,
                supports_input_selection: true,
            },
            granted_sample_rate: None,
            granted_buffer_frames: None,
            route: "Stub Speaker".to_string(),
            volume: 1.0,
            interleaved: false,
            input_level: 0.0,
            fail_apply: None,
            fail_activate: None,
            fail_arm: None,
            request: None,
            active: false,
            suspended: false,
            activations: 0,
            deactivations: 0,
            arms: 0,
            engine: None,
            sink: None,
            input: Vec::new(),
            output: Vec::new(),
        }
    }
}

impl StubState {
    fn format(&self) -> Result<GrantedFormat, SessionError> {
        if !self.active {
            return Err(SessionError::Unavailable("session inactive".to_string()));
        }
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| SessionError::Unavailable("no request applied".to_string()))?;
        Ok(GrantedFormat {
            sample_rate: self
                .granted_sample_rate
                .unwrap_or(request.preferred_sample_rate),
            input_channels: request
                .input_channels
                .min(self.capabilities.max_input_channels),
            output_channels: request
                .output_channels
                .min(self.capabilities.max_output_channels),
            buffer_frame_count: self
                .granted_buffer_frames
                .unwrap_or(request.preferred_buffer_frames),
            route: self.route.clone(),
        })
    }

    fn post(&self, event: SessionEvent) -> bool {
        self.sink.as_ref().is_some_and(|sink| sink.send(event).is_ok())
    }
}

/// In-process [`AudioSession`] with a manual clock.
#[derive(Debug)]
pub struct StubSession {
    state: Arc<Mutex<StubState>>,
}

impl StubSession {
    /// Create a stub session and the handle that controls it.
    pub fn new() -> (Self, StubHandle) {
        let state = Arc::new(Mutex::new(StubState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            StubHandle { state },
        )
    }
}

impl AudioSession for StubSession {
    fn name(&self) -> &str {
        "stub"
    }

    fn capabilities(&self) -> Result<HardwareCapabilities, SessionError> {
        Ok(self.state.lock().capabilities)
    }

    fn apply(&mut self, request: &SessionRequest) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_apply.clone() {
            return Err(err);
        }
        state.request = Some(request.clone());
        Ok(())
    }

    fn activate(&mut self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_activate.clone() {
            return Err(err);
        }
        if !state.active {
            state.active = true;
            state.activations += 1;
        }
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.active {
            state.active = false;
            state.deactivations += 1;
        }
        Ok(())
    }

    fn current_format(&self) -> Result<GrantedFormat, SessionError> {
        self.state.lock().format()
    }

    fn output_volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.state.lock().sink = Some(sink);
    }

    fn arm(&mut self, engine: RenderEngine) -> Result<(), ArmError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_arm.clone() {
            return Err(ArmError::new(err, engine));
        }
        if !state.active {
            return Err(ArmError::new(
                SessionError::Unavailable("session inactive".to_string()),
                engine,
            ));
        }
        state.engine = Some(engine);
        state.arms += 1;
        Ok(())
    }

    fn disarm(&mut self) -> Result<Option<RenderEngine>, SessionError> {
        Ok(self.state.lock().engine.take())
    }
}

/// Test-side control of a [`StubSession`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StubHandle {
    state: Arc<Mutex<StubState>>,
}

impl StubHandle {
    /// Override reported capabilities.
    pub fn set_capabilities(&self, capabilities: HardwareCapabilities) {
        self.state.lock().capabilities = capabilities;
    }

    /// Grant this rate instead of the requested one. `None` grants the request.
    pub fn set_granted_sample_rate(&self, rate: Option<f64>) {
        self.state.lock().granted_sample_rate = rate;
    }

    /// Grant this buffer size instead of the requested one.
    pub fn set_granted_buffer_frames(&self, frames: Option<u32>) {
        self.state.lock().granted_buffer_frames = frames;
    }

    /// Present one interleaved buffer per direction instead of one buffer per channel.
    pub fn set_interleaved(&self, interleaved: bool) {
        self.state.lock().interleaved = interleaved;
    }

    /// Constant value presented on every input channel.
    pub fn set_input_level(&self, level: f32) {
        self.state.lock().input_level = level;
    }

    /// Make `apply` fail.
    pub fn fail_apply(&self, error: Option<SessionError>) {
        self.state.lock().fail_apply = error;
    }

    /// Make `activate` fail.
    pub fn fail_activate(&self, error: Option<SessionError>) {
        self.state.lock().fail_activate = error;
    }

    /// Make `arm` fail.
    pub fn fail_arm(&self, error: Option<SessionError>) {
        self.state.lock().fail_arm = error;
    }

    /// Whether the session is active.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Whether an engine is armed.
    pub fn is_armed(&self) -> bool {
        self.state.lock().engine.is_some()
    }

    /// Number of inactive → active transitions.
    pub fn activations(&self) -> u32 {
        self.state.lock().activations
    }

    /// Number of active → inactive transitions.
    pub fn deactivations(&self) -> u32 {
        self.state.lock().deactivations
    }

    /// Number of successful `arm` calls.
    pub fn arm_count(&self) -> u32 {
        self.state.lock().arms
    }

    /// The last request applied.
    pub fn last_request(&self) -> Option<SessionRequest> {
        self.state.lock().request.clone()
    }

    /// The route name reported in the granted format.
    pub fn route(&self) -> String {
        self.state.lock().route.clone()
    }

    /// Post a raw event. Returns `false` if nobody is subscribed.
    pub fn post(&self, event: SessionEvent) -> bool {
        self.state.lock().post(event)
    }

    /// Switch to a new route, optionally changing the granted rate, and announce it.
    pub fn change_route(
        &self,
        reason: RouteChangeReason,
        route: impl Into<String>,
        sample_rate: Option<f64>,
    ) -> bool {
        let mut state = self.state.lock();
        state.route = route.into();
        if sample_rate.is_some() {
            state.granted_sample_rate = sample_rate;
        }
        let change = RouteChange::new(reason, state.route.clone());
        state.post(SessionEvent::RouteChanged(change))
    }

    /// Revoke hardware access and announce the interruption.
    pub fn begin_interruption(&self) -> bool {
        let mut state = self.state.lock();
        state.suspended = true;
        if state.active {
            state.active = false;
            state.deactivations += 1;
        }
        state.post(SessionEvent::Interruption(InterruptionPhase::Began))
    }

    /// End the interruption.
    pub fn end_interruption(&self, should_resume: bool) -> bool {
        let mut state = self.state.lock();
        state.suspended = false;
        state.post(SessionEvent::Interruption(InterruptionPhase::Ended {
            should_resume,
        }))
    }

    /// Change the output volume and announce it.
    pub fn set_volume(&self, volume: f64) -> bool {
        let mut state = self.state.lock();
        state.volume = volume;
        state.post(SessionEvent::VolumeChanged(volume))
    }

    /// Report a stream failure.
    pub fn fail_stream(&self, message: impl Into<String>) -> bool {
        self.state.lock().post(SessionEvent::Failed(message.into()))
    }

    /// Run one render cycle of the granted buffer size.
    ///
    /// Returns the output per channel, or `None` when nothing is armed.
    pub fn render_cycle(&self) -> Option<Vec<Vec<f32>>> {
        let frames = {
            let state = self.state.lock();
            state.format().ok()?.buffer_frame_count as usize
        };
        self.render_frames(frames)
    }

    /// Run one hardware callback of `frames` frames.
    pub fn render_frames(&self, frames: usize) -> Option<Vec<Vec<f32>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.suspended {
            return None;
        }
        let format = state.format().ok()?;
        let engine = state.engine.as_mut()?;

        let in_ch = usize::from(format.input_channels);
        let out_ch = usize::from(format.output_channels);
        state.input.clear();
        state.input.resize(in_ch * frames, state.input_level);
        state.output.clear();
        state.output.resize(out_ch * frames, OUTPUT_PREFILL);

        if state.interleaved {
            let input = [HardwareBuffer::new(format.input_channels, &state.input)];
            let mut output = [HardwareBufferMut::new(
                format.output_channels,
                &mut state.output,
            )];
            let out_len = usize::from(out_ch > 0);
            engine.render((in_ch > 0).then_some(&input[..]), &mut output[..out_len]);
        } else {
            let input: Vec<_> = state
                .input
                .chunks_exact(frames.max(1))
                .map(|c| HardwareBuffer::new(1, c))
                .collect();
            let mut output: Vec<_> = state
                .output
                .chunks_exact_mut(frames.max(1))
                .map(|c| HardwareBufferMut::new(1, c))
                .collect();
            engine.render((in_ch > 0).then_some(&input[..]), &mut output);
        }

        Some(planar(&state.output, out_ch, frames, state.interleaved))
    }

    /// Drive the clock from a thread, one cycle per buffer period, until the
    /// returned guard is dropped.
    pub fn spawn_clock(&self) -> std::io::Result<StubClock> {
        let handle = self.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("duplex-stub-clock".into())
            .spawn(move || {
                let mut next = Instant::now();
                while flag.load(Ordering::Acquire) {
                    let period = handle.period().unwrap_or(Duration::from_millis(5));
                    handle.render_cycle();
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
            })?;
        Ok(StubClock {
            running,
            thread: Some(thread),
        })
    }

    fn period(&self) -> Option<Duration> {
        let format = self.state.lock().format().ok()?;
        Duration::try_from_secs_f64(f64::from(format.buffer_frame_count) / format.sample_rate)
            .ok()
            .filter(|period| !period.is_zero())
    }
}

fn planar(samples: &[f32], channels: usize, frames: usize, interleaved: bool) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|c| {
            if interleaved {
                samples.iter().skip(c).step_by(channels).copied().collect()
            } else {
                samples[c * frames..(c + 1) * frames].to_vec()
            }
        })
        .collect()
}

/// Running stub clock. Dropping it stops the clock thread.
#[derive(Debug)]
pub struct StubClock {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StubClock {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
