//! The public façade: [`AudioIoManager`].
//!
//! A manager owns one platform session, one render engine and the event
//! observer thread. Several managers may coexist; there is no global
//! instance.
//!
//! ## Threads
//!
//! ```text
//!  API thread ──┐                       ┌── hardware RT thread
//!               ▼                       ▼
//!        Mutex<Inner> ◀── observer   RenderEngine (armed in the session)
//!               │                       │
//!               └──── ReleaseHandle, RenderStats (atomics) ────┘
//! ```
//!
//! Manager state lives behind a `parking_lot::Mutex` the render thread never
//! touches. The engine moves into the session while started and back into
//! `Inner` while stopped, so reconfiguration always works on a disarmed
//! engine. Consumer notifications run with the lock released, so consumers
//! may call back into the manager.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::binding::{AudioDelegate, ConsumerBinding, ReleaseHandle, RenderInfo};
use crate::buffer::ChannelBuffers;
use crate::config::{InputOrientation, NegotiatedParams, PolarPattern, StreamConfig};
use crate::error::{ConfigError, RuntimeError};
use crate::events::{InterruptionPhase, RouteChange, SessionEvent};
use crate::lifecycle::{LifecycleState, Operation, Step, plan};
use crate::negotiate::{fit_to_capabilities, negotiate, params_from_format};
use crate::observer::{EventHandler, EventObserver};
use crate::render::{RenderEngine, RenderStats, StatsSnapshot};
use crate::session::{ArmError, AudioSession};

type VolumeCallback = Box<dyn Fn(f64) + Send + Sync>;
type RouteCallback = Box<dyn Fn(&RouteChange) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&RuntimeError) + Send + Sync>;

struct Inner {
    session: Box<dyn AudioSession>,
    state: LifecycleState,
    config: StreamConfig,
    negotiated: Option<NegotiatedParams>,
    route: String,
    /// Present whenever the engine is not armed in the session.
    engine: Option<RenderEngine>,
    interrupted: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    volume: AtomicU64,
    release: ReleaseHandle,
    stats: Arc<RenderStats>,
    notifier: Option<Weak<dyn AudioDelegate>>,
    on_volume: ArcSwapOption<VolumeCallback>,
    on_route: ArcSwapOption<RouteCallback>,
    on_error: ArcSwapOption<ErrorCallback>,
}

/// Real-time audio I/O manager.
///
/// ## Lifecycle
///
/// `setup()` negotiates, `start()` arms the hardware, `stop()` disarms it and
/// `teardown()` releases the session. See [`crate::lifecycle`] for the full
/// transition table. Dropping a manager stops and tears it down.
pub struct AudioIoManager {
    shared: Arc<Shared>,
    observer: EventObserver,
}

impl AudioIoManager {
    /// Bind a render function.
    pub fn with_callback<S, F>(session: S, callback: F) -> Result<Self, RuntimeError>
    where
        S: AudioSession + 'static,
        F: FnMut(&mut ChannelBuffers<'_>, &RenderInfo) + Send + 'static,
    {
        Self::with_binding(Box::new(session), ConsumerBinding::function(callback))
    }

    /// Bind a delegate. The manager holds it weakly.
    pub fn with_delegate<S, D>(session: S, delegate: &Arc<D>) -> Result<Self, RuntimeError>
    where
        S: AudioSession + 'static,
        D: AudioDelegate + 'static,
    {
        Self::with_binding(Box::new(session), ConsumerBinding::delegate(delegate))
    }

    /// No consumer: every cycle renders silence.
    pub fn unbound<S: AudioSession + 'static>(session: S) -> Result<Self, RuntimeError> {
        Self::with_binding(Box::new(session), ConsumerBinding::Unbound)
    }

    /// Build a manager from an already boxed session and binding.
    pub fn with_binding(
        mut session: Box<dyn AudioSession>,
        binding: ConsumerBinding,
    ) -> Result<Self, RuntimeError> {
        let notifier = binding.notifier();
        let engine = RenderEngine::new(binding);
        let release = engine.release_handle();
        let stats = engine.stats();

        let (tx, rx) = crossbeam_channel::unbounded();
        session.subscribe(tx);
        let volume = session.output_volume().clamp(0.0, 1.0);
        tracing::debug!(session = session.name(), "audio manager created");

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                session,
                state: LifecycleState::Uninitialized,
                config: StreamConfig::default(),
                negotiated: None,
                route: String::new(),
                engine: Some(engine),
                interrupted: false,
            }),
            volume: AtomicU64::new(volume.to_bits()),
            release,
            stats,
            notifier,
            on_volume: ArcSwapOption::empty(),
            on_route: ArcSwapOption::empty(),
            on_error: ArcSwapOption::empty(),
        });

        let observer = EventObserver::spawn(rx, Arc::downgrade(&shared))
            .map_err(RuntimeError::ObserverSpawn)?;

        Ok(Self { shared, observer })
    }

    // ------------------------------------------------------------------
    // Configuration (Uninitialized only)
    // ------------------------------------------------------------------

    /// Replace the requested stream configuration.
    pub fn set_stream_config(&self, config: StreamConfig) -> Result<(), RuntimeError> {
        self.configure("set_stream_config", |c| *c = config)
    }

    /// Prefer the speaker route.
    pub fn set_route_to_speaker(&self, enabled: bool) -> Result<(), RuntimeError> {
        self.configure("set_route_to_speaker", |c| c.route_to_speaker = enabled)
    }

    /// Mix with other applications' audio.
    pub fn set_mix_with_other_audio(&self, enabled: bool) -> Result<(), RuntimeError> {
        self.configure("set_mix_with_other_audio", |c| c.mix_with_others = enabled)
    }

    /// Select the input data source by orientation.
    pub fn set_input_orientation(
        &self,
        orientation: Option<InputOrientation>,
    ) -> Result<(), RuntimeError> {
        self.configure("set_input_orientation", |c| {
            c.input_orientation = orientation;
        })
    }

    /// Select the input polar pattern.
    pub fn set_input_polar_pattern(
        &self,
        pattern: Option<PolarPattern>,
    ) -> Result<(), RuntimeError> {
        self.configure("set_input_polar_pattern", |c| {
            c.input_polar_pattern = pattern;
        })
    }

    /// The requested configuration.
    pub fn stream_config(&self) -> StreamConfig {
        self.shared.inner.lock().config.clone()
    }

    fn configure(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut StreamConfig),
    ) -> Result<(), RuntimeError> {
        let mut inner = self.shared.inner.lock();
        if inner.state != LifecycleState::Uninitialized {
            return Err(RuntimeError::invalid_state(operation, inner.state));
        }
        apply(&mut inner.config);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Negotiate the stream and activate the session.
    ///
    /// On failure the manager stays `Uninitialized` and the session inactive;
    /// change the configuration and retry.
    pub fn setup(&self) -> Result<NegotiatedParams, ConfigError> {
        let mut inner = self.shared.inner.lock();
        if plan(inner.state, Operation::Setup).is_err() {
            return Err(ConfigError::InvalidState(inner.state));
        }

        let config = inner.config.clone();
        let params = negotiate(inner.session.as_mut(), &config)?;
        inner.route = inner
            .session
            .current_format()
            .map(|format| format.route)
            .unwrap_or_default();
        if let Some(engine) = inner.engine.as_mut() {
            engine.configure(params);
        }
        inner.negotiated = Some(params);
        inner.state = LifecycleState::Configured;

        tracing::info!(session = inner.session.name(), %params, "audio session configured");
        Ok(params)
    }

    /// Start rendering. A no-op when already started.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut inner = self.shared.inner.lock();
        let next = match plan(inner.state, Operation::Start) {
            Ok(Step::Stay) => return Ok(()),
            Ok(Step::Move(next)) => next,
            Err(_) => return Err(RuntimeError::invalid_state("start", inner.state)),
        };
        if inner.interrupted {
            return Err(RuntimeError::Interrupted);
        }

        arm(&mut inner)?;
        inner.state = next;
        tracing::info!("audio started");
        Ok(())
    }

    /// Stop rendering. A no-op when not started.
    ///
    /// When this returns the hardware will not invoke the render path again.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        let mut inner = self.shared.inner.lock();
        let next = match plan(inner.state, Operation::Stop) {
            Ok(Step::Stay) => return Ok(()),
            Ok(Step::Move(next)) => next,
            Err(_) => return Err(RuntimeError::invalid_state("stop", inner.state)),
        };

        if !inner.interrupted {
            disarm(&mut inner)?;
        }
        inner.state = next;
        tracing::info!("audio stopped");
        Ok(())
    }

    /// Deactivate the session and release resources. Terminal.
    pub fn teardown(&self) -> Result<(), RuntimeError> {
        let mut inner = self.shared.inner.lock();
        let next = match plan(inner.state, Operation::Teardown) {
            Ok(Step::Stay) => return Ok(()),
            Ok(Step::Move(next)) => next,
            Err(_) => return Err(RuntimeError::invalid_state("teardown", inner.state)),
        };

        inner.session.deactivate()?;
        inner.state = next;
        inner.negotiated = None;
        inner.interrupted = false;
        tracing::info!("audio session torn down");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.shared.inner.lock().state
    }

    /// Whether the session has been set up and not torn down or invalidated.
    pub fn is_initialised(&self) -> bool {
        self.state().is_active()
    }

    /// Negotiated parameters while `Configured` or `Started`.
    pub fn negotiated(&self) -> Option<NegotiatedParams> {
        let inner = self.shared.inner.lock();
        inner.negotiated.filter(|_| inner.state.is_negotiated())
    }

    /// Effective sample rate, or `0.0` outside `Configured`/`Started`.
    pub fn sample_rate(&self) -> f64 {
        self.negotiated().map_or(0.0, |p| p.sample_rate)
    }

    /// Last observed output volume in `[0, 1]`.
    pub fn volume(&self) -> f64 {
        f64::from_bits(self.shared.volume.load(Ordering::Acquire))
    }

    /// Render counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Release the consumer binding. Later cycles render silence and the
    /// delegate receives no further notifications. Cannot be undone.
    pub fn release_binding(&self) {
        self.shared.release.release();
    }

    /// Called on the observer thread after each volume change.
    pub fn set_volume_changed_callback<F>(&self, callback: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.shared
            .on_volume
            .store(Some(Arc::new(Box::new(callback) as VolumeCallback)));
    }

    /// Called on the observer thread after each route change.
    pub fn set_route_changed_callback<F>(&self, callback: F)
    where
        F: Fn(&RouteChange) + Send + Sync + 'static,
    {
        self.shared
            .on_route
            .store(Some(Arc::new(Box::new(callback) as RouteCallback)));
    }

    /// Called on the observer thread for asynchronous runtime errors.
    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&RuntimeError) + Send + Sync + 'static,
    {
        self.shared
            .on_error
            .store(Some(Arc::new(Box::new(callback) as ErrorCallback)));
    }
}

impl Drop for AudioIoManager {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "stop on drop failed");
        }
        if self.state().is_active()
            && let Err(err) = self.teardown()
        {
            tracing::warn!(error = %err, "teardown on drop failed");
        }
        self.observer.shutdown();
    }
}

impl fmt::Debug for AudioIoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("AudioIoManager")
            .field("session", &inner.session.name())
            .field("state", &inner.state)
            .field("negotiated", &inner.negotiated)
            .field("interrupted", &inner.interrupted)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------
// Hardware helpers, called with the lock held
// ----------------------------------------------------------------------

fn arm(inner: &mut Inner) -> Result<(), RuntimeError> {
    let engine = inner.engine.take().ok_or_else(|| {
        RuntimeError::Hardware("render engine was not returned by the session".into())
    })?;
    match inner.session.arm(engine) {
        Ok(()) => Ok(()),
        Err(ArmError { error, engine }) => {
            inner.engine = engine;
            Err(error.into())
        }
    }
}

fn disarm(inner: &mut Inner) -> Result<(), RuntimeError> {
    if let Some(engine) = inner.session.disarm()? {
        inner.engine = Some(engine);
    }
    Ok(())
}

/// Drop back to `Uninitialized`. The caller must run `setup()` again.
fn invalidate(inner: &mut Inner) {
    if plan(inner.state, Operation::Invalidate).is_err() {
        return;
    }
    if let Err(err) = disarm(inner) {
        tracing::warn!(error = %err, "disarm during invalidation");
    }
    if let Err(err) = inner.session.deactivate() {
        tracing::warn!(error = %err, "deactivate during invalidation");
    }
    inner.state = LifecycleState::Uninitialized;
    inner.negotiated = None;
    inner.interrupted = false;
    tracing::warn!("audio session invalidated, setup required");
}

fn reconfigure(inner: &mut Inner) -> Result<(), RuntimeError> {
    if !inner.state.is_active() || inner.interrupted {
        return Ok(());
    }

    let caps = inner.session.capabilities()?;
    let config = match fit_to_capabilities(&inner.config, &caps) {
        Ok(config) => config,
        Err(err) => {
            invalidate(inner);
            return Err(err.into());
        }
    };

    let format = inner.session.current_format()?;
    let fresh = params_from_format(&config, &format)?;
    if inner.negotiated == Some(fresh) && inner.route == format.route {
        return Ok(());
    }

    let was_armed = inner.state == LifecycleState::Started;
    if was_armed {
        disarm(inner)?;
    }

    // `inner.config` keeps the full request for wider routes.
    let params = match negotiate(inner.session.as_mut(), &config) {
        Ok(params) => params,
        Err(err) => {
            invalidate(inner);
            return Err(err.into());
        }
    };
    if let Some(engine) = inner.engine.as_mut() {
        engine.configure(params);
    }
    inner.negotiated = Some(params);
    inner.route = format.route;

    if was_armed && let Err(err) = arm(inner) {
        invalidate(inner);
        return Err(err);
    }
    tracing::info!(route = %inner.route, %params, "reconfigured after route change");
    Ok(())
}

fn resume(inner: &mut Inner) -> Result<(), RuntimeError> {
    inner.session.activate()?;
    if inner.state == LifecycleState::Started {
        arm(inner)?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Event handling, on the observer thread
// ----------------------------------------------------------------------

impl Shared {
    fn delegate(&self) -> Option<Arc<dyn AudioDelegate>> {
        if self.release.is_released() {
            return None;
        }
        self.notifier.as_ref().and_then(Weak::upgrade)
    }

    fn notify_error(&self, error: &RuntimeError) {
        tracing::error!(error = %error, "audio runtime error");
        if let Some(delegate) = self.delegate() {
            delegate.on_error(error);
        }
        if let Some(callback) = self.on_error.load_full() {
            callback(error);
        }
    }

    fn volume_changed(&self, volume: f64) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume.store(volume.to_bits(), Ordering::Release);
        if let Some(callback) = self.on_volume.load_full() {
            callback(volume);
        }
    }

    fn route_changed(&self, change: &RouteChange) {
        tracing::info!(reason = %change.reason, route = %change.description, "route changed");
        let failure = {
            let mut inner = self.inner.lock();
            reconfigure(&mut inner).err()
        };

        if let Some(delegate) = self.delegate() {
            delegate.on_route_changed(change);
        }
        if let Some(callback) = self.on_route.load_full() {
            callback(change);
        }
        if let Some(err) = failure {
            self.notify_error(&err);
        }
    }

    fn interruption(&self, phase: InterruptionPhase) {
        let failure = {
            let mut inner = self.inner.lock();
            match phase {
                InterruptionPhase::Began => {
                    if inner.state.is_active() && !inner.interrupted {
                        if inner.state == LifecycleState::Started
                            && let Err(err) = disarm(&mut inner)
                        {
                            tracing::warn!(error = %err, "disarm on interruption");
                        }
                        inner.interrupted = true;
                        tracing::info!("audio interrupted");
                    }
                    None
                }
                InterruptionPhase::Ended { should_resume } if inner.interrupted => {
                    inner.interrupted = false;
                    let resumed = should_resume && {
                        match resume(&mut inner) {
                            Ok(()) => true,
                            Err(err) => {
                                tracing::warn!(error = %err, "resume after interruption failed");
                                false
                            }
                        }
                    };
                    if resumed {
                        tracing::info!("audio resumed after interruption");
                        None
                    } else {
                        invalidate(&mut inner);
                        Some(RuntimeError::InterruptionNotResumable)
                    }
                }
                InterruptionPhase::Ended { .. } => None,
            }
        };

        if let Some(delegate) = self.delegate() {
            delegate.on_interruption(phase);
        }
        if let Some(err) = failure {
            self.notify_error(&err);
        }
    }
}

impl EventHandler for Shared {
    fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::VolumeChanged(volume) => self.volume_changed(volume),
            SessionEvent::RouteChanged(change) => self.route_changed(&change),
            SessionEvent::Interruption(phase) => self.interruption(phase),
            SessionEvent::Failed(message) => self.notify_error(&RuntimeError::Hardware(message)),
        }
    }
}
