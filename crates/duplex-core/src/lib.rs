//! Real-time audio I/O bridge.
//!
//! `duplex-core` owns a hardware audio stream through a platform
//! [`AudioSession`] and, on every render cycle, hands the consumer a planar
//! per-channel `f32` view to read input from and write output into.
//!
//! ## Components
//!
//! - [`buffer`]: hardware buffer list ⇄ planar view, allocation-free
//! - [`negotiate`]: request parameters, read back what the hardware granted
//! - [`render`]: [`RenderEngine`], the real-time entry point
//! - [`lifecycle`]: `Uninitialized → Configured → Started ⇄ Stopped → TornDown`
//! - [`observer`]: non-real-time thread handling route, interruption and volume events
//! - [`binding`]: render function or weak delegate
//! - [`manager`]: [`AudioIoManager`], the public façade
//! - [`stub`]: deterministic in-process hardware for tests and demos
//!
//! ## Quick Start
//!
//! ```rust
//! use duplex_core::{AudioIoManager, StreamConfig};
//! use duplex_core::stub::StubSession;
//!
//! let (session, hw) = StubSession::new();
//! let mut phase = 0.0f32;
//! let manager = AudioIoManager::with_callback(session, move |buf, info| {
//!     let step = 440.0 * std::f32::consts::TAU / info.sample_rate as f32;
//!     for ch in buf.iter_mut() {
//!         let mut p = phase;
//!         for s in ch.iter_mut() {
//!             *s = p.sin() * 0.1;
//!             p += step;
//!         }
//!     }
//!     phase = (phase + step * buf.frame_count() as f32) % std::f32::consts::TAU;
//! })?;
//!
//! manager.set_stream_config(StreamConfig::output_only(2))?;
//! let params = manager.setup()?;
//! manager.start()?;
//! hw.render_cycle();
//! manager.stop()?;
//! manager.teardown()?;
//! assert_eq!(params.buffer_frame_count, 256);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binding;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod manager;
pub mod negotiate;
pub mod observer;
pub mod render;
pub mod session;
pub mod stub;

pub use binding::{AudioDelegate, ConsumerBinding, ReleaseHandle, RenderFn, RenderInfo};
pub use buffer::{ChannelBuffers, HardwareBuffer, HardwareBufferMut};
pub use config::{
    DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE, Direction, InputOrientation, NegotiatedParams,
    PolarPattern, StreamConfig,
};
pub use error::{ConfigError, RuntimeError};
pub use events::{InterruptionPhase, RouteChange, RouteChangeReason, SessionEvent};
pub use lifecycle::LifecycleState;
pub use manager::AudioIoManager;
pub use render::{RenderEngine, RenderStats, StatsSnapshot};
pub use session::{
    ArmError, AudioSession, CategoryOptions, EventSink, GrantedFormat, HardwareCapabilities,
    SessionCategory, SessionError, SessionRequest,
};
