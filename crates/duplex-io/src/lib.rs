//! Platform audio for the duplex bridge.
//!
//! This crate provides:
//!
//! - **cpal session**: [`CpalSession`], an [`AudioSession`](duplex_core::AudioSession)
//!   over the system audio host (ALSA/JACK, CoreAudio, WASAPI)
//! - **Device listing**: [`list_devices`] and [`default_device`]
//! - **Settings**: [`Settings`], the TOML file the `duplex` CLI reads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use duplex_core::{AudioIoManager, StreamConfig};
//! use duplex_io::CpalSession;
//!
//! let session = CpalSession::new();
//! let manager = AudioIoManager::with_callback(session, |buf, _info| buf.fill(0.0))?;
//! manager.set_stream_config(StreamConfig::output_only(2))?;
//! manager.setup()?;
//! manager.start()?;
//! ```

mod cpal_session;
mod devices;
mod format;
pub mod paths;
mod route_poll;
pub mod settings;
mod stream_thread;

pub use cpal_session::{CpalSession, DEFAULT_ROUTE_POLL_INTERVAL};
pub use devices::{AudioDevice, DeviceKind, default_device, list_devices, select_device};
pub use settings::{DeviceSettings, Settings, SettingsError};

/// Error types for device lookup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The audio host could not enumerate devices.
    #[error("Audio host error: {0}")]
    Host(String),

    /// No audio device available on the system.
    #[error("No {0} device available")]
    NoDevice(DeviceKind),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Convenience result type for device lookup.
pub type Result<T> = std::result::Result<T, Error>;
