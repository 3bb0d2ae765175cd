//! TOML settings file.
//!
//! ```toml
//! route_poll_interval_ms = 500
//!
//! [stream]
//! input_channels = 1
//! output_channels = 2
//! preferred_sample_rate = 48000.0
//! buffer_frame_count = 256
//!
//! [devices]
//! output = "USB Audio"
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use duplex_core::{ConfigError, StreamConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpal_session::DEFAULT_ROUTE_POLL_INTERVAL;

/// Errors that can occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The stream section is not a usable configuration
    #[error("invalid stream settings: {0}")]
    Invalid(#[from] ConfigError),
}

impl SettingsError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SettingsError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SettingsError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SettingsError::CreateDir {
            path: path.into(),
            source,
        }
    }
}

/// Device selection. `None` follows the host default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Input device name, partial name or index.
    pub input: Option<String>,
    /// Output device name, partial name or index.
    pub output: Option<String>,
}

/// Settings read by the `duplex` CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default-device polling interval in milliseconds.
    pub route_poll_interval_ms: u64,
    /// Requested stream parameters.
    pub stream: StreamConfig,
    /// Device selection.
    pub devices: DeviceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            route_poll_interval_ms: DEFAULT_ROUTE_POLL_INTERVAL.as_millis() as u64,
            stream: StreamConfig::default(),
            devices: DeviceSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| SettingsError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load settings from `path`, or the defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(toml_str)?;
        settings.stream.validate()?;
        Ok(settings)
    }

    /// Save the settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| SettingsError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Route polling interval.
    pub fn route_poll_interval(&self) -> Duration {
        Duration::from_millis(self.route_poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::InputOrientation;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.route_poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_stream_section_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [stream]
            input_channels = 1
            preferred_sample_rate = 48000.0
            input_orientation = "bottom"
            "#,
        )
        .unwrap();
        assert_eq!(settings.stream.input_channels, 1);
        assert_eq!(settings.stream.output_channels, 2);
        assert_eq!(settings.stream.preferred_sample_rate, 48000.0);
        assert_eq!(settings.stream.buffer_frame_count, 256);
        assert_eq!(settings.stream.input_orientation, Some(InputOrientation::Bottom));
    }

    #[test]
    fn devices_section_parses() {
        let settings = Settings::from_toml(
            r#"
            [devices]
            output = "USB Audio"
            "#,
        )
        .unwrap();
        assert_eq!(settings.devices.output.as_deref(), Some("USB Audio"));
        assert_eq!(settings.devices.input, None);
    }

    #[test]
    fn invalid_stream_is_rejected() {
        let err = Settings::from_toml(
            r#"
            [stream]
            input_channels = 0
            output_channels = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn unknown_enum_value_is_a_parse_error() {
        let err = Settings::from_toml(
            r#"
            [stream]
            input_polar_pattern = "figure_eight"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::TomlParse(_)));
    }

    #[test]
    fn to_toml_parses_back() {
        let mut settings = Settings::default();
        settings.stream = StreamConfig::duplex(1, 2).with_sample_rate(48000.0);
        settings.devices.input = Some("2".into());
        let text = settings.to_toml().unwrap();
        assert_eq!(Settings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn read_file_display_and_source() {
        let err = SettingsError::read_file("/a/duplex.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/duplex.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn create_dir_factory_produces_correct_variant() {
        let err = SettingsError::create_dir("/dir/path", mock_io_err());
        assert!(
            matches!(err, SettingsError::CreateDir { ref path, .. } if path == Path::new("/dir/path"))
        );
    }
}
