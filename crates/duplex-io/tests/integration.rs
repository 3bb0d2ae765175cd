//! Integration tests for duplex-io.
//!
//! Settings files are exercised against a temporary directory. Nothing here
//! needs a real audio device.

use duplex_core::{PolarPattern, StreamConfig};
use duplex_io::{DeviceKind, Settings, SettingsError, select_device};
use tempfile::TempDir;

// ============================================================================
// Settings files
// ============================================================================

#[test]
fn save_then_load_preserves_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("duplex.toml");

    let mut settings = Settings::default();
    settings.stream = StreamConfig::duplex(1, 2).with_buffer_frames(128);
    settings.stream.input_polar_pattern = Some(PolarPattern::Cardioid);
    settings.devices.output = Some("Speakers".into());
    settings.route_poll_interval_ms = 250;
    settings.save(&path).unwrap();

    let loaded = Settings::load(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn save_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config").join("duplex.toml");

    Settings::default().save(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn load_or_default_without_file() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_or_default(dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn load_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Settings::load(&path).unwrap_err();
    assert!(matches!(err, SettingsError::ReadFile { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn load_rejects_malformed_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("duplex.toml");
    std::fs::write(&path, "[stream\noutput_channels = 2").unwrap();
    assert!(matches!(
        Settings::load(&path),
        Err(SettingsError::TomlParse(_))
    ));
}

#[test]
fn load_rejects_out_of_range_buffer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("duplex.toml");
    std::fs::write(&path, "[stream]\nbuffer_frame_count = 0\n").unwrap();
    assert!(matches!(
        Settings::load(&path),
        Err(SettingsError::Invalid(_))
    ));
}

// ============================================================================
// Device selection
// ============================================================================

#[test]
fn select_device_prefers_index_then_exact_then_partial() {
    let names: Vec<String> = ["Built-in", "USB Audio 2", "USB Audio"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();

    assert_eq!(select_device(&names, "0", DeviceKind::Output).unwrap(), 0);
    assert_eq!(select_device(&names, "USB Audio", DeviceKind::Output).unwrap(), 2);
    assert_eq!(select_device(&names, "usb", DeviceKind::Output).unwrap(), 1);
    assert!(select_device(&names, "Bluetooth", DeviceKind::Output).is_err());
}

#[test]
fn list_devices_does_not_panic() {
    let _ = duplex_io::list_devices();
    let _ = duplex_io::default_device();
}
