//! Device enumeration and lookup via cpal.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::{Error, Result};

/// Extract device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Stream direction of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Capture device.
    Input,
    /// Playback device.
    Output,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Audio device information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device supports audio input.
    pub is_input: bool,
    /// Whether the device supports audio output.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Widest supported input channel count.
    pub max_input_channels: u16,
    /// Widest supported output channel count.
    pub max_output_channels: u16,
}

impl AudioDevice {
    fn describe(device: &Device, name: String) -> Self {
        let default_sample_rate = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .map(|c| c.sample_rate())
            .unwrap_or(48000);
        let max_input_channels = max_channels(device, DeviceKind::Input);
        let max_output_channels = max_channels(device, DeviceKind::Output);

        Self {
            name,
            is_input: max_input_channels > 0,
            is_output: max_output_channels > 0,
            default_sample_rate,
            max_input_channels,
            max_output_channels,
        }
    }
}

/// Widest channel count across the device's supported configurations.
pub(crate) fn max_channels(device: &Device, kind: DeviceKind) -> u16 {
    let widest = match kind {
        DeviceKind::Input => device
            .supported_input_configs()
            .ok()
            .and_then(|configs| configs.map(|c| c.channels()).max()),
        DeviceKind::Output => device
            .supported_output_configs()
            .ok()
            .and_then(|configs| configs.map(|c| c.channels()).max()),
    };
    widest.unwrap_or(0)
}

/// List all available audio devices.
pub fn list_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDevice> = Vec::new();

    for kind in [DeviceKind::Input, DeviceKind::Output] {
        let Ok(found) = devices_of(&host, kind) else {
            continue;
        };
        for device in found {
            if let Ok(name) = device_name(&device) {
                // Duplex devices show up in both lists
                if devices.iter().any(|d| d.name == name) {
                    continue;
                }
                devices.push(AudioDevice::describe(&device, name));
            }
        }
    }

    Ok(devices)
}

/// Get the default input and output device info.
pub fn default_device() -> Result<(Option<AudioDevice>, Option<AudioDevice>)> {
    let host = cpal::default_host();
    let describe = |kind| {
        default_of(&host, kind)
            .and_then(|d| device_name(&d).ok().map(|name| AudioDevice::describe(&d, name)))
    };

    Ok((describe(DeviceKind::Input), describe(DeviceKind::Output)))
}

pub(crate) fn devices_of(host: &Host, kind: DeviceKind) -> Result<Vec<Device>> {
    let devices: std::result::Result<Vec<Device>, cpal::DevicesError> = match kind {
        DeviceKind::Input => host.input_devices().map(Iterator::collect),
        DeviceKind::Output => host.output_devices().map(Iterator::collect),
    };
    devices.map_err(|e| Error::Host(e.to_string()))
}

pub(crate) fn default_of(host: &Host, kind: DeviceKind) -> Option<Device> {
    match kind {
        DeviceKind::Input => host.default_input_device(),
        DeviceKind::Output => host.default_output_device(),
    }
}

/// Resolve a device by name or index, or the host default when `None`.
pub(crate) fn find_device(host: &Host, kind: DeviceKind, name_or_index: Option<&str>) -> Result<Device> {
    let Some(query) = name_or_index else {
        return default_of(host, kind).ok_or(Error::NoDevice(kind));
    };

    let devices = devices_of(host, kind)?;
    let names: Vec<String> = devices
        .iter()
        .map(|d| device_name(d).unwrap_or_default())
        .collect();
    let index = select_device(&names, query, kind)?;

    devices
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::DeviceNotFound(query.to_string()))
}

/// Pick a device from a list of names by index, exact name, or fuzzy match.
///
/// The `name_or_index` can be:
/// - A numeric index (e.g., "0", "1")
/// - An exact device name
/// - A partial device name (case-insensitive)
///
/// With several partial matches the first one wins and a warning is logged.
pub fn select_device(names: &[String], name_or_index: &str, kind: DeviceKind) -> Result<usize> {
    if let Ok(index) = name_or_index.parse::<usize>() {
        return if index < names.len() {
            Ok(index)
        } else {
            Err(Error::DeviceNotFound(format!(
                "{} device index {} (only {} devices available)",
                kind,
                index,
                names.len()
            )))
        };
    }

    if let Some(index) = names.iter().position(|n| n == name_or_index) {
        return Ok(index);
    }

    let search_lower = name_or_index.to_lowercase();
    let matches: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.to_lowercase().contains(&search_lower))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [] => Err(Error::DeviceNotFound(format!(
            "no {} device matching '{}'",
            kind, name_or_index
        ))),
        [only] => Ok(*only),
        [first, ..] => {
            let candidates: Vec<&str> = matches.iter().map(|&i| names[i].as_str()).collect();
            tracing::warn!(
                query = name_or_index,
                %kind,
                ?candidates,
                chosen = names[*first].as_str(),
                "device query matches several devices, using the first"
            );
            Ok(*first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_list_devices() {
        // Device availability depends on the system; this only checks for panics.
        let _ = list_devices();
    }

    #[test]
    fn test_default_device() {
        let _ = default_device();
    }

    #[test]
    fn select_by_index() {
        let list = names(&["Built-in Output", "USB Audio"]);
        assert_eq!(select_device(&list, "1", DeviceKind::Output).unwrap(), 1);
    }

    #[test]
    fn select_index_out_of_range() {
        let list = names(&["Built-in Output"]);
        let err = select_device(&list, "3", DeviceKind::Output).unwrap_err();
        assert!(err.to_string().contains("only 1 devices"), "got: {err}");
    }

    #[test]
    fn exact_name_beats_partial_match() {
        let list = names(&["USB Audio Pro", "USB Audio"]);
        assert_eq!(select_device(&list, "USB Audio", DeviceKind::Input).unwrap(), 1);
    }

    #[test]
    fn partial_match_is_case_insensitive() {
        let list = names(&["Built-in Microphone", "Scarlett 2i2 USB"]);
        assert_eq!(select_device(&list, "scarlett", DeviceKind::Input).unwrap(), 1);
    }

    #[test]
    fn ambiguous_match_takes_first() {
        let list = names(&["Speakers (Realtek)", "Headphones", "Speakers (USB)"]);
        assert_eq!(select_device(&list, "speakers", DeviceKind::Output).unwrap(), 0);
    }

    #[test]
    fn no_match_names_the_kind() {
        let list = names(&["Built-in Output"]);
        let err = select_device(&list, "nonexistent", DeviceKind::Input).unwrap_err();
        assert_eq!(err.to_string(), "Device not found: no input device matching 'nonexistent'");
    }
}
