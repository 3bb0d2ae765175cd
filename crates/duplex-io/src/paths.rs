//! Platform-specific settings location.
//!
//! - Linux: `~/.config/duplex/duplex.toml`
//! - macOS: `~/Library/Application Support/duplex/duplex.toml`
//! - Windows: `%APPDATA%\duplex\duplex.toml`

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "duplex";

/// Settings file name.
const SETTINGS_FILE: &str = "duplex.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default settings file path.
pub fn settings_path() -> PathBuf {
    user_config_dir().join(SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_live_in_the_config_dir() {
        let path = settings_path();
        assert!(path.ends_with("duplex/duplex.toml"));
        assert_eq!(path.parent(), Some(user_config_dir().as_path()));
    }
}
