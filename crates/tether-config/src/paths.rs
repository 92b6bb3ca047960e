//! Platform-specific configuration paths.
//!
//! - **User config**: `~/.config/tether/` (Linux),
//!   `~/Library/Application Support/tether/` (macOS), `%APPDATA%\tether\` (Windows)
//! - **Default file**: `tether.toml` inside the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_config::paths;
//!
//! let path = paths::default_config_path();
//! println!("Config: {:?}", path);
//! ```

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "tether";

/// File name of the bridge configuration.
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Returns the user-specific configuration directory.
///
/// # Platform Paths
///
/// - Linux: `~/.config/tether/`
/// - macOS: `~/Library/Application Support/tether/`
/// - Windows: `%APPDATA%\tether\`
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path `tether` reads when no `--config` is given.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Create `dir` and its parents if missing.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), crate::ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| crate::ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}
