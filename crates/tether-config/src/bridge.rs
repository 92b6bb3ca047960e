//! Bridge configuration file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use tether_core::{MeterSettings, tick_decay};

use crate::error::ConfigError;
use crate::paths::ensure_dir;

/// Configuration for one audio/UI bridge.
///
/// Every section and key is optional; missing values take their defaults.
/// Unknown keys are rejected so typos surface at load time.
///
/// # TOML Format
///
/// ```toml
/// [audio]
/// sample_rate = 48000
/// block_size = 256
/// channels = 2
///
/// [meter]
/// refresh_hz = 60.0
/// headroom_blocks = 3
/// decay = 0.99992
///
/// [events]
/// drain_interval_ms = 16
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Stream format the producer runs at.
    pub audio: AudioConfig,
    /// Peak metering and display ballistics.
    pub meter: MeterConfig,
    /// Event stack polling.
    pub events: EventsConfig,
}

/// `[audio]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Largest block the audio callback delivers.
    pub block_size: usize,
    /// Channel count.
    pub channels: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 256,
            channels: 2,
        }
    }
}

/// `[meter]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
    /// UI refresh rate in Hz.
    pub refresh_hz: f64,
    /// Ring size in multiples of the larger of window and block.
    pub headroom_blocks: usize,
    /// Per-sample release factor of the level meter.
    pub decay: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60.0,
            headroom_blocks: 3,
            decay: 0.99992,
        }
    }
}

/// `[events]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// How often the UI drains the event stack, in milliseconds.
    pub drain_interval_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 16,
        }
    }
}

impl BridgeConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent)?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        let meter = &self.meter;

        if audio.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate must be greater than 0"));
        }
        if audio.block_size == 0 {
            return Err(ConfigError::invalid("audio.block_size must be greater than 0"));
        }
        if audio.block_size > u32::MAX as usize {
            return Err(ConfigError::invalid(format!(
                "audio.block_size {} is too large",
                audio.block_size
            )));
        }
        if audio.channels == 0 {
            return Err(ConfigError::invalid("audio.channels must be greater than 0"));
        }

        if !(meter.refresh_hz > 0.0 && meter.refresh_hz <= f64::from(audio.sample_rate)) {
            return Err(ConfigError::invalid(format!(
                "meter.refresh_hz {} must be in (0, {}]",
                meter.refresh_hz, audio.sample_rate
            )));
        }
        if meter.headroom_blocks < 2 {
            return Err(ConfigError::invalid(format!(
                "meter.headroom_blocks {} must be at least 2",
                meter.headroom_blocks
            )));
        }
        if !(meter.decay > 0.0 && meter.decay < 1.0) {
            return Err(ConfigError::invalid(format!(
                "meter.decay {} must be in (0, 1)",
                meter.decay
            )));
        }

        if self.events.drain_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "events.drain_interval_ms must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Settings for [`tether_core::peak_ring_buffer`].
    pub fn meter_settings(&self) -> MeterSettings {
        MeterSettings {
            refresh_hz: self.meter.refresh_hz as f32,
            headroom_blocks: self.meter.headroom_blocks,
            default_channels: self.audio.channels,
        }
    }

    /// Level meter release factor per UI tick.
    pub fn meter_tick_decay(&self) -> f32 {
        tick_decay(
            self.meter.decay as f32,
            self.audio.sample_rate as f32,
            self.meter.refresh_hz as f32,
        )
    }

    /// UI refresh period.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.meter.refresh_hz)
    }

    /// Event drain period.
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.events.drain_interval_ms)
    }
}
