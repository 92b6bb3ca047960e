//! Configuration for the tether audio/UI bridge.
//!
//! A bridge is configured from a small TOML file that fixes the stream format
//! the producer runs at, the metering window and ballistics, and how often the
//! UI drains events.
//!
//! # Features
//!
//! - **Config file**: Load, validate, and save [`BridgeConfig`] as TOML
//! - **Conversion**: [`BridgeConfig::meter_settings`] feeds
//!   [`tether_core::peak_ring_buffer`] directly
//! - **Paths**: Platform-specific config directory via `dirs`
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_config::{BridgeConfig, paths};
//!
//! let config = BridgeConfig::load_or_default(paths::default_config_path()).unwrap();
//! let (_writer, _reader) = tether_core::peak_ring_buffer(config.meter_settings());
//!
//! // Write the defaults out for editing
//! BridgeConfig::default().save("tether.toml").unwrap();
//! ```

mod bridge;
mod error;

/// Platform-specific paths for configuration.
pub mod paths;

pub use bridge::{AudioConfig, BridgeConfig, EventsConfig, MeterConfig};
pub use error::ConfigError;
pub use paths::{default_config_path, ensure_user_config_dir, user_config_dir};
