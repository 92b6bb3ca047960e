//! Integration tests for tether-config.
//!
//! These tests verify a config file drives the core primitives end to end.

use tether_config::{BridgeConfig, ConfigError};
use tether_core::{LevelMeter, peak_ring_buffer};
use tempfile::TempDir;

/// A config written to disk, reloaded, and used to build a meter pipeline.
#[test]
fn test_config_file_drives_meter_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tether.toml");

    std::fs::write(
        &path,
        r"
[audio]
sample_rate = 44100
block_size = 64
channels = 1

[meter]
refresh_hz = 30.0
headroom_blocks = 4
",
    )
    .unwrap();

    let config = BridgeConfig::load(&path).expect("should load config");
    let (mut writer, mut reader) = peak_ring_buffer(config.meter_settings());

    // Channel count is known before the first reset.
    assert_eq!(reader.get_peak().len(), 1);

    writer.reset(
        config.audio.sample_rate as f32,
        config.audio.block_size,
        config.audio.channels,
    );
    assert_eq!(writer.window_size(), 1470);
    assert_eq!(writer.buffer_size(), 4 * 1470);

    let block = vec![0.25f32; config.audio.block_size];
    for _ in 0..64 {
        writer.write(&[&block]);
    }

    let mut meter = LevelMeter::new(config.audio.channels, config.meter_tick_decay());
    meter.update(&reader.get_peak());
    assert!((meter.level(0) - 0.25).abs() < 1e-6);
}

/// Saving then loading preserves every section.
#[test]
fn test_save_load_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("configs").join("bridge.toml");

    let mut config = BridgeConfig::default();
    config.audio.sample_rate = 96000;
    config.meter.decay = 0.9995;
    config.events.drain_interval_ms = 5;
    config.save(&path).expect("should save config");

    let loaded = BridgeConfig::load(&path).expect("should load config");
    assert_eq!(loaded, config);
}

/// Malformed and out-of-range files are reported with distinct errors.
#[test]
fn test_load_reports_parse_and_range_errors() {
    let temp_dir = TempDir::new().unwrap();

    let malformed = temp_dir.path().join("malformed.toml");
    std::fs::write(&malformed, "[audio\nsample_rate = 48000").unwrap();
    assert!(matches!(
        BridgeConfig::load(&malformed),
        Err(ConfigError::TomlParse(_))
    ));

    let out_of_range = temp_dir.path().join("range.toml");
    std::fs::write(&out_of_range, "[meter]\nheadroom_blocks = 1\n").unwrap();
    assert!(matches!(
        BridgeConfig::load(&out_of_range),
        Err(ConfigError::Invalid(_))
    ));
}
