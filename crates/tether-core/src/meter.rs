//! Display ballistics for peak readings.
//!
//! [`LevelMeter`] turns the raw per-tick readings from a
//! [`PeakReader`](crate::PeakReader) into a meter that jumps up instantly
//! and falls back smoothly. It runs entirely on the UI thread.

/// Per-sample release factor of the level meter.
pub const SAMPLE_DECAY: f32 = 0.99992;

/// Levels below this snap to silence.
pub const SILENCE_FLOOR: f32 = 0.001;

/// Levels at or below this draw as an empty meter.
pub const DISPLAY_FLOOR: f32 = 0.002;

/// Peak-hold meter with exponential release.
///
/// # Example
///
/// ```rust
/// use tether_core::LevelMeter;
///
/// let mut meter = LevelMeter::for_rate(1, 48000.0, 60.0);
/// meter.update(&[0.8]);
/// assert_eq!(meter.level(0), 0.8);
///
/// meter.update(&[0.0]);
/// assert!(meter.level(0) < 0.8);
/// ```
#[derive(Debug, Clone)]
pub struct LevelMeter {
    levels: Vec<f32>,
    decay: f32,
}

impl LevelMeter {
    /// Create a meter that multiplies the level by `decay` on every silent tick.
    pub fn new(channels: usize, decay: f32) -> Self {
        Self {
            levels: vec![0.0; channels],
            decay: decay.clamp(0.0, 1.0),
        }
    }

    /// Create a meter whose release matches [`SAMPLE_DECAY`] applied once per
    /// sample, for a reader polled `refresh_hz` times per second.
    pub fn for_rate(channels: usize, sample_rate: f32, refresh_hz: f32) -> Self {
        Self::new(channels, tick_decay(SAMPLE_DECAY, sample_rate, refresh_hz))
    }

    /// Feed one tick of peak readings.
    ///
    /// A non-finite reading resets that channel to zero. Extra readings are
    /// ignored, missing ones count as silence.
    pub fn update(&mut self, peaks: &[f32]) {
        for (ch, level) in self.levels.iter_mut().enumerate() {
            let peak = peaks.get(ch).copied().unwrap_or(0.0);
            *level = if !peak.is_finite() {
                0.0
            } else if peak > *level {
                peak
            } else if *level > SILENCE_FLOOR {
                (*level * self.decay).max(peak)
            } else {
                0.0
            };
        }
    }

    /// Current linear level of `channel` (0 for unknown channels).
    pub fn level(&self, channel: usize) -> f32 {
        self.levels.get(channel).copied().unwrap_or(0.0)
    }

    /// Level of `channel` mapped through the meter's cube-root display curve,
    /// in `0.0..=1.0` for inputs up to full scale.
    pub fn display_level(&self, channel: usize) -> f32 {
        display_curve(self.level(channel))
    }

    /// Number of lit segments out of `total` for `channel`.
    pub fn segments(&self, channel: usize, total: u32) -> u32 {
        (self.display_level(channel) * total as f32).round() as u32
    }

    /// All channel levels.
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.levels.len()
    }

    /// Change the channel count, zeroing any new channels.
    pub fn set_num_channels(&mut self, channels: usize) {
        self.levels.resize(channels, 0.0);
    }

    /// Drop all channels to silence.
    pub fn reset(&mut self) {
        self.levels.fill(0.0);
    }
}

/// Cube-root display curve with a hard floor at [`DISPLAY_FLOOR`].
#[inline]
pub fn display_curve(level: f32) -> f32 {
    if level > DISPLAY_FLOOR {
        level.cbrt()
    } else {
        0.0
    }
}

/// Collapse a per-sample decay into one factor per UI tick.
pub fn tick_decay(per_sample: f32, sample_rate: f32, refresh_hz: f32) -> f32 {
    if sample_rate <= 0.0 || refresh_hz <= 0.0 {
        return per_sample;
    }
    per_sample.powf(sample_rate / refresh_hz)
}
