//! Soak command: a simulated audio thread feeding a UI consumer loop.
//!
//! The producer thread plays the audio callback. It renders a sine into the
//! peak ring buffer, pushes one [`DspEvent`] per block, and periodically
//! destroys and recreates one of its [`Voice`]s. The main thread plays the
//! UI. It meters at the configured refresh rate, drains events, and polls
//! weak references to the voices, replacing the ones that went stale.

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tether_config::{BridgeConfig, default_config_path};
use tether_core::{
    EngineObjects, EventConsumer, EventProducer, LevelMeter, OwnerId, PeakReader, PeakWriter,
    WeakRef, event_stack, peak_ring_buffer,
};

/// Event stack capacity per buffer.
const EVENT_CAPACITY: usize = 256;

/// Segments drawn per channel in the progress line.
const METER_SEGMENTS: u32 = 20;

#[derive(Args)]
pub struct SoakArgs {
    /// Config file (defaults to the user config path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to run, in seconds
    #[arg(short, long, default_value = "5")]
    seconds: f64,

    /// Sample rate override
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Block size override
    #[arg(long)]
    block_size: Option<usize>,

    /// Channel count override
    #[arg(long)]
    channels: Option<usize>,

    /// Sine amplitude on the first channel (linear)
    #[arg(long, default_value = "0.5")]
    amplitude: f32,

    /// Sine frequency in Hz
    #[arg(long, default_value = "440")]
    frequency: f32,

    /// Number of realtime voices the UI watches
    #[arg(long, default_value = "8")]
    objects: usize,

    /// Destroy and recreate one voice every N blocks (0 disables)
    #[arg(long, default_value = "16")]
    churn_every: u64,
}

/// Fully resolved soak parameters.
struct SoakOptions {
    config: BridgeConfig,
    duration: Duration,
    amplitude: f32,
    frequency: f32,
    objects: usize,
    churn_every: u64,
}

impl SoakArgs {
    fn into_options(self) -> anyhow::Result<SoakOptions> {
        let mut config = match &self.config {
            Some(path) => {
                let context = || format!("loading {}", path.display());
                BridgeConfig::load(path).with_context(context)?
            }
            None => BridgeConfig::load_or_default(default_config_path())?,
        };

        if let Some(sample_rate) = self.sample_rate {
            config.audio.sample_rate = sample_rate;
        }
        if let Some(block_size) = self.block_size {
            config.audio.block_size = block_size;
        }
        if let Some(channels) = self.channels {
            config.audio.channels = channels;
        }
        config.validate()?;

        if !(self.seconds.is_finite() && self.seconds > 0.0) {
            anyhow::bail!(
                "--seconds must be a positive number, got {}",
                self.seconds
            );
        }
        let nyquist = config.audio.sample_rate as f32 / 2.0;
        if !(self.frequency > 0.0 && self.frequency < nyquist) {
            anyhow::bail!(
                "--frequency must be in (0, {nyquist}), got {}",
                self.frequency
            );
        }
        if !(self.amplitude.is_finite() && self.amplitude >= 0.0) {
            anyhow::bail!("--amplitude must be non-negative, got {}", self.amplitude);
        }

        Ok(SoakOptions {
            config,
            duration: Duration::from_secs_f64(self.seconds),
            amplitude: self.amplitude,
            frequency: self.frequency,
            objects: self.objects,
            churn_every: self.churn_every,
        })
    }
}

pub fn run(args: SoakArgs) -> anyhow::Result<()> {
    let opts = args.into_options()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let audio = &opts.config.audio;
    tracing::info!(
        "Soaking for {:.1}s: {} Hz, {} samples/block, {} channel(s), {} voice(s)",
        opts.duration.as_secs_f64(),
        audio.sample_rate,
        audio.block_size,
        audio.channels,
        opts.objects
    );

    let report = soak(&opts, &running)?;
    report.log();
    Ok(())
}

/// What happened on the audio thread during one block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum DspEventKind {
    #[default]
    Block,
    VoiceDestroyed,
    VoiceCreated,
}

/// Event the audio thread reports to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DspEvent {
    block: u64,
    kind: DspEventKind,
    /// Peak of the first channel in this block.
    peak: f32,
}

/// A realtime-owned object the UI inspects through weak references.
#[derive(Debug)]
struct Voice {
    serial: u64,
    blocks_rendered: u64,
}

impl Voice {
    fn new(serial: u64) -> Self {
        Self {
            serial,
            blocks_rendered: 0,
        }
    }
}

#[derive(Debug, Default)]
struct ProducerStats {
    blocks: u64,
    events_pushed: u64,
    voices_destroyed: u64,
}

/// Totals observed by both sides over one soak run.
#[derive(Debug, Default)]
struct SoakReport {
    blocks: u64,
    events_pushed: u64,
    voices_destroyed: u64,
    ticks: u64,
    drains: u64,
    events_drained: u64,
    voice_events: u64,
    last_event_block: Option<u64>,
    loudest_event: f32,
    weak_reads: u64,
    weak_contended: u64,
    stale_refs: u64,
    refs_replaced: u64,
    newest_voice: u64,
    watched_at_end: usize,
    peaks: Vec<f32>,
    levels: Vec<f32>,
}

impl SoakReport {
    /// Events the UI never saw because the stack overwrote them.
    fn events_overwritten(&self) -> u64 {
        self.events_pushed.saturating_sub(self.events_drained)
    }

    fn log(&self) {
        tracing::info!(
            "Audio: {} blocks, {} events pushed, {} voices destroyed",
            self.blocks,
            self.events_pushed,
            self.voices_destroyed
        );
        tracing::info!(
            "UI: {} ticks, {} drains, {} events drained ({} voice), {} overwritten, loudest block {:.4}",
            self.ticks,
            self.drains,
            self.events_drained,
            self.voice_events,
            self.events_overwritten(),
            self.loudest_event
        );
        tracing::info!(
            "Weak refs: {} reads, {} contended, {} stale, {} replaced, {} watched, newest voice #{}",
            self.weak_reads,
            self.weak_contended,
            self.stale_refs,
            self.refs_replaced,
            self.watched_at_end,
            self.newest_voice
        );
        for (ch, (peak, level)) in self.peaks.iter().zip(&self.levels).enumerate() {
            tracing::info!("Channel {ch}: peak {peak:.4}, meter {level:.4}");
        }
    }
}

/// Audio-thread state. Moved onto the producer thread.
struct Producer {
    writer: PeakWriter,
    events: EventProducer<DspEvent, EVENT_CAPACITY>,
    engine: EngineObjects<Voice>,
    voices: Vec<OwnerId>,
}

impl Producer {
    fn run(mut self, opts: &SoakOptions, running: &AtomicBool) -> ProducerStats {
        let audio = &opts.config.audio;
        let sample_rate = audio.sample_rate as f32;
        let block_size = audio.block_size;
        let block_period =
            Duration::from_secs_f64(block_size as f64 / f64::from(audio.sample_rate));
        let total_blocks =
            (opts.duration.as_secs_f64() / block_period.as_secs_f64()).ceil() as u64;

        let mut buffers = vec![vec![0.0f32; block_size]; audio.channels];
        let gains: Vec<f32> = (0..audio.channels)
            .map(|ch| 1.0 / (ch + 1) as f32)
            .collect();
        let increment = opts.frequency / sample_rate;
        let mut phase = 0.0f32;
        let mut next_serial = self.voices.len() as u64;
        let mut stats = ProducerStats::default();
        let start = Instant::now();

        for block in 0..total_blocks {
            if !running.load(Ordering::Relaxed) {
                break;
            }

            let mut peak = 0.0f32;
            for i in 0..block_size {
                let sample = opts.amplitude * (std::f32::consts::TAU * phase).sin();
                phase = (phase + increment).fract();
                peak = peak.max(sample.abs());
                for (buf, gain) in buffers.iter_mut().zip(&gains) {
                    buf[i] = sample * gain;
                }
            }
            self.writer.write_channels(&buffers);

            for (_, voice) in self.engine.lock().iter_mut() {
                voice.blocks_rendered += 1;
            }

            self.events.push(DspEvent {
                block,
                kind: DspEventKind::Block,
                peak,
            });
            stats.events_pushed += 1;

            if opts.churn_every > 0
                && block > 0
                && block % opts.churn_every == 0
                && !self.voices.is_empty()
            {
                let slot = (block / opts.churn_every) as usize % self.voices.len();
                self.engine.remove(self.voices[slot]);
                self.events.push(DspEvent {
                    block,
                    kind: DspEventKind::VoiceDestroyed,
                    peak,
                });
                self.voices[slot] = self.engine.insert(Voice::new(next_serial));
                next_serial += 1;
                self.events.push(DspEvent {
                    block,
                    kind: DspEventKind::VoiceCreated,
                    peak,
                });
                stats.events_pushed += 2;
                stats.voices_destroyed += 1;
            }

            stats.blocks += 1;

            // Pace to wall-clock time like a device callback would be.
            let due = block_period.mul_f64((block + 1) as f64);
            if let Some(wait) = due.checked_sub(start.elapsed()) {
                std::thread::sleep(wait);
            }
        }

        stats
    }
}

/// UI-thread state.
struct Consumer {
    reader: PeakReader,
    events: EventConsumer<DspEvent, EVENT_CAPACITY>,
    engine: EngineObjects<Voice>,
    watched: Vec<WeakRef<Voice>>,
    target_watched: usize,
    meter: LevelMeter,
    peaks: Vec<f32>,
}

impl Consumer {
    fn tick(&mut self, report: &mut SoakReport) {
        self.reader.get_peak_into(&mut self.peaks);
        self.meter.update(&self.peaks);
        report.ticks += 1;
        self.poll_voices(report);
    }

    fn drain_events(&mut self, report: &mut SoakReport) {
        report.drains += 1;
        for event in self.events.drain() {
            report.events_drained += 1;
            if event.kind != DspEventKind::Block {
                report.voice_events += 1;
            }
            report.last_event_block = report.last_event_block.max(Some(event.block));
            report.loudest_event = report.loudest_event.max(event.peak);
        }
    }

    fn poll_voices(&mut self, report: &mut SoakReport) {
        for weak in &self.watched {
            match weak.try_get() {
                Some(voice) => {
                    report.weak_reads += 1;
                    report.newest_voice = report.newest_voice.max(voice.serial);
                }
                None if weak.is_alive() => report.weak_contended += 1,
                None => {}
            }
        }

        let before = self.watched.len();
        self.watched.retain(WeakRef::is_alive);
        report.stale_refs += (before - self.watched.len()) as u64;

        if self.watched.len() >= self.target_watched {
            return;
        }
        // Busy engine: try again next tick.
        let Some(arena) = self.engine.try_lock() else {
            return;
        };
        let fresh: Vec<OwnerId> = arena
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !self.watched.iter().any(|w| w.owner() == *id))
            .take(self.target_watched - self.watched.len())
            .collect();
        drop(arena);

        report.refs_replaced += fresh.len() as u64;
        for id in fresh {
            tracing::debug!("watching voice {id}");
            self.watched.push(self.engine.weak_ref(id));
        }
    }
}

fn progress_bar(duration: Duration) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(duration.as_millis() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:30.cyan/blue}] {msg}")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn meter_line(meter: &LevelMeter) -> String {
    (0..meter.num_channels())
        .map(|ch| {
            let lit = meter.segments(ch, METER_SEGMENTS).min(METER_SEGMENTS) as usize;
            format!(
                "{}{}",
                "|".repeat(lit),
                ".".repeat(METER_SEGMENTS as usize - lit)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run producer and consumer until the duration elapses or `running` clears.
fn soak(opts: &SoakOptions, running: &AtomicBool) -> anyhow::Result<SoakReport> {
    let audio = &opts.config.audio;
    let channels = audio.channels;

    let (mut writer, reader) = peak_ring_buffer(opts.config.meter_settings());
    writer.reset(audio.sample_rate as f32, audio.block_size, channels);
    let (events_tx, events_rx) = event_stack::<DspEvent, EVENT_CAPACITY>();

    let engine = EngineObjects::with_capacity(opts.objects);
    let voices: Vec<OwnerId> = (0..opts.objects as u64)
        .map(|serial| engine.insert(Voice::new(serial)))
        .collect();

    let mut consumer = Consumer {
        reader,
        events: events_rx,
        engine: engine.clone(),
        watched: voices.iter().map(|&id| engine.weak_ref(id)).collect(),
        target_watched: opts.objects,
        meter: LevelMeter::new(channels, opts.config.meter_tick_decay()),
        peaks: vec![0.0; channels],
    };
    let producer = Producer {
        writer,
        events: events_tx,
        engine,
        voices,
    };

    let pb = progress_bar(opts.duration)?;
    let mut report = SoakReport::default();
    let done = AtomicBool::new(false);

    let stats = std::thread::scope(|s| {
        let done = &done;
        let handle = s.spawn(move || {
            let stats = producer.run(opts, running);
            done.store(true, Ordering::Release);
            stats
        });

        let refresh = opts.config.refresh_interval();
        let drain_every = opts.config.drain_interval();
        let start = Instant::now();
        let mut next_tick = start;
        let mut last_drain = start;

        while !done.load(Ordering::Acquire) {
            consumer.tick(&mut report);
            if last_drain.elapsed() >= drain_every {
                consumer.drain_events(&mut report);
                last_drain = Instant::now();
            }

            pb.set_position(start.elapsed().as_millis() as u64);
            pb.set_message(meter_line(&consumer.meter));

            next_tick += refresh;
            match next_tick.checked_duration_since(Instant::now()) {
                Some(wait) => std::thread::sleep(wait),
                None => next_tick = Instant::now(),
            }
        }

        handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))
    })?;
    pb.finish_and_clear();

    // Everything pushed before `done` is visible now.
    consumer.tick(&mut report);
    consumer.drain_events(&mut report);

    report.blocks = stats.blocks;
    report.events_pushed = stats.events_pushed;
    report.voices_destroyed = stats.voices_destroyed;
    report.watched_at_end = consumer.watched.len();
    report.peaks = consumer.peaks.clone();
    report.levels = consumer.meter.levels().to_vec();
    Ok(report)
}
