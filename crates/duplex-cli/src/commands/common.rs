//! Shared CLI helpers used by the streaming commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use duplex_core::stub::{StubClock, StubSession};
use duplex_core::{AudioIoManager, AudioSession, ConsumerBinding, NegotiatedParams, StatsSnapshot};
use duplex_io::{CpalSession, Settings, paths};

/// Stream options shared by `tone` and `monitor`. Flags override the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Preferred sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Frames per render cycle
    #[arg(long)]
    pub buffer_size: Option<u32>,

    /// Input device name, partial name or index
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device name, partial name or index
    #[arg(long)]
    pub output_device: Option<String>,

    /// Prefer the speaker route
    #[arg(long)]
    pub route_to_speaker: bool,

    /// Mix with other applications' audio
    #[arg(long)]
    pub mix: bool,

    /// Run on simulated hardware instead of a sound card
    #[arg(long)]
    pub simulate: bool,

    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(short, long)]
    pub duration: Option<f64>,
}

impl StreamArgs {
    /// Load the settings file and apply command-line overrides.
    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let path = self.config.clone().unwrap_or_else(paths::settings_path);
        let mut settings = Settings::load_or_default(&path)?;

        if let Some(rate) = self.sample_rate {
            settings.stream.preferred_sample_rate = rate;
        }
        if let Some(frames) = self.buffer_size {
            settings.stream.buffer_frame_count = frames;
        }
        if self.input_device.is_some() {
            settings.devices.input.clone_from(&self.input_device);
        }
        if self.output_device.is_some() {
            settings.devices.output.clone_from(&self.output_device);
        }
        settings.stream.route_to_speaker |= self.route_to_speaker;
        settings.stream.mix_with_others |= self.mix;
        Ok(settings)
    }
}

/// A started manager and, on simulated hardware, the clock driving it.
pub struct Running {
    // Dropped first so the clock stops before the manager
    clock: Option<StubClock>,
    manager: AudioIoManager,
    params: NegotiatedParams,
}

impl Running {
    /// Negotiated stream parameters.
    pub fn params(&self) -> NegotiatedParams {
        self.params
    }

    /// Stop and tear down, returning the render counters.
    pub fn finish(mut self) -> anyhow::Result<StatsSnapshot> {
        self.clock.take();
        self.manager.stop()?;
        self.manager.teardown()?;
        Ok(self.manager.stats())
    }
}

/// Open the session, negotiate and start rendering through `binding`.
pub fn start(
    args: &StreamArgs,
    settings: &Settings,
    binding: ConsumerBinding,
    input_level: f32,
) -> anyhow::Result<Running> {
    let (session, stub): (Box<dyn AudioSession>, _) = if args.simulate {
        let (session, handle) = StubSession::new();
        handle.set_input_level(input_level);
        (Box::new(session), Some(handle))
    } else {
        let session = CpalSession::new()
            .with_input_device(settings.devices.input.clone())
            .with_output_device(settings.devices.output.clone())
            .with_route_poll_interval(settings.route_poll_interval());
        (Box::new(session), None)
    };

    let manager = AudioIoManager::with_binding(session, binding)?;
    manager.set_error_callback(|err| tracing::error!(error = %err, "audio error"));
    manager.set_route_changed_callback(|change| {
        tracing::info!(reason = %change.reason, route = %change.description, "route changed");
    });
    manager.set_stream_config(settings.stream.clone())?;

    let params = manager.setup()?;
    manager.start()?;
    let clock = stub.map(|handle| handle.spawn_clock()).transpose()?;

    Ok(Running {
        clock,
        manager,
        params,
    })
}

/// Block until Ctrl+C or until `duration` seconds have passed.
pub fn wait(duration: Option<f64>) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let deadline = duration
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| Instant::now() + Duration::from_secs_f64(d));

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// Print the negotiated parameters and the run hint.
pub fn print_started(what: &str, params: &NegotiatedParams, duration: Option<f64>) {
    println!("{what}");
    println!("  Negotiated: {params}");
    println!(
        "  Latency: {:.1} ms",
        params.buffer_period().as_secs_f64() * 1000.0
    );
    match duration {
        Some(seconds) => println!("\nRunning for {seconds} s...\n"),
        None => println!("\nPress Ctrl+C to stop...\n"),
    }
}

/// Print render counters after a run.
pub fn print_stats(stats: &StatsSnapshot) {
    println!(
        "Done: {} cycles, {} silent, {} overruns",
        stats.cycles, stats.silent_cycles, stats.overruns
    );
}

/// Convert decibels to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}
