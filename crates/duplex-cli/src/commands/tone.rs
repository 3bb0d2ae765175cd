//! Sine tone playback command.

use std::f32::consts::TAU;

use clap::Args;
use duplex_core::{ChannelBuffers, ConsumerBinding, RenderInfo};

use super::common::{self, StreamArgs};

#[derive(Args)]
pub struct ToneArgs {
    #[command(flatten)]
    stream: StreamArgs,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "440")]
    frequency: f32,

    /// Output level in dBFS
    #[arg(long, default_value = "-12", allow_negative_numbers = true)]
    level: f32,

    /// Output channels
    #[arg(long, default_value = "2")]
    channels: u16,
}

/// Phase-continuous sine written to every output channel.
struct Sine {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl Sine {
    fn render(&mut self, buffers: &mut ChannelBuffers<'_>, info: &RenderInfo) {
        let step = self.frequency * TAU / info.sample_rate as f32;
        let start = self.phase;
        for channel in buffers.iter_mut() {
            let mut phase = start;
            for sample in channel.iter_mut() {
                *sample = phase.sin() * self.amplitude;
                phase += step;
            }
        }
        self.phase = (start + step * buffers.frame_count() as f32) % TAU;
    }
}

pub fn run(args: ToneArgs) -> anyhow::Result<()> {
    let mut settings = args.stream.load_settings()?;
    settings.stream.input_channels = 0;
    settings.stream.output_channels = args.channels;

    let mut sine = Sine {
        frequency: args.frequency,
        amplitude: common::db_to_linear(args.level).min(1.0),
        phase: 0.0,
    };
    let binding = ConsumerBinding::function(move |buffers, info| sine.render(buffers, info));

    let running = common::start(&args.stream, &settings, binding, 0.0)?;
    common::print_started(
        &format!("Playing {} Hz at {} dBFS", args.frequency, args.level),
        &running.params(),
        args.stream.duration,
    );

    common::wait(args.stream.duration)?;
    let stats = running.finish()?;
    common::print_stats(&stats);
    Ok(())
}
