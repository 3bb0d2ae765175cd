//! Input monitoring command: captured audio is played back with a gain.

use clap::Args;
use duplex_core::{ChannelBuffers, ConsumerBinding, RenderInfo};

use super::common::{self, StreamArgs};

/// Level of the simulated microphone signal.
const SIMULATED_INPUT_LEVEL: f32 = 0.25;

#[derive(Args)]
pub struct MonitorArgs {
    #[command(flatten)]
    stream: StreamArgs,

    /// Gain in dB
    #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
    gain: f32,

    /// Input channels
    #[arg(long, default_value = "1")]
    input_channels: u16,

    /// Output channels
    #[arg(long, default_value = "2")]
    output_channels: u16,

    /// Leave output channels without a matching input silent instead of
    /// copying the first input channel into them
    #[arg(long)]
    no_upmix: bool,
}

/// In-place passthrough. Input channels are scaled where they sit; output
/// channels past the input count get the first channel or stay silent.
fn passthrough(buffers: &mut ChannelBuffers<'_>, info: &RenderInfo, gain: f32, upmix: bool) {
    let inputs = usize::from(info.input_channels);
    let mut channels = buffers.iter_mut();
    let Some(first) = channels.next() else {
        return;
    };
    for sample in first.iter_mut() {
        *sample *= gain;
    }

    for (index, channel) in channels.enumerate() {
        if index + 1 < inputs {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        } else if upmix && inputs > 0 {
            channel.copy_from_slice(first);
        }
    }
}

pub fn run(args: MonitorArgs) -> anyhow::Result<()> {
    let mut settings = args.stream.load_settings()?;
    settings.stream.input_channels = args.input_channels;
    settings.stream.output_channels = args.output_channels;

    let gain = common::db_to_linear(args.gain);
    let upmix = !args.no_upmix;
    let binding =
        ConsumerBinding::function(move |buffers, info| passthrough(buffers, info, gain, upmix));

    let running = common::start(&args.stream, &settings, binding, SIMULATED_INPUT_LEVEL)?;
    common::print_started(
        &format!("Monitoring input with {:+.1} dB gain", args.gain),
        &running.params(),
        args.stream.duration,
    );

    common::wait(args.stream.duration)?;
    let stats = running.finish()?;
    common::print_stats(&stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(input_channels: u16, output_channels: u16) -> RenderInfo {
        RenderInfo {
            sample_rate: 48000.0,
            cycle: 0,
            input_channels,
            output_channels,
        }
    }

    #[test]
    fn mono_input_is_upmixed() {
        let mut samples = vec![0.5, 0.5, 0.5, 0.0, 0.0, 0.0];
        let mut buffers = ChannelBuffers::new(&mut samples, 2, 3);
        passthrough(&mut buffers, &info(1, 2), 2.0, true);
        assert_eq!(samples, vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn no_upmix_leaves_extra_channels_silent() {
        let mut samples = vec![0.5, 0.5, 0.0, 0.0];
        let mut buffers = ChannelBuffers::new(&mut samples, 2, 2);
        passthrough(&mut buffers, &info(1, 2), 1.0, false);
        assert_eq!(samples, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn stereo_input_keeps_its_channels() {
        let mut samples = vec![0.2, 0.2, -0.4, -0.4];
        let mut buffers = ChannelBuffers::new(&mut samples, 2, 2);
        passthrough(&mut buffers, &info(2, 2), 0.5, true);
        assert_eq!(samples, vec![0.1, 0.1, -0.2, -0.2]);
    }
}
