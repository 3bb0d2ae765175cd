//! Audio device listing command.

use clap::{Args, Subcommand};
use duplex_io::{AudioDevice, default_device, list_devices};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all available audio devices
    List,

    /// Show default device information
    Info,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let devices = list_devices()?;

            if devices.is_empty() {
                println!("No audio devices found.");
                return Ok(());
            }

            println!("Available Audio Devices");
            println!("=======================\n");

            let inputs: Vec<_> = devices.iter().filter(|d| d.is_input).collect();
            if !inputs.is_empty() {
                println!("Input Devices:");
                for (idx, device) in inputs.iter().enumerate() {
                    println!(
                        "  [{}] {} ({} Hz, up to {} ch)",
                        idx, device.name, device.default_sample_rate, device.max_input_channels
                    );
                }
                println!();
            }

            let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
            if !outputs.is_empty() {
                println!("Output Devices:");
                for (idx, device) in outputs.iter().enumerate() {
                    println!(
                        "  [{}] {} ({} Hz, up to {} ch)",
                        idx, device.name, device.default_sample_rate, device.max_output_channels
                    );
                }
                println!();
            }

            println!(
                "Total: {} input(s), {} output(s)",
                inputs.len(),
                outputs.len()
            );
            println!();
            println!("Tip: Use device index or partial name with --input-device/--output-device:");
            println!("  duplex monitor --input-device 0 --output-device \"USB\"");
        }

        DevicesCommand::Info => {
            let (input, output) = default_device()?;

            println!("Default Audio Devices");
            println!("=====================\n");
            print_default("Input", input.as_ref(), |d| d.max_input_channels);
            println!();
            print_default("Output", output.as_ref(), |d| d.max_output_channels);
        }
    }

    Ok(())
}

fn print_default(label: &str, device: Option<&AudioDevice>, channels: fn(&AudioDevice) -> u16) {
    match device {
        Some(device) => {
            println!("Default {label}:");
            println!("  Name: {}", device.name);
            println!("  Sample Rate: {} Hz", device.default_sample_rate);
            println!("  Channels: {}", channels(device));
        }
        None => println!("Default {label}: None"),
    }
}
