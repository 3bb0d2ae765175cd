//! duplex CLI - play, monitor and inspect audio through the duplex bridge.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duplex")]
#[command(author, version, about = "Real-time audio I/O bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices(commands::devices::DevicesArgs),

    /// Play a sine tone
    Tone(commands::tone::ToneArgs),

    /// Pass input through to output
    Monitor(commands::monitor::MonitorArgs),

    /// Manage the settings file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Tone(args) => commands::tone::run(args),
        Commands::Monitor(args) => commands::monitor::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
