//! Settings file command.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use duplex_io::{Settings, paths};

#[derive(Args)]
pub struct ConfigArgs {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the settings file path
    Path,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective settings
    Show,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let path = args.config.unwrap_or_else(paths::settings_path);

    match args.command {
        ConfigCommand::Path => println!("{}", path.display()),

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "'{}' already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            Settings::default().save(&path)?;
            println!("Wrote default settings to {}", path.display());
        }

        ConfigCommand::Show => {
            let settings = Settings::load_or_default(&path)?;
            print!("{}", settings.to_toml()?);
        }
    }

    Ok(())
}
