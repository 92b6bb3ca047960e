//! Configuration file commands.

use clap::{Args, Subcommand};
use std::path::PathBuf;
use tether_config::paths::CONFIG_FILE_NAME;
use tether_config::{BridgeConfig, default_config_path, ensure_user_config_dir};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        /// Config file (defaults to the user config path)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Parse and validate a configuration file
    Check {
        /// Config file (defaults to the user config path)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Write the default configuration
    Init {
        /// Destination (defaults to the user config path)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show { path } => {
            let path = path.unwrap_or_else(default_config_path);
            let config = BridgeConfig::load_or_default(&path)?;
            if !path.exists() {
                tracing::info!("{} not found, showing defaults", path.display());
            }
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Check { path } => {
            let path = path.unwrap_or_else(default_config_path);
            BridgeConfig::load(&path)?;
            println!("{}: ok", path.display());
        }
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => ensure_user_config_dir()?.join(CONFIG_FILE_NAME),
            };
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            BridgeConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
