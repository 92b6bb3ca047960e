//! Tether CLI - soak tester and config tool for the tether audio/UI bridge.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "Tether audio/UI bridge CLI", long_about = None)]
struct Cli {
    /// Log lifecycle events at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated audio thread against a UI consumer and report
    Soak(commands::soak::SoakArgs),

    /// Show, check, or create a configuration file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Soak(args) => commands::soak::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
