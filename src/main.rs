//! Envelope tuner - Main Entry Point
//!
//! Grid-searches regression models for building heating and cooling loads.

use clap::Parser;
use envelope_tuner::cli::{cmd_grid, cmd_info, cmd_tune, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envelope_tuner=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tune { data, backend, args, output } => {
            cmd_tune(&data, backend, &args, output.as_deref())?;
        }
        Commands::Grid { backend, args } => {
            cmd_grid(backend, &args)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
