//! Forgeflow CLI entry point.
//!
//! Binary name: `fgf`
//!
//! Parses CLI arguments, initializes tracing, loads the engine config,
//! then dispatches to a demo workflow run, the benchmark, or shell
//! completion generation.

mod cli;
mod demos;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use forgeflow_observe::tracing_setup::{self, LogFormat};
use forgeflow_types::config::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions need no engine state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "fgf", &mut std::io::stdout());
        return Ok(());
    }

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else {
        tracing_setup::filter_for_verbosity(cli.verbose)
    };
    tracing_setup::init_tracing_with_filter(format, cli.otel, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run { demo, input } => {
            demos::run_demo(&config, demo, input, cli.json).await?;
        }

        Commands::Bench {
            iterations,
            operations,
        } => {
            demos::bench(&config, iterations, operations).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    tracing_setup::shutdown_tracing();
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}
