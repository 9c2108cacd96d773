//! CLI argument definitions for the `fgf` binary.
//!
//! Uses clap derive macros. Global flags control output shape and
//! logging; subcommands pick a demo workflow, a benchmark, or shell
//! completion generation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Run and inspect Forgeflow workflows.
#[derive(Parser)]
#[command(name = "fgf", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Path to a TOML engine config file.
    #[arg(long, global = true, env = "FORGEFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one of the built-in demo workflows.
    Run {
        /// Demo workflow to run.
        #[arg(value_enum)]
        demo: DemoKind,

        /// Numeric input fed to the first operation.
        #[arg(short, long, default_value_t = 3)]
        input: i64,
    },

    /// Measure end-to-end workflow throughput.
    Bench {
        /// Number of workflow executions.
        #[arg(short = 'n', long, default_value_t = 1000)]
        iterations: u32,

        /// Operations per workflow.
        #[arg(long, default_value_t = 5)]
        operations: usize,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// The built-in demo workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoKind {
    /// Three arithmetic operations in sequence.
    Pipeline,
    /// Booking saga whose final step fails and compensates.
    Saga,
    /// Flaky operation wrapped in exponential-backoff retry.
    Retry,
    /// Bounded-concurrency iteration over a batch of items.
    Parallel,
    /// Continue-on-error run that aggregates failures.
    Tolerant,
    /// Predicate-routed branch between two operations.
    Branch,
}
