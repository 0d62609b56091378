//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    completions::CompletionsArgs, config::ConfigCommands, curve::CurveCommands,
    produce::ProduceArgs, validate::ValidateArgs,
};

#[derive(Parser)]
#[command(name = "dilute")]
#[command(author, version, about = "Serial dilution planner")]
#[command(long_about = "Solves droplet-quantized serial dilution curves for acoustic liquid handlers and allocates them onto stock, intermediate, and assay-ready plates.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dilution curve defaults and solving
    #[command(subcommand)]
    Curve(CurveCommands),

    /// Allocate an ARP request onto plates and write picklists
    Produce(ProduceArgs),

    /// Check document envelopes and contents
    Validate(ValidateArgs),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables for terminals
    #[default]
    Auto,
    /// YAML document (full fidelity)
    Yaml,
    /// JSON document (for programming)
    Json,
    /// Tab-separated values (for piping)
    Tsv,
    /// Markdown tables
    Md,
}
