//! `dilute config` command - inspect the layered configuration

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::Path;

use crate::cli::GlobalOpts;
use crate::core::config::{ConfigSources, LOCAL_CONFIG_FILE};
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration values and where they came from
    Show,

    /// Show paths to configuration files
    Path,
}

/// Valid configuration keys
const VALID_KEYS: &[(&str, &str)] = &[
    ("default_format", "Default output format (auto, yaml, json, tsv, md)"),
    ("candidate_samples", "Candidate concentrations per curve search step"),
    ("picklist_sample_ids", "Add the Sample ID column to picklists"),
];

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show => run_show(global),
        ConfigCommands::Path => run_path(),
    }
}

fn config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "default_format" => config.default_format.clone(),
        "candidate_samples" => config.candidate_samples.map(|n| n.to_string()),
        "picklist_sample_ids" => config.picklist_sample_ids.map(|b| b.to_string()),
        _ => None,
    }
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let (config, sources) = Config::load_with_sources();

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    for (key, description) in VALID_KEYS {
        match config_value(&config, key) {
            Some(v) => println!("  {}: {}", style(key).cyan(), style(v).yellow()),
            None => println!("  {}: {}", style(key).cyan(), style("(not set)").dim()),
        }
        if global.verbose {
            println!("      {}", style(description).dim());
        }
    }

    println!();
    print_sources(&sources);
    Ok(())
}

fn print_sources(sources: &ConfigSources) {
    println!("{}", style("Config Sources (lowest priority first):").dim());
    let layer = |path: &Option<std::path::PathBuf>| match path {
        Some(p) => p.display().to_string(),
        None => "(none)".to_string(),
    };
    println!("  1. Global config: {}", layer(&sources.global));
    println!("  2. Local config:  {}", layer(&sources.local));
    if sources.env.is_empty() {
        println!("  3. Environment:   (none)");
    } else {
        println!("  3. Environment:   {}", sources.env.join(", "));
    }
}

fn print_path(label: &str, path: &Path) {
    println!("  {} {}", style(label).cyan(), path.display());
    if path.exists() {
        println!("         {}", style("(exists)").green());
    } else {
        println!("         {}", style("(not created)").dim());
    }
}

fn run_path() -> Result<()> {
    let global_path = Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine global config directory"))?;
    let local_path = std::env::current_dir()
        .map(|cwd| cwd.join(LOCAL_CONFIG_FILE))
        .map_err(|e| miette::miette!("Could not read the working directory: {}", e))?;

    println!("{}", style("Configuration file paths:").bold());
    println!();
    print_path("Global:", &global_path);
    println!();
    print_path("Local: ", &local_path);
    Ok(())
}
