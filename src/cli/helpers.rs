//! Shared helper functions for CLI commands

use clap::ValueEnum;
use console::style;
use std::path::Path;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::numeric::trim_decimal;
use crate::core::{Config, Encoding};

/// Effective output format: the flag, else the configured default, else auto
pub fn resolve_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    if global.format != OutputFormat::Auto {
        return global.format;
    }
    config
        .default_format
        .as_deref()
        .and_then(|name| OutputFormat::from_str(name, true).ok())
        .unwrap_or(OutputFormat::Auto)
}

/// Document encoding for printing to stdout
pub fn document_encoding(format: OutputFormat) -> Encoding {
    match format {
        OutputFormat::Json => Encoding::Json,
        _ => Encoding::Yaml,
    }
}

/// Print the "written to" confirmation unless quiet
pub fn report_written(what: &str, path: &Path, global: &GlobalOpts) {
    if !global.quiet {
        println!(
            "{} {} written to {}",
            style("✓").green(),
            what,
            style(path.display()).cyan()
        );
    }
}

/// Format a molar concentration with an SI prefix, e.g. 3.16e-6 -> "3.16 uM"
pub fn format_concentration(molar: f64) -> String {
    format_si(molar, "M")
}

/// Format a volume in liters with an SI prefix, e.g. 2.5e-9 -> "2.5 nL"
pub fn format_volume(liters: f64) -> String {
    format_si(liters, "L")
}

fn format_si(value: f64, unit: &str) -> String {
    const PREFIXES: [(f64, &str); 5] = [(1.0, ""), (1e-3, "m"), (1e-6, "u"), (1e-9, "n"), (1e-12, "p")];
    if value == 0.0 {
        return format!("0 {unit}");
    }
    let magnitude = value.abs();
    let (scale, prefix) = PREFIXES
        .iter()
        .copied()
        .find(|(scale, _)| magnitude >= *scale * (1.0 - 1e-9))
        .unwrap_or(PREFIXES[PREFIXES.len() - 1]);
    format!("{} {}{}", trim_decimal(value / scale, 3), prefix, unit)
}

/// Relative error as a percentage
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}
