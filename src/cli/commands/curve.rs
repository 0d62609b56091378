//! `dilute curve` command - curve defaults and solving

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{
    document_encoding, format_concentration, format_percent, format_volume, report_written,
    resolve_format,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::document::{self, Encoding};
use crate::core::Config;
use crate::curve::{solve, DilutionCurve, DilutionCurveOptions, DilutionPoint};

#[derive(Subcommand, Debug)]
pub enum CurveCommands {
    /// Print the default curve options document
    Defaults(DefaultsArgs),

    /// Solve a curve from an options document
    Solve(SolveArgs),
}

#[derive(clap::Args, Debug)]
pub struct DefaultsArgs {
    /// Write the document to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SolveArgs {
    /// Curve options document (YAML or JSON)
    pub file: PathBuf,

    /// Save the solved curve document here
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Candidate concentrations sampled per search step
    #[arg(long)]
    pub candidates: Option<usize>,
}

pub fn run(cmd: CurveCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CurveCommands::Defaults(args) => run_defaults(args, global),
        CurveCommands::Solve(args) => run_solve(args, global),
    }
}

fn run_defaults(args: DefaultsArgs, global: &GlobalOpts) -> Result<()> {
    let options = DilutionCurveOptions::default();
    match args.output {
        Some(path) => {
            document::save(&options, &path)?;
            report_written("Curve options", &path, global);
        }
        None => {
            let format = resolve_format(global, &Config::load());
            print!("{}", document::to_string(&options, document_encoding(format))?);
        }
    }
    Ok(())
}

fn run_solve(args: SolveArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let mut options: DilutionCurveOptions = document::load(&args.file)?;
    if let Some(candidates) = args.candidates.or(config.candidate_samples) {
        options.num_intermediate_sample_points = candidates;
    }

    let curve = solve(&options)?;

    match resolve_format(global, &config) {
        OutputFormat::Yaml => print!("{}", document::to_string(&curve, Encoding::Yaml)?),
        OutputFormat::Json => println!("{}", document::to_string(&curve, Encoding::Json)?),
        OutputFormat::Tsv => print!("{}", curve_tsv(&curve)),
        OutputFormat::Md | OutputFormat::Auto => {
            println!("{}", curve_table(&curve));
            if !global.quiet {
                println!();
                println!(
                    "{} {} assay points from {} intermediate plate(s), worst error {}",
                    style("✓").green(),
                    curve.points.len(),
                    curve.intermediate_depth_count(),
                    style(format_percent(curve.worst_error)).cyan()
                );
            }
        }
    }

    if let Some(path) = args.output {
        document::save(&curve, &path)?;
        report_written("Curve", &path, global);
    }
    Ok(())
}

fn transfers_cell(point: &DilutionPoint) -> String {
    point
        .transfers
        .iter()
        .map(|t| {
            format!(
                "{} of {}",
                format_volume(t.volume),
                format_concentration(t.source_concentration)
            )
        })
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Every row of the curve: stage label, index, and the point
fn curve_rows(curve: &DilutionCurve) -> Vec<(String, usize, &DilutionPoint)> {
    let mut rows = Vec::new();
    for (depth, plate) in curve.intermediate_points.iter().enumerate() {
        for (i, point) in plate.iter().enumerate() {
            rows.push((format!("INT{}", depth + 1), i + 1, point));
        }
    }
    for (i, point) in curve.points.iter().enumerate() {
        rows.push(("assay".to_string(), i + 1, point));
    }
    rows
}

/// Markdown table of intermediate and assay points
pub fn curve_table(curve: &DilutionCurve) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Stage", "#", "Target", "Actual", "Error", "Transfers"]);
    for (stage, index, point) in curve_rows(curve) {
        builder.push_record([
            stage,
            index.to_string(),
            format_concentration(point.target),
            format_concentration(point.actual),
            format_percent(point.error()),
            transfers_cell(point),
        ]);
    }
    builder.build().with(Style::markdown()).to_string()
}

fn curve_tsv(curve: &DilutionCurve) -> String {
    let mut out = String::from("stage\tindex\ttarget_m\tactual_m\terror\ttransfer_l\n");
    for (stage, index, point) in curve_rows(curve) {
        out.push_str(&format!(
            "{}\t{}\t{:e}\t{:e}\t{:.6}\t{:e}\n",
            stage,
            index,
            point.target,
            point.actual,
            point.error(),
            point.transfer_volume()
        ));
    }
    out
}
