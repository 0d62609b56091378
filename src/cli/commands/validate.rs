//! `dilute validate` command - check document envelopes and contents

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::core::document::{self, Document, Encoding};
use crate::curve::{DilutionCurve, DilutionCurveOptions};
use crate::production::{ArpRequest, ProductionResult};

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Documents to validate (YAML or JSON)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Validation statistics
#[derive(Default)]
struct ValidationStats {
    files_checked: usize,
    files_passed: usize,
    files_failed: usize,
    total_warnings: usize,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let mut stats = ValidationStats::default();

    for path in &args.paths {
        stats.files_checked += 1;
        match check_file(path) {
            Ok((kind, warnings)) if warnings.is_empty() => {
                stats.files_passed += 1;
                println!(
                    "{} {} ({})",
                    style("✓").green(),
                    path.display(),
                    style(kind).dim()
                );
            }
            Ok((kind, warnings)) => {
                stats.files_passed += 1;
                stats.total_warnings += warnings.len();
                println!(
                    "{} {} ({}) - {} warning(s)",
                    style("!").yellow(),
                    path.display(),
                    style(kind).dim(),
                    warnings.len()
                );
                for warning in &warnings {
                    println!("    {}", style(warning).yellow());
                }
            }
            Err(report) => {
                stats.files_failed += 1;
                println!("{} {}", style("✗").red(), path.display());
                println!("{:?}", report);
            }
        }
    }

    println!();
    println!(
        "  Files checked: {}  passed: {}  failed: {}",
        style(stats.files_checked).cyan(),
        style(stats.files_passed).green(),
        style(stats.files_failed).red()
    );
    if stats.total_warnings > 0 {
        println!("  Warnings: {}", style(stats.total_warnings).yellow());
    }

    match stats.files_failed {
        0 => Ok(()),
        1 => Err(miette::miette!("Validation failed: 1 file has errors")),
        n => Err(miette::miette!("Validation failed: {} files have errors", n)),
    }
}

/// Check one file; returns its kind and any warnings
fn check_file(path: &Path) -> Result<(String, Vec<String>)> {
    let source = std::fs::read_to_string(path).into_diagnostic()?;
    let encoding = Encoding::from_path(path);
    let name = path.display().to_string();

    let kind = document::peek_kind(&source, encoding, &name)?;
    let warnings = match kind.as_str() {
        DilutionCurveOptions::KIND => {
            let options: DilutionCurveOptions = document::from_str(&source, encoding, &name)?;
            options.validate()?;
            Vec::new()
        }
        DilutionCurve::KIND => {
            let curve: DilutionCurve = document::from_str(&source, encoding, &name)?;
            curve.options.validate()?;
            Vec::new()
        }
        ArpRequest::KIND => {
            let request: ArpRequest = document::from_str(&source, encoding, &name)?;
            check_request(&request)?
        }
        ProductionResult::KIND => {
            let result: ProductionResult = document::from_str(&source, encoding, &name)?;
            result
                .errors
                .iter()
                .map(|e| format!("recorded allocation error: {e}"))
                .collect()
        }
        other => {
            return Err(miette::miette!(
                help = "Known kinds: curve-options, curve, arp-request, production",
                "Unknown document kind '{}'",
                other
            ))
        }
    };
    Ok((kind, warnings))
}

/// Structural checks a request must pass before production
fn check_request(request: &ArpRequest) -> Result<Vec<String>> {
    let bucket = &request.bucket;
    let mut warnings = Vec::new();

    for options in bucket.curve_options.values() {
        options.validate()?;
    }

    for kind in &bucket.kinds {
        let Some(curve) = &kind.curve else {
            warnings.push(format!("kind '{}' names no curve", kind.name));
            continue;
        };
        if !bucket.curves.contains_key(curve) && !bucket.curve_options.contains_key(curve) {
            return Err(miette::miette!(
                "Kind '{}' refers to curve '{}', which the bucket does not define",
                kind.name,
                curve
            ));
        }
    }

    for kind in bucket.template_kinds() {
        if bucket.kind(kind).is_none() {
            return Err(miette::miette!(
                "Template uses kind '{}', which the bucket does not define",
                kind
            ));
        }
    }

    for sample in &request.samples {
        for kind in &sample.kinds {
            if bucket.kind(kind).is_none() {
                warnings.push(format!("sample '{}' asks for unknown kind '{}'", sample.id, kind));
            }
        }
    }

    if request.copies == 0 {
        warnings.push("copies is 0; one copy of each assay plate will be made".to_string());
    }
    Ok(warnings)
}
