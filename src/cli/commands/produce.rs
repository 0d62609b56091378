//! `dilute produce` command - allocate an ARP request and write picklists

use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::debug;

use crate::cli::helpers::{format_volume, report_written, resolve_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::document::{self, Encoding};
use crate::core::Config;
use crate::export::{write_picklist, write_platemap, ExportError};
use crate::production::{produce, ArpRequest, ProductionPlate, ProductionResult};

#[derive(clap::Args, Debug)]
pub struct ProduceArgs {
    /// ARP request document (YAML or JSON)
    pub request: PathBuf,

    /// Write the platemap CSV here
    #[arg(long)]
    pub platemap: Option<PathBuf>,

    /// Write the picklist CSV here
    #[arg(long)]
    pub picklist: Option<PathBuf>,

    /// Save the production document here
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ProduceArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let mut request: ArpRequest = document::load(&args.request)?;

    let solved = request.bucket.solve_missing_curves()?;
    if !solved.is_empty() {
        debug!(curves = ?solved, "solved bucket curves");
    }

    let result = produce(&request);

    match resolve_format(global, &config) {
        OutputFormat::Yaml => print!("{}", document::to_string(&result, Encoding::Yaml)?),
        OutputFormat::Json => println!("{}", document::to_string(&result, Encoding::Json)?),
        OutputFormat::Tsv => print!("{}", plate_tsv(&result)),
        OutputFormat::Md | OutputFormat::Auto => {
            println!("{}", plate_table(&result));
            if !global.quiet {
                print_issues(&result);
            }
        }
    }

    if let Some(path) = &args.platemap {
        write_csv(path, |file| write_platemap(&result, file))?;
        report_written("Platemap", path, global);
    }
    if let Some(path) = &args.picklist {
        let with_ids = config.picklist_sample_ids();
        write_csv(path, |file| write_picklist(&result, file, with_ids))?;
        report_written("Picklist", path, global);
    }
    if let Some(path) = &args.output {
        document::save(&result, path)?;
        report_written("Production", path, global);
    }

    Ok(())
}

fn write_csv<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(BufWriter<File>) -> Result<(), ExportError>,
{
    let file = File::create(path).into_diagnostic()?;
    write(BufWriter::new(file))?;
    Ok(())
}

fn print_issues(result: &ProductionResult) {
    if result.errors.is_empty() && result.warnings.is_empty() {
        println!();
        println!(
            "{} {} plate(s), {} transfer(s)",
            style("✓").green(),
            result.plates.len(),
            result.transfer_count()
        );
        return;
    }

    println!();
    for error in &result.errors {
        println!("{} {}", style("✗").red(), style(error).red());
    }
    for warning in &result.warnings {
        println!("{} {}", style("!").yellow(), style(warning).yellow());
    }
}

/// Total liquid held by a plate
fn plate_volume(plate: &ProductionPlate) -> f64 {
    plate.wells.iter().map(|w| w.volume).sum()
}

/// Markdown summary with one row per plate
pub fn plate_table(result: &ProductionResult) -> String {
    let mut plates: Vec<_> = result.plates.iter().collect();
    plates.sort_by_key(|p| p.index);

    let mut builder = Builder::default();
    builder.push_record(["#", "Plate", "Role", "Labware", "Wells", "Volume"]);
    for plate in plates {
        builder.push_record([
            plate.index.to_string(),
            plate.label.clone(),
            plate.role.to_string(),
            plate.labware.name.clone(),
            format!("{}/{}", plate.wells.len(), plate.labware.capacity()),
            format_volume(plate_volume(plate)),
        ]);
    }
    builder.build().with(Style::markdown()).to_string()
}

fn plate_tsv(result: &ProductionResult) -> String {
    let mut plates: Vec<_> = result.plates.iter().collect();
    plates.sort_by_key(|p| p.index);

    let mut out = String::from("index\tlabel\trole\tlabware\twells\tvolume_l\n");
    for plate in plates {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{:e}\n",
            plate.index,
            plate.label,
            plate.role,
            plate.labware.name,
            plate.wells.len(),
            plate_volume(plate)
        ));
    }
    out
}
