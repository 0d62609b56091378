//! Production - allocating solved curves onto physical plates
//!
//! [`produce`] runs the whole pipeline for one request: resolve curves,
//! instantiate assay-ready plates, build the source graph, pack wells, and
//! lay out plates. Recoverable problems end up in the result's `errors` and
//! `warnings` instead of stopping the run.

pub mod arp;
pub mod graph;
pub mod issue;
pub mod layout;
pub mod model;
pub mod packer;
pub mod plates;

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::info;

use crate::core::numeric::{trim_decimal, VOLUME_EPSILON};
use crate::core::report::Report;
use crate::curve::DilutionCurve;

pub use arp::{ArpPlate, ArpWell};
pub use graph::{Consumer, SampleSource, SourceGraph, SourceId, SourceVolumes, SourceWell, WellId};
pub use issue::AllocationIssue;
pub use model::{
    ArpRequest, Bucket, Labware, NormalizeSolvent, RackPosition, Sample, SampleKind, TemplateWell,
};
pub use plates::{PlateRole, ProductionPlate, ProductionResult, ProductionTransfer, ProductionWell};

/// Largest intermediate well a curve fills
fn intermediate_well_volume(curve: &DilutionCurve) -> f64 {
    curve
        .intermediate_points
        .iter()
        .flatten()
        .map(|p| curve.options.intermediate_well_volume(p.transfer_volume()))
        .fold(0.0, f64::max)
}

/// Curve for every template kind that has a usable one
fn resolve_curves<'a>(bucket: &'a Bucket, report: &mut Report) -> BTreeMap<String, &'a DilutionCurve> {
    let mut curves = BTreeMap::new();
    for kind in bucket.template_kinds() {
        // Unknown kinds are reported with the template wells that use them
        let Some(info) = bucket.kind(kind) else {
            continue;
        };
        let Some(name) = &info.curve else {
            AllocationIssue::MissingCurve {
                kind: kind.to_string(),
            }
            .record(report);
            continue;
        };
        let Some(curve) = bucket.curves.get(name) else {
            AllocationIssue::UnknownCurve {
                kind: kind.to_string(),
                curve: name.clone(),
            }
            .record(report);
            continue;
        };

        let needed = intermediate_well_volume(curve);
        let labware = &bucket.intermediate_labware;
        if needed > labware.well_volume + VOLUME_EPSILON {
            AllocationIssue::IntermediateVolume {
                curve: name.clone(),
                labware: labware.name.clone(),
                volume_ul: trim_decimal(needed * 1e6, 3),
                capacity_ul: trim_decimal(labware.well_volume * 1e6, 3),
            }
            .record(report);
            continue;
        }
        curves.insert(kind.to_string(), curve);
    }
    curves
}

/// Seed sources for every (sample, kind) that reached an assay plate, in
/// request order
fn seed_sources(
    request: &ArpRequest,
    arp_plates: &[ArpPlate],
    curves: &BTreeMap<String, &DilutionCurve>,
    graph: &mut SourceGraph,
    report: &mut Report,
) {
    let placed: HashSet<(&str, &str)> = arp_plates
        .iter()
        .flat_map(|p| &p.wells)
        .map(|w| (w.sample_id.as_str(), w.kind.as_str()))
        .collect();

    for sample in &request.samples {
        for kind in &sample.kinds {
            if !placed.contains(&(sample.id.as_str(), kind.as_str())) {
                continue;
            }
            if let Some(curve) = curves.get(kind) {
                graph.init_curve(&sample.id, curve, report);
            }
        }
    }
}

/// Allocate a request onto stock, intermediate, and assay-ready plates.
///
/// Curves are taken from `bucket.curves`; solve pending `curve_options`
/// first with [`Bucket::solve_missing_curves`].
pub fn produce(request: &ArpRequest) -> ProductionResult {
    let mut report = Report::new();
    let bucket = &request.bucket;

    let curves = resolve_curves(bucket, &mut report);
    let arp_plates = arp::instantiate(request, &curves, &mut report);

    let mut graph = SourceGraph::new(SourceVolumes::from_bucket(bucket), bucket.solvent.clone());
    seed_sources(request, &arp_plates, &curves, &mut graph, &mut report);
    for plate in &arp_plates {
        for (index, well) in plate.wells.iter().enumerate() {
            let Some(curve) = curves.get(&well.kind) else {
                continue;
            };
            graph.use_arp_point(
                &well.sample_id,
                curve,
                Consumer::Arp {
                    plate: plate.index,
                    well: index,
                },
                &well.transfers,
                well.solvent_volume,
                &mut report,
            );
        }
    }

    packer::pack_all(&mut graph, &mut report);

    let racks: HashMap<&str, &RackPosition> = request
        .samples
        .iter()
        .filter_map(|s| s.rack.as_ref().map(|r| (s.id.as_str(), r)))
        .collect();
    let plates = plates::assemble(&mut graph, &arp_plates, bucket, &racks, &mut report);

    let (errors, warnings) = report.into_parts();
    info!(
        plates = plates.len(),
        assay_plates = arp_plates.len(),
        source_wells = graph.wells().count(),
        errors = errors.len(),
        warnings = warnings.len(),
        "production assembled"
    );

    ProductionResult {
        errors,
        warnings,
        plates,
        created: Utc::now(),
    }
}
