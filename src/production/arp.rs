//! Assay-ready plate instantiation
//!
//! Expands the bucket template into concrete plates: which sample lands in
//! which well at which curve point, plus any solvent padding the bucket's
//! normalization policy asks for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::numeric::VOLUME_EPSILON;
use crate::core::report::Report;
use crate::curve::{DilutionCurve, DilutionTransfer};
use crate::production::issue::AllocationIssue;
use crate::production::layout::well_label;
use crate::production::model::{ArpRequest, NormalizeSolvent, Sample, TemplateWell};

/// One filled well of an assay-ready plate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArpWell {
    pub row: usize,
    pub column: usize,
    pub kind: String,
    pub sample_id: String,
    pub point_index: usize,

    /// Concentration the curve point achieves
    pub concentration: f64,

    /// Sample transfers, copied from the curve point
    pub transfers: Vec<DilutionTransfer>,

    /// Solvent added to normalize the well; 0 when none
    #[serde(default)]
    pub solvent_volume: f64,
}

impl ArpWell {
    pub fn label(&self) -> String {
        well_label(self.row, self.column)
    }

    /// Volume of sample moved into the well
    pub fn sample_volume(&self) -> f64 {
        self.transfers.iter().map(|t| t.volume).sum()
    }

    /// Sample plus solvent
    pub fn total_volume(&self) -> f64 {
        self.sample_volume() + self.solvent_volume
    }
}

/// One physical assay-ready plate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArpPlate {
    /// Position among all ARP plates of the request
    pub index: usize,
    pub label: String,

    /// Which sample layout this plate carries
    pub layout: usize,

    /// Which copy of the layout this is
    pub copy: usize,

    pub wells: Vec<ArpWell>,
}

/// Samples per kind, in request order
type SamplesByKind<'a> = BTreeMap<&'a str, Vec<&'a Sample>>;

fn group_samples<'a>(request: &'a ArpRequest, report: &mut Report) -> SamplesByKind<'a> {
    let template_kinds = request.bucket.template_kinds();
    let mut by_kind: SamplesByKind = BTreeMap::new();

    for sample in &request.samples {
        let mut used = false;
        for kind in &sample.kinds {
            if template_kinds.contains(&kind.as_str()) {
                by_kind.entry(kind.as_str()).or_default().push(sample);
                used = true;
            }
        }
        if !used {
            AllocationIssue::UnusedSample {
                sample: sample.id.clone(),
            }
            .record(report);
        }
    }

    for kind in template_kinds {
        let Some(info) = request.bucket.kind(kind) else {
            continue;
        };
        if !info.control {
            continue;
        }
        match by_kind.get_mut(kind) {
            None => AllocationIssue::MissingControl {
                kind: kind.to_string(),
            }
            .record(report),
            Some(samples) if samples.len() > 1 => {
                AllocationIssue::DuplicateControl {
                    kind: kind.to_string(),
                    count: samples.len(),
                    used: samples[0].id.clone(),
                }
                .record(report);
                samples.truncate(1);
            }
            Some(_) => {}
        }
    }

    by_kind
}

/// Template sample slots per kind (max `sample_index` + 1)
fn slots_per_kind(template: &[TemplateWell]) -> BTreeMap<&str, usize> {
    let mut slots: BTreeMap<&str, usize> = BTreeMap::new();
    for well in template {
        let entry = slots.entry(well.kind.as_str()).or_default();
        *entry = (*entry).max(well.sample_index + 1);
    }
    slots
}

/// Number of distinct plate layouts needed to place every sample
pub fn layout_count(request: &ArpRequest, by_kind: &SamplesByKind<'_>) -> usize {
    let slots = slots_per_kind(&request.bucket.template);
    let mut layouts = 0;
    let mut has_control = false;

    for (kind, samples) in by_kind {
        let control = request.bucket.kind(kind).is_some_and(|k| k.control);
        if control {
            has_control |= !samples.is_empty();
            continue;
        }
        let per_plate = slots.get(kind).copied().unwrap_or(1).max(1);
        layouts = layouts.max(samples.len().div_ceil(per_plate));
    }

    if layouts == 0 && has_control {
        1
    } else {
        layouts
    }
}

/// Template wells that can be placed, recording the ones that cannot
fn usable_template<'a>(
    request: &'a ArpRequest,
    curves: &BTreeMap<String, &DilutionCurve>,
    report: &mut Report,
) -> Vec<&'a TemplateWell> {
    let bucket = &request.bucket;
    let labware = &bucket.arp_labware;

    bucket
        .template
        .iter()
        .filter(|well| {
            let label = well_label(well.row, well.column);
            if well.row >= labware.rows || well.column >= labware.columns {
                AllocationIssue::TemplateOutOfBounds {
                    well: label,
                    labware: labware.name.clone(),
                }
                .record(report);
                return false;
            }
            if bucket.kind(&well.kind).is_none() {
                AllocationIssue::UnknownKind {
                    kind: well.kind.clone(),
                }
                .record(report);
                return false;
            }
            // Kinds without a usable curve were already reported
            let Some(curve) = curves.get(&well.kind) else {
                return false;
            };
            if well.point_index >= curve.points.len() {
                AllocationIssue::PointOutOfRange {
                    well: label,
                    kind: well.kind.clone(),
                    point: well.point_index,
                    points: curve.points.len(),
                }
                .record(report);
                return false;
            }
            true
        })
        .collect()
}

/// Build every ARP plate of the request.
///
/// `curves` maps kind names to the curve resolved for that kind; template
/// wells of kinds missing from it are skipped.
pub fn instantiate(
    request: &ArpRequest,
    curves: &BTreeMap<String, &DilutionCurve>,
    report: &mut Report,
) -> Vec<ArpPlate> {
    let bucket = &request.bucket;
    let by_kind = group_samples(request, report);
    let template = usable_template(request, curves, report);
    let slots = slots_per_kind(&bucket.template);
    let layouts = layout_count(request, &by_kind);
    let copies = request.copies.max(1);

    let mut plates = Vec::with_capacity(layouts * copies);
    for layout in 0..layouts {
        for copy in 0..copies {
            let mut wells = Vec::new();
            for tw in &template {
                let Some(samples) = by_kind.get(tw.kind.as_str()) else {
                    continue;
                };
                let control = bucket.kind(&tw.kind).is_some_and(|k| k.control);
                let sample = if control {
                    samples.first()
                } else {
                    let per_plate = slots.get(tw.kind.as_str()).copied().unwrap_or(1);
                    samples.get(layout * per_plate + tw.sample_index)
                };
                let (Some(sample), Some(curve)) = (sample, curves.get(&tw.kind)) else {
                    continue;
                };
                let point = &curve.points[tw.point_index];

                wells.push(ArpWell {
                    row: tw.row,
                    column: tw.column,
                    kind: tw.kind.clone(),
                    sample_id: sample.id.clone(),
                    point_index: tw.point_index,
                    concentration: point.actual,
                    transfers: point.transfers.clone(),
                    solvent_volume: 0.0,
                });
            }

            normalize_solvent(&mut wells, bucket.normalize_solvent);
            wells.sort_by_key(|w| (w.column, w.row));

            let index = plates.len();
            debug!(plate = index, wells = wells.len(), "ARP plate instantiated");
            plates.push(ArpPlate {
                index,
                label: format!("ARP{}-{}", layout + 1, copy + 1),
                layout,
                copy,
                wells,
            });
        }
    }
    plates
}

fn pad_to(well: &mut ArpWell, volume: f64) {
    let gap = volume - well.sample_volume();
    well.solvent_volume = if gap > VOLUME_EPSILON { gap } else { 0.0 };
}

/// Pad wells with solvent according to `policy`
pub fn normalize_solvent(wells: &mut [ArpWell], policy: NormalizeSolvent) {
    match policy {
        NormalizeSolvent::No => {
            for well in wells.iter_mut() {
                well.solvent_volume = 0.0;
            }
        }
        NormalizeSolvent::Global => {
            let target = wells.iter().map(ArpWell::sample_volume).fold(0.0, f64::max);
            for well in wells.iter_mut() {
                pad_to(well, target);
            }
        }
        NormalizeSolvent::PerKind => {
            let mut targets: BTreeMap<String, f64> = BTreeMap::new();
            for well in wells.iter() {
                let entry = targets.entry(well.kind.clone()).or_insert(0.0);
                *entry = entry.max(well.sample_volume());
            }
            for well in wells.iter_mut() {
                let target = targets.get(&well.kind).copied().unwrap_or(0.0);
                pad_to(well, target);
            }
        }
    }
}
