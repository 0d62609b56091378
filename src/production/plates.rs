//! Plate assembler - lays packed wells out on physical plates
//!
//! Source wells are grouped by depth, one plate per depth: the stock (nARP)
//! plate at depth 0, then one intermediate plate per dilution level. Solvent
//! wells join the intermediate depth with the fewest wells. Every well lists
//! the transfers that fill it, naming the plate and well each one comes from.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::document::Document;
use crate::core::report::Report;
use crate::production::arp::ArpPlate;
use crate::production::graph::{Consumer, SourceGraph, SourceRole, UseId, WellId};
use crate::production::issue::AllocationIssue;
use crate::production::layout::{column_major, quadrant_order, well_label};
use crate::production::model::{Bucket, Labware, RackPosition};

/// Plate and well name used when a transfer's origin is unknown
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlateRole {
    /// Original stock (nARP)
    Stock,
    /// Intermediate dilutions, possibly hosting solvent
    Intermediate,
    /// Assay-ready plate
    Assay,
}

impl std::fmt::Display for PlateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlateRole::Stock => write!(f, "stock"),
            PlateRole::Intermediate => write!(f, "intermediate"),
            PlateRole::Assay => write!(f, "assay"),
        }
    }
}

/// One liquid transfer into a production well
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTransfer {
    /// Label of the plate the liquid comes from
    pub source_plate: String,

    /// Index of that plate in the result, `None` when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_plate_index: Option<usize>,

    /// Source well label
    pub source_well: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_row: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<usize>,

    pub sample_id: String,

    /// Concentration of the source liquid
    pub concentration: f64,

    pub volume: f64,
}

impl ProductionTransfer {
    /// Whether the origin of this transfer could not be resolved
    pub fn is_unknown(&self) -> bool {
        self.source_plate_index.is_none()
    }
}

/// One physical well of any plate in the protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionWell {
    pub label: String,
    pub row: usize,
    pub column: usize,
    pub sample_id: String,

    /// Template kind for assay wells, source role otherwise
    pub kind: String,

    /// Liquid the well holds once made
    pub volume: f64,

    pub concentration: f64,

    #[serde(default)]
    pub transfers: Vec<ProductionTransfer>,
}

/// One physical plate of the protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlate {
    pub index: usize,
    pub label: String,
    pub role: PlateRole,

    /// Source depth; `None` for assay plates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,

    pub labware: Labware,

    /// Wells in column-major order
    pub wells: Vec<ProductionWell>,
}

impl ProductionPlate {
    pub fn well(&self, label: &str) -> Option<&ProductionWell> {
        self.wells.iter().find(|w| w.label == label)
    }

    /// Whether this plate holds the original stock
    pub fn is_stock(&self) -> bool {
        self.role == PlateRole::Stock
    }
}

/// Outcome of one allocation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionResult {
    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,

    pub plates: Vec<ProductionPlate>,

    pub created: DateTime<Utc>,
}

impl Document for ProductionResult {
    const KIND: &'static str = "production";
}

impl ProductionResult {
    pub fn plate(&self, label: &str) -> Option<&ProductionPlate> {
        self.plates.iter().find(|p| p.label == label)
    }

    pub fn plates_with_role(&self, role: PlateRole) -> impl Iterator<Item = &ProductionPlate> {
        self.plates.iter().filter(move |p| p.role == role)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn transfer_count(&self) -> usize {
        self.plates.iter().flat_map(|p| &p.wells).map(|w| w.transfers.len()).sum()
    }
}

/// Pick the depth that takes the solvent wells.
///
/// The depth of at least 1 with the fewest wells; the shallowest wins ties.
/// Depth 1 when there is no intermediate depth at all.
pub fn choose_solvent_depth(wells_by_depth: &BTreeMap<usize, Vec<WellId>>) -> usize {
    let mut best: Option<(usize, usize)> = None;
    for (&depth, wells) in wells_by_depth.range(1..) {
        let fewer = best.map_or(true, |(_, count)| wells.len() < count);
        if fewer {
            best = Some((depth, wells.len()));
        }
    }
    best.map_or(1, |(depth, _)| depth)
}

fn plate_label(depth: usize) -> String {
    if depth == 0 {
        "NARP".to_string()
    } else {
        format!("INT{depth}")
    }
}

#[derive(Debug, Clone)]
struct Placement {
    plate_index: usize,
    plate_label: String,
    row: usize,
    column: usize,
}

/// Source plate laid out but not yet filled in
struct SourceLayout {
    index: usize,
    label: String,
    depth: usize,
    labware: Labware,
    wells: Vec<(WellId, usize, usize)>,
}

fn transfer_for(
    graph: &SourceGraph,
    placements: &[Option<Placement>],
    draw: UseId,
    fallback_sample: &str,
) -> ProductionTransfer {
    let usage = graph.usage(draw);
    let sample_id = usage
        .source
        .map(|s| graph.source(s).sample_id.clone())
        .unwrap_or_else(|| fallback_sample.to_string());
    let placement = usage.well.and_then(|w| placements[w.0].as_ref());

    match placement {
        Some(p) => ProductionTransfer {
            source_plate: p.plate_label.clone(),
            source_plate_index: Some(p.plate_index),
            source_well: well_label(p.row, p.column),
            source_row: Some(p.row),
            source_column: Some(p.column),
            sample_id,
            concentration: usage.concentration,
            volume: usage.volume,
        },
        None => ProductionTransfer {
            source_plate: UNKNOWN.to_string(),
            source_plate_index: None,
            source_well: UNKNOWN.to_string(),
            source_row: None,
            source_column: None,
            sample_id,
            concentration: usage.concentration,
            volume: usage.volume,
        },
    }
}

/// Order depth-0 wells to mirror the physical stock rack
fn sort_stock_wells(
    graph: &SourceGraph,
    wells: &mut [WellId],
    racks: &HashMap<&str, &RackPosition>,
) {
    wells.sort_by_cached_key(|&w| {
        let sample = &graph.source(graph.well(w).source).sample_id;
        let rack = racks.get(sample.as_str()).map(|r| r.sort_key());
        (
            rack.is_none(),
            rack.unwrap_or((String::new(), 0, 0)),
            sample.clone(),
        )
    });
}

/// Lay out source and assay plates for a packed graph.
///
/// Depths whose wells do not fit on one plate are recorded and left out;
/// transfers drawn from them show up with unknown provenance.
pub fn assemble(
    graph: &mut SourceGraph,
    arp_plates: &[ArpPlate],
    bucket: &Bucket,
    racks: &HashMap<&str, &RackPosition>,
    report: &mut Report,
) -> Vec<ProductionPlate> {
    let mut by_depth: BTreeMap<usize, Vec<WellId>> = BTreeMap::new();
    let mut solvent_wells = Vec::new();
    for (id, well) in graph.wells() {
        let source = graph.source(well.source);
        if source.role == SourceRole::Solvent {
            solvent_wells.push(id);
        } else {
            by_depth.entry(source.depth).or_default().push(id);
        }
    }

    if !solvent_wells.is_empty() {
        let host = choose_solvent_depth(&by_depth);
        debug!(depth = host, wells = solvent_wells.len(), "solvent hosted");
        graph.set_solvent_depth(host);
        by_depth.entry(host).or_default().extend(solvent_wells);
    }
    let graph: &SourceGraph = graph;

    if let Some(stock) = by_depth.get_mut(&0) {
        sort_stock_wells(graph, stock, racks);
    }

    let mut placements: Vec<Option<Placement>> = vec![None; graph.wells().count()];
    let mut layouts = Vec::new();
    for (depth, wells) in by_depth {
        let labware = if depth == 0 {
            bucket.narp_labware.clone()
        } else {
            bucket.intermediate_labware.clone()
        };
        let label = plate_label(depth);
        if wells.len() > labware.capacity() {
            AllocationIssue::PlateOverflow {
                label,
                labware: labware.name.clone(),
                wells: wells.len(),
                capacity: labware.capacity(),
            }
            .record(report);
            continue;
        }

        let positions = if depth == 0 && bucket.quadrants {
            quadrant_order(labware.rows, labware.columns)
        } else {
            column_major(labware.rows, labware.columns)
        };
        let index = layouts.len();
        let mut placed = Vec::with_capacity(wells.len());
        for (well, (row, column)) in wells.into_iter().zip(positions) {
            placements[well.0] = Some(Placement {
                plate_index: index,
                plate_label: label.clone(),
                row,
                column,
            });
            placed.push((well, row, column));
        }
        layouts.push(SourceLayout {
            index,
            label,
            depth,
            labware,
            wells: placed,
        });
    }

    let mut plates = Vec::with_capacity(layouts.len() + arp_plates.len());
    for layout in layouts {
        let mut wells: Vec<ProductionWell> = layout
            .wells
            .iter()
            .map(|&(id, row, column)| {
                let well = graph.well(id);
                let source = graph.source(well.source);
                let volume = match source.role {
                    SourceRole::Intermediate => well.volume,
                    SourceRole::Stock | SourceRole::Solvent => well.used + well.dead_volume,
                };
                ProductionWell {
                    label: well_label(row, column),
                    row,
                    column,
                    sample_id: source.sample_id.clone(),
                    kind: source.role.to_string(),
                    volume,
                    concentration: source.concentration,
                    transfers: well
                        .consumes
                        .iter()
                        .map(|&d| transfer_for(graph, &placements, d, &source.sample_id))
                        .collect(),
                }
            })
            .collect();
        wells.sort_by_key(|w| (w.column, w.row));

        plates.push(ProductionPlate {
            index: layout.index,
            label: layout.label,
            role: if layout.depth == 0 {
                PlateRole::Stock
            } else {
                PlateRole::Intermediate
            },
            depth: Some(layout.depth),
            labware: layout.labware,
            wells,
        });
    }

    let mut arp_draws: HashMap<(usize, usize), Vec<UseId>> = HashMap::new();
    for (id, usage) in graph.uses() {
        if let Consumer::Arp { plate, well } = usage.consumer {
            arp_draws.entry((plate, well)).or_default().push(id);
        }
    }

    let offset = plates.len();
    for arp in arp_plates {
        let wells = arp
            .wells
            .iter()
            .enumerate()
            .map(|(i, well)| ProductionWell {
                label: well.label(),
                row: well.row,
                column: well.column,
                sample_id: well.sample_id.clone(),
                kind: well.kind.clone(),
                volume: well.total_volume(),
                concentration: well.concentration,
                transfers: arp_draws
                    .get(&(arp.index, i))
                    .map(|draws| {
                        draws
                            .iter()
                            .map(|&d| transfer_for(graph, &placements, d, &well.sample_id))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        plates.push(ProductionPlate {
            index: offset + arp.index,
            label: arp.label.clone(),
            role: PlateRole::Assay,
            depth: None,
            labware: bucket.arp_labware.clone(),
            wells,
        });
    }

    plates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solvent_depth_prefers_fewest_wells() {
        let by_depth = BTreeMap::from([
            (0, vec![WellId(0); 2]),
            (1, vec![WellId(1); 5]),
            (2, vec![WellId(2); 3]),
        ]);
        assert_eq!(choose_solvent_depth(&by_depth), 2);
    }

    #[test]
    fn test_solvent_depth_never_stock() {
        let by_depth = BTreeMap::from([(0, vec![WellId(0)])]);
        assert_eq!(choose_solvent_depth(&by_depth), 1);
        assert_eq!(choose_solvent_depth(&BTreeMap::new()), 1);
    }

    #[test]
    fn test_solvent_depth_tie_goes_to_shallowest() {
        let by_depth = BTreeMap::from([(1, vec![WellId(0); 3]), (2, vec![WellId(1); 3])]);
        assert_eq!(choose_solvent_depth(&by_depth), 1);
    }

    #[test]
    fn test_plate_labels() {
        assert_eq!(plate_label(0), "NARP");
        assert_eq!(plate_label(2), "INT2");
    }

    #[test]
    fn test_unknown_transfer_flag() {
        let transfer = ProductionTransfer {
            source_plate: UNKNOWN.to_string(),
            source_plate_index: None,
            source_well: UNKNOWN.to_string(),
            source_row: None,
            source_column: None,
            sample_id: "S1".to_string(),
            concentration: 1e-3,
            volume: 5e-9,
        };
        assert!(transfer.is_unknown());
    }
}
