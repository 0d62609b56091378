//! Production inputs - buckets, samples, and ARP requests
//!
//! A bucket describes the labware and the assay plate template; a request
//! pairs a bucket with the concrete samples to plate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::core::document::Document;
use crate::curve::{solve, CurveError, DilutionCurve, DilutionCurveOptions};
use crate::production::layout::parse_well_label;

/// Plate geometry and liquid limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labware {
    pub name: String,
    pub rows: usize,
    pub columns: usize,

    /// Maximum volume one well holds
    pub well_volume: f64,

    /// Volume a well keeps that can never be aspirated
    #[serde(default)]
    pub dead_volume: f64,
}

impl Labware {
    /// Number of wells on the plate
    pub fn capacity(&self) -> usize {
        self.rows * self.columns
    }

    /// Usable volume of a full well
    pub fn usable_volume(&self) -> f64 {
        (self.well_volume - self.dead_volume).max(0.0)
    }

    /// 384-well polypropylene source plate
    pub fn source_384pp() -> Self {
        Self {
            name: "384PP".to_string(),
            rows: 16,
            columns: 24,
            well_volume: 65e-6,
            dead_volume: 15e-6,
        }
    }

    /// 384-well low dead volume plate
    pub fn source_384ldv() -> Self {
        Self {
            name: "384LDV".to_string(),
            rows: 16,
            columns: 24,
            well_volume: 12e-6,
            dead_volume: 2.5e-6,
        }
    }

    /// 384-well assay plate
    pub fn assay_384() -> Self {
        Self {
            name: "384 assay".to_string(),
            rows: 16,
            columns: 24,
            well_volume: 100e-6,
            dead_volume: 0.0,
        }
    }
}

/// How wells are padded with solvent so their solvent content matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizeSolvent {
    /// No padding
    #[default]
    No,
    /// Pad to the largest transfer of the same kind on the plate
    PerKind,
    /// Pad to the largest transfer on the plate
    Global,
}

impl std::fmt::Display for NormalizeSolvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeSolvent::No => write!(f, "no"),
            NormalizeSolvent::PerKind => write!(f, "per-kind"),
            NormalizeSolvent::Global => write!(f, "global"),
        }
    }
}

/// A class of sample (compound, positive control, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleKind {
    pub name: String,

    /// Name of the curve in the bucket used for this kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,

    /// Controls take a single sample that appears on every plate
    #[serde(default)]
    pub control: bool,
}

/// One well of the assay plate template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateWell {
    pub row: usize,
    pub column: usize,
    pub kind: String,

    /// Which sample of this kind on the plate (0-based)
    #[serde(default)]
    pub sample_index: usize,

    /// Which curve point goes here (0-based)
    pub point_index: usize,
}

fn default_solvent() -> String {
    "DMSO".to_string()
}

fn default_narp() -> Labware {
    Labware::source_384pp()
}

fn default_intermediate() -> Labware {
    Labware::source_384ldv()
}

fn default_arp() -> Labware {
    Labware::assay_384()
}

/// Labware, curves, and the assay plate template for one screening campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,

    /// Plate holding the original stock
    #[serde(default = "default_narp")]
    pub narp_labware: Labware,

    /// Plate type for intermediate dilutions and solvent
    #[serde(default = "default_intermediate")]
    pub intermediate_labware: Labware,

    /// Assay-ready plate
    #[serde(default = "default_arp")]
    pub arp_labware: Labware,

    #[serde(default)]
    pub kinds: Vec<SampleKind>,

    /// Solved curves by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub curves: BTreeMap<String, DilutionCurve>,

    /// Curves by name still to be solved
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub curve_options: BTreeMap<String, DilutionCurveOptions>,

    #[serde(default)]
    pub template: Vec<TemplateWell>,

    #[serde(default)]
    pub normalize_solvent: NormalizeSolvent,

    /// Interleave depth-0 wells across plate quadrants
    #[serde(default)]
    pub quadrants: bool,

    #[serde(default = "default_solvent")]
    pub solvent: String,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            narp_labware: default_narp(),
            intermediate_labware: default_intermediate(),
            arp_labware: default_arp(),
            kinds: Vec::new(),
            curves: BTreeMap::new(),
            curve_options: BTreeMap::new(),
            template: Vec::new(),
            normalize_solvent: NormalizeSolvent::No,
            quadrants: false,
            solvent: default_solvent(),
        }
    }

    /// Look up a kind by name
    pub fn kind(&self, name: &str) -> Option<&SampleKind> {
        self.kinds.iter().find(|k| k.name == name)
    }

    /// Solve every entry of `curve_options` that has no solved curve yet.
    ///
    /// Returns the names that were solved.
    pub fn solve_missing_curves(&mut self) -> Result<Vec<String>, CurveError> {
        let pending: Vec<(String, DilutionCurveOptions)> = self
            .curve_options
            .iter()
            .filter(|(name, _)| !self.curves.contains_key(*name))
            .map(|(name, options)| (name.clone(), options.clone()))
            .collect();

        let mut solved = Vec::with_capacity(pending.len());
        for (name, options) in pending {
            let curve = solve(&options)?;
            info!(curve = %name, worst_error = curve.worst_error, "bucket curve solved");
            self.curves.insert(name.clone(), curve);
            solved.push(name);
        }
        Ok(solved)
    }

    /// Kinds named by the template, in first-use order
    pub fn template_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for well in &self.template {
            if !kinds.contains(&well.kind.as_str()) {
                kinds.push(&well.kind);
            }
        }
        kinds
    }
}

/// Where a sample's stock sits in the source rack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackPosition {
    /// Rack or plate label
    pub label: String,

    /// Well label such as "B3"
    pub well: String,
}

impl RackPosition {
    /// Sort key mirroring the physical rack: label, then column, then row
    pub fn sort_key(&self) -> (String, usize, usize) {
        let (row, column) = parse_well_label(&self.well).unwrap_or((usize::MAX, usize::MAX));
        (self.label.clone(), column, row)
    }
}

/// A physical sample to be plated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,

    /// Kinds this sample is plated as
    pub kinds: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<RackPosition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Sample {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kinds: vec![kind.into()],
            rack: None,
            comment: None,
        }
    }
}

fn default_copies() -> usize {
    1
}

/// A request to produce assay-ready plates for a list of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArpRequest {
    pub samples: Vec<Sample>,

    /// Identical copies of every assay plate
    #[serde(default = "default_copies")]
    pub copies: usize,

    /// Snapshot of the bucket at request time
    pub bucket: Bucket,
}

impl Document for ArpRequest {
    const KIND: &'static str = "arp-request";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labware_capacity() {
        let labware = Labware::source_384ldv();
        assert_eq!(labware.capacity(), 384);
        assert!((labware.usable_volume() - 9.5e-6).abs() < 1e-15);
    }

    #[test]
    fn test_normalize_solvent_serialization() {
        let yaml = serde_yml::to_string(&NormalizeSolvent::PerKind).unwrap();
        assert!(yaml.contains("per-kind"));
        let parsed: NormalizeSolvent = serde_yml::from_str("global").unwrap();
        assert_eq!(parsed, NormalizeSolvent::Global);
        assert_eq!(NormalizeSolvent::default(), NormalizeSolvent::No);
    }

    #[test]
    fn test_bucket_defaults_from_minimal_yaml() {
        let bucket: Bucket = serde_yml::from_str("name: screen-a\n").unwrap();
        assert_eq!(bucket.solvent, "DMSO");
        assert_eq!(bucket.intermediate_labware.name, "384LDV");
        assert_eq!(bucket.normalize_solvent, NormalizeSolvent::No);
        assert!(bucket.template.is_empty());
    }

    #[test]
    fn test_template_kinds_in_first_use_order() {
        let mut bucket = Bucket::new("b");
        for (kind, point) in [("cmpd", 0), ("pos", 0), ("cmpd", 1)] {
            bucket.template.push(TemplateWell {
                row: 0,
                column: point,
                kind: kind.to_string(),
                sample_index: 0,
                point_index: point,
            });
        }
        assert_eq!(bucket.template_kinds(), vec!["cmpd", "pos"]);
    }

    #[test]
    fn test_rack_sort_key_is_column_major() {
        let a = RackPosition {
            label: "R1".to_string(),
            well: "B1".to_string(),
        };
        let b = RackPosition {
            label: "R1".to_string(),
            well: "A2".to_string(),
        };
        assert!(a.sort_key() < b.sort_key());
    }

    #[test]
    fn test_request_copies_default() {
        let request: ArpRequest = serde_yml::from_str(
            "samples:\n  - id: S1\n    kinds: [cmpd]\nbucket:\n  name: b\n",
        )
        .unwrap();
        assert_eq!(request.copies, 1);
        assert_eq!(request.samples[0].kinds, vec!["cmpd".to_string()]);
    }

    #[test]
    fn test_solve_missing_curves() {
        let mut bucket = Bucket::new("b");
        bucket.curve_options.insert(
            "top".to_string(),
            DilutionCurveOptions {
                point_count: 1,
                max_intermediate_plates: 0,
                ..Default::default()
            },
        );
        let solved = bucket.solve_missing_curves().unwrap();
        assert_eq!(solved, vec!["top".to_string()]);
        assert!(bucket.curves.contains_key("top"));
        assert!(bucket.solve_missing_curves().unwrap().is_empty());
    }
}
