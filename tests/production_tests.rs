//! End-to-end allocation tests through the library API

use std::collections::{BTreeMap, HashMap};

use dilute::curve::{DilutionCurve, DilutionCurveOptions, DilutionPoint, DilutionTransfer};
use dilute::export::picklist_rows;
use dilute::production::{
    produce, ArpRequest, Bucket, Labware, NormalizeSolvent, PlateRole, ProductionResult,
    RackPosition, Sample, SampleKind, TemplateWell,
};

const STOCK: f64 = 10e-3;
const HELPER: f64 = 5e-4;

fn transfer(source_concentration: f64, volume: f64) -> DilutionTransfer {
    DilutionTransfer {
        source_concentration,
        volume,
    }
}

fn point(actual: f64, transfers: Vec<DilutionTransfer>) -> DilutionPoint {
    DilutionPoint {
        target: actual,
        actual,
        transfers,
    }
}

/// Two points: 10 uM straight from stock, 1 uM through one 500 uM helper
fn curve() -> DilutionCurve {
    DilutionCurve {
        options: DilutionCurveOptions::default(),
        source_concentration: STOCK,
        intermediate_points: vec![vec![point(HELPER, vec![transfer(STOCK, 525e-9)])]],
        points: vec![
            point(1e-5, vec![transfer(STOCK, 10e-9)]),
            point(1e-6, vec![transfer(HELPER, 20e-9)]),
        ],
        worst_error: 0.0,
    }
}

fn template(kind: &str, slots: usize, points: usize) -> Vec<TemplateWell> {
    let mut wells = Vec::new();
    for slot in 0..slots {
        for point in 0..points {
            wells.push(TemplateWell {
                row: slot,
                column: point,
                kind: kind.to_string(),
                sample_index: slot,
                point_index: point,
            });
        }
    }
    wells
}

fn bucket() -> Bucket {
    let mut bucket = Bucket::new("screen");
    bucket.kinds.push(SampleKind {
        name: "cmpd".to_string(),
        curve: Some("c".to_string()),
        control: false,
    });
    bucket.curves = BTreeMap::from([("c".to_string(), curve())]);
    bucket.template = template("cmpd", 2, 2);
    bucket
}

fn request(samples: &[&str]) -> ArpRequest {
    ArpRequest {
        samples: samples.iter().map(|id| Sample::new(*id, "cmpd")).collect(),
        copies: 1,
        bucket: bucket(),
    }
}

/// Volume drawn from each (plate, well) by every transfer of the result
fn drawn_by_well(result: &ProductionResult) -> HashMap<(String, String), f64> {
    let mut drawn = HashMap::new();
    for plate in &result.plates {
        for well in &plate.wells {
            for t in &well.transfers {
                *drawn
                    .entry((t.source_plate.clone(), t.source_well.clone()))
                    .or_insert(0.0) += t.volume;
            }
        }
    }
    drawn
}

#[test]
fn test_plates_in_depth_order() {
    let result = produce(&request(&["S1", "S2"]));
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let labels: Vec<(usize, &str, PlateRole)> = result
        .plates
        .iter()
        .map(|p| (p.index, p.label.as_str(), p.role))
        .collect();
    assert_eq!(
        labels,
        vec![
            (0, "NARP", PlateRole::Stock),
            (1, "INT1", PlateRole::Intermediate),
            (2, "ARP1-1", PlateRole::Assay),
        ]
    );
}

#[test]
fn test_transfers_come_from_shallower_plates() {
    let result = produce(&request(&["S1", "S2"]));
    for plate in &result.plates {
        for well in &plate.wells {
            for t in &well.transfers {
                let source = t.source_plate_index.expect("every transfer is placed");
                assert!(source < plate.index, "{} draws from plate {}", plate.label, source);
            }
        }
    }

    let int = result.plate("INT1").unwrap();
    assert_eq!(int.wells.len(), 2);
    assert!(int
        .wells
        .iter()
        .flat_map(|w| &w.transfers)
        .all(|t| t.source_plate == "NARP"));
}

#[test]
fn test_stock_volume_covers_every_draw() {
    let result = produce(&request(&["S1", "S2"]));
    let drawn = drawn_by_well(&result);
    let narp = result.plate("NARP").unwrap();

    for well in &narp.wells {
        let out = drawn[&("NARP".to_string(), well.label.clone())];
        // One 10 nL assay draw plus the 525 nL helper well
        assert!((out - 535e-9).abs() < 1e-15);
        assert!((well.volume - narp.labware.dead_volume - out).abs() < 1e-15);
    }

    let int = result.plate("INT1").unwrap();
    for well in &int.wells {
        let out = drawn[&("INT1".to_string(), well.label.clone())];
        assert!(out <= well.volume - int.labware.dead_volume + 1e-15);
        assert!((well.volume - 10.525e-6).abs() < 1e-15);
    }
}

#[test]
fn test_kinds_sharing_a_curve_share_sources() {
    let mut request = request(&["S1"]);
    request.bucket.kinds.push(SampleKind {
        name: "alt".to_string(),
        curve: Some("c".to_string()),
        control: false,
    });
    for well in template("alt", 1, 2) {
        request.bucket.template.push(TemplateWell {
            row: 4,
            ..well
        });
    }
    request.samples[0].kinds.push("alt".to_string());

    let result = produce(&request);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.plate("NARP").unwrap().wells.len(), 1);
    assert_eq!(result.plate("INT1").unwrap().wells.len(), 1);
    assert_eq!(result.plate("ARP1-1").unwrap().wells.len(), 4);
}

#[test]
fn test_stock_wells_follow_rack_order() {
    let mut request = request(&["S1", "S2"]);
    request.samples[0].rack = Some(RackPosition {
        label: "R1".to_string(),
        well: "B1".to_string(),
    });
    request.samples[1].rack = Some(RackPosition {
        label: "R1".to_string(),
        well: "A1".to_string(),
    });

    let result = produce(&request);
    let narp = result.plate("NARP").unwrap();
    assert_eq!(narp.well("A1").unwrap().sample_id, "S2");
    assert_eq!(narp.well("B1").unwrap().sample_id, "S1");
}

#[test]
fn test_quadrants_interleave_stock_wells() {
    let mut request = request(&["S4", "S2", "S1", "S3"]);
    request.bucket.quadrants = true;

    let result = produce(&request);
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let narp = result.plate("NARP").unwrap();
    assert_eq!(narp.wells.len(), 4);
    assert_eq!(narp.well("A1").unwrap().sample_id, "S1");
    assert_eq!(narp.well("A2").unwrap().sample_id, "S2");
    assert_eq!(narp.well("B1").unwrap().sample_id, "S3");
    assert_eq!(narp.well("B2").unwrap().sample_id, "S4");

    // Intermediate plates keep plain column-major order
    let int = result.plate("INT1").unwrap();
    let labels: Vec<&str> = int.wells.iter().map(|w| w.label.as_str()).collect();
    assert_eq!(labels, vec!["A1", "B1", "C1", "D1"]);
}

#[test]
fn test_oversized_intermediate_rejects_curve() {
    let mut request = request(&["S1"]);
    request.bucket.intermediate_labware = Labware {
        well_volume: 5e-6,
        ..Labware::source_384ldv()
    };

    let result = produce(&request);
    assert!(result.has_errors());
    assert!(result.errors.iter().any(|e| e.contains("'c'")), "{:?}", result.errors);
    assert!(result.plates_with_role(PlateRole::Assay).all(|p| p.wells.is_empty()));
}

#[test]
fn test_dropped_plate_leaves_unknown_provenance() {
    let mut request = request(&["S1", "S2"]);
    request.bucket.narp_labware = Labware {
        rows: 1,
        columns: 1,
        ..Labware::source_384pp()
    };

    let result = produce(&request);
    assert!(result.errors.iter().any(|e| e.contains("plate dropped")));
    assert!(result.plate("NARP").is_none());
    assert_eq!(result.plate("INT1").unwrap().index, 0);

    let arp = result.plate("ARP1-1").unwrap();
    assert_eq!(arp.index, 1);
    let unknown: Vec<_> = arp
        .wells
        .iter()
        .flat_map(|w| &w.transfers)
        .filter(|t| t.is_unknown())
        .collect();
    assert_eq!(unknown.len(), 2);
    assert!(unknown.iter().all(|t| t.sample_id.starts_with('S')));
}

#[test]
fn test_global_normalization_adds_solvent() {
    let mut request = request(&["S1", "S2"]);
    request.bucket.normalize_solvent = NormalizeSolvent::Global;

    let result = produce(&request);
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let arp = result.plate("ARP1-1").unwrap();
    for well in &arp.wells {
        let total: f64 = well.transfers.iter().map(|t| t.volume).sum();
        assert!((total - 20e-9).abs() < 1e-15, "{} holds {}", well.label, total);
        assert!((well.volume - 20e-9).abs() < 1e-15);
    }

    let int = result.plate("INT1").unwrap();
    let solvent: Vec<_> = int.wells.iter().filter(|w| w.kind == "solvent").collect();
    assert_eq!(solvent.len(), 1);
    assert_eq!(solvent[0].sample_id, "DMSO");
    // Two 10 nL pads
    assert!((solvent[0].volume - (20e-9 + int.labware.dead_volume)).abs() < 1e-15);
}

#[test]
fn test_picklist_units_follow_source_plate() {
    let result = produce(&request(&["S1", "S2"]));
    let rows = picklist_rows(&result);
    assert_eq!(rows.len(), 2 + 4);

    for row in &rows {
        if row.source_label == "NARP" {
            assert_eq!(row.unit, "uL");
        } else {
            assert_eq!(row.unit, "nL");
        }
    }
    assert!(rows
        .iter()
        .any(|r| r.source_label == "NARP" && (r.volume - 0.525).abs() < 1e-9));
    assert!(rows
        .iter()
        .any(|r| r.source_label == "INT1" && (r.volume - 20.0).abs() < 1e-6));
}

#[test]
fn test_extra_copies_double_assay_draws() {
    let mut request = request(&["S1"]);
    request.copies = 2;

    let result = produce(&request);
    assert_eq!(result.plates_with_role(PlateRole::Assay).count(), 2);

    let drawn = drawn_by_well(&result);
    let out = drawn[&("NARP".to_string(), "A1".to_string())];
    assert!((out - (525e-9 + 2.0 * 10e-9)).abs() < 1e-15);
}

#[test]
fn test_zero_copies_still_makes_one_copy() {
    let mut request = request(&["S1"]);
    request.copies = 0;

    let result = produce(&request);
    let labels: Vec<&str> = result
        .plates_with_role(PlateRole::Assay)
        .map(|p| p.label.as_str())
        .collect();
    assert_eq!(labels, vec!["ARP1-1"]);
}
