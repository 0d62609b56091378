//! Curve assembler - turns the best ladder into a full dilution curve
//!
//! The explorer only keeps concentrations. Here every intermediate point is
//! re-aliased against the plate it was made from, and every assay point
//! against the whole ladder, this time collecting transfers.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::document::Document;
use crate::core::numeric::{is_close, relative_error, SOURCE_MATCH_TOLERANCE};
use crate::curve::alias::{alias, DilutionTransfer};
use crate::curve::explorer::search;
use crate::curve::options::{CurveError, DilutionCurveOptions, Tier};

/// A concentration the recipe produces, with the transfers that produce it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionPoint {
    /// Concentration asked for
    pub target: f64,

    /// Concentration the transfers actually give
    pub actual: f64,

    /// Transfers in source-depth order
    #[serde(default)]
    pub transfers: Vec<DilutionTransfer>,
}

impl DilutionPoint {
    /// Relative error of the achieved concentration
    pub fn error(&self) -> f64 {
        relative_error(self.actual, self.target)
    }

    /// Total volume moved into the well
    pub fn transfer_volume(&self) -> f64 {
        self.transfers.iter().map(|t| t.volume).sum()
    }
}

/// A solved dilution curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionCurve {
    pub options: DilutionCurveOptions,

    /// Concentration of the original stock
    pub source_concentration: f64,

    /// Helper points, indexed by intermediate plate then position on the plate
    #[serde(default)]
    pub intermediate_points: Vec<Vec<DilutionPoint>>,

    /// Assay points, highest concentration first
    pub points: Vec<DilutionPoint>,

    /// Worst relative error over the assay points
    #[serde(default)]
    pub worst_error: f64,
}

impl Document for DilutionCurve {
    const KIND: &'static str = "curve";
}

impl DilutionCurve {
    /// Number of intermediate plates the recipe uses
    pub fn intermediate_depth_count(&self) -> usize {
        self.intermediate_points.len()
    }

    /// Concentrations by depth: the stock, then each intermediate plate
    pub fn all_concentrations(&self) -> Vec<Vec<f64>> {
        std::iter::once(vec![self.source_concentration])
            .chain(
                self.intermediate_points
                    .iter()
                    .map(|plate| plate.iter().map(|p| p.actual).collect()),
            )
            .collect()
    }

    /// The stock as a point of its own (no transfers)
    pub fn top_point(&self) -> DilutionPoint {
        DilutionPoint {
            target: self.source_concentration,
            actual: self.source_concentration,
            transfers: Vec::new(),
        }
    }

    /// Find the intermediate point with a matching concentration
    pub fn find_intermediate(&self, concentration: f64) -> Option<(usize, &DilutionPoint)> {
        self.intermediate_points
            .iter()
            .enumerate()
            .flat_map(|(plate, points)| points.iter().map(move |p| (plate + 1, p)))
            .find(|(_, p)| is_close(p.actual, concentration, SOURCE_MATCH_TOLERANCE))
    }

    /// Volume of the physical well realizing `point`
    pub fn well_volume(&self, point: &DilutionPoint, stock_volume: f64) -> f64 {
        if point.transfers.is_empty() {
            stock_volume
        } else {
            self.options.intermediate_well_volume(point.transfer_volume())
        }
    }
}

/// Rebuild a full curve from a ladder of concentrations
pub fn assemble(options: &DilutionCurveOptions, ladder: &[Vec<f64>]) -> DilutionCurve {
    let mut ladder: Vec<Vec<f64>> = ladder.to_vec();
    if ladder.is_empty() {
        ladder.push(vec![options.source_concentration]);
    }
    while ladder.len() > 1 && ladder.last().is_some_and(|plate| plate.is_empty()) {
        ladder.pop();
    }

    // Each plate is re-aliased against the actual concentrations of the plate
    // before it, so every transfer names a concentration that exists.
    let mut intermediate_points = Vec::with_capacity(ladder.len() - 1);
    for depth in 1..ladder.len() {
        let plate: Vec<DilutionPoint> = ladder[depth]
            .iter()
            .map(|&target| {
                let mut transfers = Vec::new();
                let actual = alias(
                    options,
                    Tier::Intermediate,
                    depth - 1..=depth - 1,
                    &ladder,
                    target,
                    Some(&mut transfers),
                );
                DilutionPoint {
                    target,
                    actual,
                    transfers,
                }
            })
            .collect();
        ladder[depth] = plate.iter().map(|p| p.actual).collect();
        intermediate_points.push(plate);
    }

    let deepest = ladder.len() - 1;
    let points: Vec<DilutionPoint> = options
        .targets()
        .into_iter()
        .map(|target| {
            let mut transfers = Vec::new();
            let actual = alias(
                options,
                Tier::Assay,
                0..=deepest,
                &ladder,
                target,
                Some(&mut transfers),
            );
            DilutionPoint {
                target,
                actual,
                transfers,
            }
        })
        .collect();

    let worst_error = points.iter().map(DilutionPoint::error).fold(0.0, f64::max);

    DilutionCurve {
        options: options.clone(),
        source_concentration: ladder[0][0],
        intermediate_points,
        points,
        worst_error,
    }
}

/// Search for the best ladder and assemble it into a curve
pub fn solve(options: &DilutionCurveOptions) -> Result<DilutionCurve, CurveError> {
    let state = search(options)?;
    let curve = assemble(options, &state.best_ladder);
    info!(
        points = curve.points.len(),
        intermediate_plates = curve.intermediate_depth_count(),
        worst_error = curve.worst_error,
        evaluated = state.evaluated,
        "curve solved"
    );
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_log_curve_from_defaults() {
        let options = DilutionCurveOptions::default();
        let curve = solve(&options).unwrap();

        let expected = [
            10e-6, 3.16e-6, 1e-6, 316e-9, 100e-9, 31.6e-9, 10e-9, 3.16e-9, 1e-9,
        ];
        assert_eq!(curve.points.len(), 9);
        for (point, want) in curve.points.iter().zip(expected) {
            assert!(
                (point.actual - want).abs() <= 0.1 * want,
                "point {} achieved {}",
                want,
                point.actual
            );
        }
        assert!(curve.worst_error <= 0.1);

        // At least one plate of helpers between the 10 mM stock and the 10 µM top point
        assert!(curve.intermediate_depth_count() >= 1);
        assert!(curve.intermediate_points[0]
            .iter()
            .any(|p| p.actual < 10e-3 && p.actual > 10e-6));
    }

    #[test]
    fn test_points_respect_tier_budgets() {
        let options = DilutionCurveOptions::default();
        let curve = solve(&options).unwrap();

        for point in &curve.points {
            assert!(point.transfer_volume() <= options.max_transfer_volume + 1e-15);
            for t in &point.transfers {
                assert!(t.source_concentration > point.target);
            }
        }
        for plate in &curve.intermediate_points {
            for point in plate {
                assert!(!point.transfers.is_empty());
                assert!(point.transfer_volume() <= options.max_intermediate_transfer_volume + 1e-15);
            }
        }
    }

    #[test]
    fn test_intermediate_transfers_come_from_parent_plate() {
        let options = DilutionCurveOptions::default();
        let curve = solve(&options).unwrap();
        let ladder = curve.all_concentrations();

        for (index, plate) in curve.intermediate_points.iter().enumerate() {
            let parents = &ladder[index];
            for point in plate {
                for t in &point.transfers {
                    assert!(parents.contains(&t.source_concentration));
                }
            }
        }
    }

    #[test]
    fn test_assemble_trims_empty_plates() {
        let options = DilutionCurveOptions {
            point_count: 1,
            ..Default::default()
        };
        let curve = assemble(&options, &[vec![10e-3], vec![]]);
        assert_eq!(curve.intermediate_depth_count(), 0);
        assert_eq!(curve.points.len(), 1);
        assert!((curve.points[0].actual - 10e-6).abs() < 1e-12);
        assert!(curve.worst_error < 1e-12);
    }

    #[test]
    fn test_find_intermediate() {
        let options = DilutionCurveOptions::default();
        let curve = assemble(&options, &[vec![10e-3], vec![10e-3 / 11.0]]);
        let (depth, point) = curve.find_intermediate(10e-3 / 11.0).unwrap();
        assert_eq!(depth, 1);
        assert_eq!(point.transfers.len(), 1);
        assert!(curve.find_intermediate(1e-7).is_none());
    }

    #[test]
    fn test_single_source_without_adjustment_solves() {
        let options = DilutionCurveOptions {
            single_source_transfers: true,
            adjust_intermediate_volume: false,
            num_intermediate_sample_points: 12,
            ..Default::default()
        };
        let curve = solve(&options).unwrap();

        assert_eq!(curve.points.len(), 9);
        for point in &curve.points {
            assert!(point.actual <= point.target * 1.1 + 1e-18);
        }
        for plate in &curve.intermediate_points {
            for point in plate {
                // Without adjustment the well stays at the pre-filled volume
                let mass: f64 = point
                    .transfers
                    .iter()
                    .map(|t| t.source_concentration * t.volume)
                    .sum();
                let expected = mass / options.intermediate_volume;
                assert!((point.actual - expected).abs() <= 1e-9 * expected);
            }
        }
    }
}
