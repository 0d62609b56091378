//! Dilution curve options - the hardware and curve shape a solve works from
//!
//! Concentrations are mol/L and volumes are liters throughout.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::document::Document;
use crate::core::numeric::{is_multiple_of, nearest_drops, whole_drops};

/// Hard cap on intermediate plates; also bounds the explorer's recursion
pub const MAX_INTERMEDIATE_PLATES: usize = 8;

/// Which kind of well a transfer chain fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// A helper dilution on an intermediate plate
    Intermediate,
    /// A final point on the assay plate
    Assay,
}

/// Invalid curve configuration
#[derive(Debug, Error, Diagnostic, PartialEq)]
pub enum CurveError {
    #[error("{field} must be a positive number (got {value})")]
    #[diagnostic(code(dilute::curve::non_positive))]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} ({value}) is not a whole number of {droplet} droplets")]
    #[diagnostic(
        code(dilute::curve::droplet),
        help("Transfer limits must be integer multiples of droplet_size.")
    )]
    NotDropletMultiple {
        field: &'static str,
        value: f64,
        droplet: f64,
    },

    #[error("min_transfer_volume ({min}) exceeds {field} ({max})")]
    #[diagnostic(code(dilute::curve::transfer_range))]
    TransferRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("dilution_factor must be greater than 1 (got {0})")]
    #[diagnostic(code(dilute::curve::dilution_factor))]
    DilutionFactor(f64),

    #[error("tolerance must lie strictly between 0 and 1 (got {0})")]
    #[diagnostic(code(dilute::curve::tolerance))]
    Tolerance(f64),

    #[error("{field} must be at least 1")]
    #[diagnostic(code(dilute::curve::count))]
    ZeroCount { field: &'static str },

    #[error("max_intermediate_plates is {0}; at most {max} are supported", max = MAX_INTERMEDIATE_PLATES)]
    #[diagnostic(code(dilute::curve::too_many_plates))]
    TooManyPlates(usize),
}

/// Options for solving one dilution curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DilutionCurveOptions {
    /// Concentration of the original stock (nARP)
    pub source_concentration: f64,

    /// Solvent volume pre-filled in each intermediate well
    pub intermediate_volume: f64,

    /// Fixed final volume of an assay well
    pub assay_volume: f64,

    /// How many intermediate plates the recipe may use
    pub max_intermediate_plates: usize,

    /// How many helper concentrations fit on one intermediate plate
    pub max_intermediate_points_per_plate: usize,

    /// Concentration of the first assay point
    pub top_concentration: f64,

    /// Number of assay points
    pub point_count: usize,

    /// Ratio between consecutive assay points
    pub dilution_factor: f64,

    /// Allowed relative error of an achieved concentration
    pub tolerance: f64,

    /// Intermediate wells grow by the volume transferred into them
    pub adjust_intermediate_volume: bool,

    /// Draw each point from a single helper depth only
    pub single_source_transfers: bool,

    pub min_transfer_volume: f64,

    /// Total volume allowed into one assay well
    pub max_transfer_volume: f64,

    /// Total volume allowed into one intermediate well
    pub max_intermediate_transfer_volume: f64,

    /// Smallest volume the liquid handler can dispense
    pub droplet_size: f64,

    /// Candidate concentrations sampled per explorer step
    pub num_intermediate_sample_points: usize,
}

impl Default for DilutionCurveOptions {
    /// Acoustic dispenser defaults: 2.5 nL droplets, 10 mM stock,
    /// 10 µL assay wells, half-log curve from 10 µM
    fn default() -> Self {
        Self {
            source_concentration: 10e-3,
            intermediate_volume: 10e-6,
            assay_volume: 10e-6,
            max_intermediate_plates: 2,
            max_intermediate_points_per_plate: 2,
            top_concentration: 10e-6,
            point_count: 9,
            dilution_factor: 10f64.sqrt(),
            tolerance: 0.1,
            adjust_intermediate_volume: true,
            single_source_transfers: false,
            min_transfer_volume: 2.5e-9,
            max_transfer_volume: 60e-9,
            max_intermediate_transfer_volume: 1e-6,
            droplet_size: 2.5e-9,
            num_intermediate_sample_points: 20,
        }
    }
}

impl Document for DilutionCurveOptions {
    const KIND: &'static str = "curve-options";
}

fn positive(field: &'static str, value: f64) -> Result<(), CurveError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(CurveError::NonPositive { field, value })
    }
}

impl DilutionCurveOptions {
    /// Check every option before a solve starts
    pub fn validate(&self) -> Result<(), CurveError> {
        positive("source_concentration", self.source_concentration)?;
        positive("top_concentration", self.top_concentration)?;
        positive("intermediate_volume", self.intermediate_volume)?;
        positive("assay_volume", self.assay_volume)?;
        positive("min_transfer_volume", self.min_transfer_volume)?;
        positive("max_transfer_volume", self.max_transfer_volume)?;
        positive(
            "max_intermediate_transfer_volume",
            self.max_intermediate_transfer_volume,
        )?;
        positive("droplet_size", self.droplet_size)?;

        if !(self.dilution_factor > 1.0 && self.dilution_factor.is_finite()) {
            return Err(CurveError::DilutionFactor(self.dilution_factor));
        }
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(CurveError::Tolerance(self.tolerance));
        }
        if self.point_count == 0 {
            return Err(CurveError::ZeroCount {
                field: "point_count",
            });
        }
        if self.num_intermediate_sample_points == 0 {
            return Err(CurveError::ZeroCount {
                field: "num_intermediate_sample_points",
            });
        }
        if self.max_intermediate_plates > 0 && self.max_intermediate_points_per_plate == 0 {
            return Err(CurveError::ZeroCount {
                field: "max_intermediate_points_per_plate",
            });
        }
        if self.max_intermediate_plates > MAX_INTERMEDIATE_PLATES {
            return Err(CurveError::TooManyPlates(self.max_intermediate_plates));
        }

        for (field, value) in [
            ("min_transfer_volume", self.min_transfer_volume),
            ("max_transfer_volume", self.max_transfer_volume),
            (
                "max_intermediate_transfer_volume",
                self.max_intermediate_transfer_volume,
            ),
        ] {
            if !is_multiple_of(value, self.droplet_size) {
                return Err(CurveError::NotDropletMultiple {
                    field,
                    value,
                    droplet: self.droplet_size,
                });
            }
        }

        for (field, max) in [
            ("max_transfer_volume", self.max_transfer_volume),
            (
                "max_intermediate_transfer_volume",
                self.max_intermediate_transfer_volume,
            ),
        ] {
            if self.min_transfer_volume > max {
                return Err(CurveError::TransferRange {
                    field,
                    min: self.min_transfer_volume,
                    max,
                });
            }
        }

        Ok(())
    }

    /// Target concentration of every assay point, highest first
    pub fn targets(&self) -> Vec<f64> {
        (0..self.point_count)
            .map(|i| self.top_concentration / self.dilution_factor.powi(i as i32))
            .collect()
    }

    /// Smallest legal non-zero droplet count
    pub fn min_drops(&self) -> u64 {
        nearest_drops(self.min_transfer_volume, self.droplet_size).max(1)
    }

    /// Volume budget for all transfers into one well of the tier
    pub fn max_volume(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Intermediate => self.max_intermediate_transfer_volume,
            Tier::Assay => self.max_transfer_volume,
        }
    }

    /// Droplet budget for one well of the tier
    pub fn max_drops(&self, tier: Tier) -> u64 {
        whole_drops(self.max_volume(tier), self.droplet_size)
    }

    /// Volume of the well before anything is transferred in
    pub fn base_volume(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Intermediate => self.intermediate_volume,
            Tier::Assay => self.assay_volume,
        }
    }

    /// Whether transferred volume adds to the well's volume in the mass balance
    pub fn grows_with_transfers(&self, tier: Tier) -> bool {
        tier == Tier::Intermediate && self.adjust_intermediate_volume
    }

    /// Physical volume of an intermediate well holding `transferred` liters of sample
    pub fn intermediate_well_volume(&self, transferred: f64) -> f64 {
        if self.adjust_intermediate_volume {
            self.intermediate_volume + transferred
        } else {
            self.intermediate_volume
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = DilutionCurveOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert_eq!(options.min_drops(), 1);
        assert_eq!(options.max_drops(Tier::Assay), 24);
        assert_eq!(options.max_drops(Tier::Intermediate), 400);
    }

    #[test]
    fn test_targets_follow_dilution_factor() {
        let options = DilutionCurveOptions::default();
        let targets = options.targets();
        assert_eq!(targets.len(), 9);
        assert!((targets[0] - 10e-6).abs() < 1e-15);
        assert!((targets[2] - 1e-6).abs() < 1e-15);
        assert!((targets[8] - 1e-9).abs() < 1e-17);
    }

    #[test]
    fn test_zero_dilution_factor_rejected() {
        let options = DilutionCurveOptions {
            dilution_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(CurveError::DilutionFactor(0.0)));
    }

    #[test]
    fn test_droplet_must_divide_transfer_limits() {
        let options = DilutionCurveOptions {
            min_transfer_volume: 3e-9,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CurveError::NotDropletMultiple {
                field: "min_transfer_volume",
                ..
            })
        ));
    }

    #[test]
    fn test_plate_cap_enforced() {
        let options = DilutionCurveOptions {
            max_intermediate_plates: MAX_INTERMEDIATE_PLATES + 1,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CurveError::TooManyPlates(_))
        ));
    }

    #[test]
    fn test_non_positive_volume_rejected() {
        let options = DilutionCurveOptions {
            assay_volume: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CurveError::NonPositive {
                field: "assay_volume",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let options: DilutionCurveOptions =
            serde_yml::from_str("top_concentration: 2.0e-5\npoint_count: 4\n").unwrap();
        assert_eq!(options.point_count, 4);
        assert!((options.top_concentration - 2e-5).abs() < 1e-18);
        assert_eq!(options.droplet_size, 2.5e-9);
    }
}
