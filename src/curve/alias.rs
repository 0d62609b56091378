//! Alias engine - hits a target concentration with droplet-quantized transfers
//!
//! Given a ladder of available concentrations (one list per depth, most
//! concentrated first), the engine walks the depths in order and, for each
//! source, moves the mixture toward the target with a whole number of
//! droplets. The walk is greedy: a depth is never revisited and each source
//! gets the closer of the floor/ceiling droplet counts.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::core::numeric::{QUANTIZE_EPSILON, VOLUME_EPSILON};
use crate::curve::options::{DilutionCurveOptions, Tier};

/// One aliquot moved from an existing concentration into a target well
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DilutionTransfer {
    /// Concentration of the well the liquid is taken from
    pub source_concentration: f64,

    /// Volume moved (a whole number of droplets)
    pub volume: f64,
}

/// Running mass balance of the well being filled
#[derive(Debug, Clone, Copy)]
struct Mixture {
    /// Amount of compound transferred so far (mol)
    mass: f64,
    /// Volume transferred so far
    transferred: f64,
}

impl Mixture {
    fn concentration(&self, options: &DilutionCurveOptions, tier: Tier) -> f64 {
        let volume = if options.grows_with_transfers(tier) {
            options.base_volume(tier) + self.transferred
        } else {
            options.base_volume(tier)
        };
        self.mass / volume
    }

    fn with(&self, source: f64, volume: f64) -> Mixture {
        Mixture {
            mass: self.mass + source * volume,
            transferred: self.transferred + volume,
        }
    }

    /// Fractional droplet count that would land exactly on `target`
    fn ideal_drops(&self, options: &DilutionCurveOptions, tier: Tier, source: f64, target: f64) -> f64 {
        let droplet = options.droplet_size;
        let base = options.base_volume(tier);
        if options.grows_with_transfers(tier) {
            (target * (base + self.transferred) - self.mass) / (droplet * (source - target))
        } else {
            (target * base - self.mass) / (source * droplet)
        }
    }
}

/// Compute an achievable concentration for `target`.
///
/// Sources are read from `ladder[depth]` for every depth in `depths`.
/// Accepted transfers are appended to `transfers` in depth order when a
/// collector is supplied. Returns the concentration the chain achieves, or
/// 0.0 when nothing could be transferred.
pub fn alias(
    options: &DilutionCurveOptions,
    tier: Tier,
    depths: RangeInclusive<usize>,
    ladder: &[Vec<f64>],
    target: f64,
    mut transfers: Option<&mut Vec<DilutionTransfer>>,
) -> f64 {
    if !(target > 0.0 && target.is_finite()) {
        return 0.0;
    }

    let lower = target * (1.0 - options.tolerance);
    let upper = target * (1.0 + options.tolerance);
    let droplet = options.droplet_size;
    let min_drops = options.min_drops() as f64;
    let budget = options.max_volume(tier);

    let mut mixture = Mixture {
        mass: 0.0,
        transferred: 0.0,
    };
    let mut achieved = 0.0;

    for depth in depths {
        let Some(sources) = ladder.get(depth) else {
            break;
        };
        let mut contributed = false;

        for &source in sources {
            if source <= target {
                continue;
            }

            let max_drops = ((budget - mixture.transferred) / droplet + QUANTIZE_EPSILON).floor();
            if max_drops <= 0.0 {
                return achieved;
            }

            let ideal = mixture
                .ideal_drops(options, tier, source, target)
                .clamp(0.0, max_drops);

            let mut low = (ideal + QUANTIZE_EPSILON).floor();
            if low < min_drops {
                low = 0.0;
            }
            let high = (ideal - QUANTIZE_EPSILON).ceil().max(min_drops);

            let low_mix = mixture.with(source, low * droplet);
            let mut drops = low;
            let mut next = low_mix;
            if high <= max_drops {
                let high_mix = mixture.with(source, high * droplet);
                let c_low = low_mix.concentration(options, tier);
                let c_high = high_mix.concentration(options, tier);
                if (c_high - target).abs() < (c_low - target).abs() {
                    drops = high;
                    next = high_mix;
                }
            }

            // The closer count wins; if it overshoots, this source is skipped
            let candidate = next.concentration(options, tier);
            if drops > 0.0 && candidate <= upper {
                mixture = next;
                achieved = candidate;
                contributed = true;
                if let Some(out) = transfers.as_deref_mut() {
                    out.push(DilutionTransfer {
                        source_concentration: source,
                        volume: drops * droplet,
                    });
                }
            }

            if achieved >= lower {
                return achieved;
            }
            if budget - mixture.transferred < droplet - VOLUME_EPSILON {
                return achieved;
            }
        }

        if options.single_source_transfers && contributed {
            break;
        }
    }

    achieved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> DilutionCurveOptions {
        DilutionCurveOptions::default()
    }

    fn stock_only() -> Vec<Vec<f64>> {
        vec![vec![10e-3]]
    }

    #[test]
    fn test_exact_droplet_hit_from_stock() {
        // 4 droplets of 10 mM into 10 µL is exactly 10 µM
        let mut transfers = Vec::new();
        let achieved = alias(&options(), Tier::Assay, 0..=0, &stock_only(), 10e-6, Some(&mut transfers));

        assert!((achieved - 10e-6).abs() < 1e-12);
        assert_eq!(transfers.len(), 1);
        assert!((transfers[0].volume - 10e-9).abs() < 1e-15);
    }

    #[test]
    fn test_unreachable_target_returns_zero() {
        // A single droplet of stock already gives 2.5 µM, far above 1 nM
        let achieved = alias(&options(), Tier::Assay, 0..=0, &stock_only(), 1e-9, None);
        assert_eq!(achieved, 0.0);
    }

    #[test]
    fn test_fine_tunes_with_second_source() {
        let ladder = vec![vec![10e-3], vec![1e-3]];
        let target = 10e-6 / 10f64.sqrt();
        let mut transfers = Vec::new();
        let achieved = alias(&options(), Tier::Assay, 0..=1, &ladder, target, Some(&mut transfers));

        assert!((achieved - target).abs() <= 0.1 * target);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].source_concentration, 10e-3);
        assert_eq!(transfers[1].source_concentration, 1e-3);
    }

    #[test]
    fn test_transfers_are_droplet_multiples_above_target() {
        let ladder = vec![vec![10e-3], vec![3.5e-4, 1.9e-4], vec![7.9e-6, 8.1e-7]];
        let opts = options();
        for target in opts.targets() {
            let mut transfers = Vec::new();
            alias(&opts, Tier::Assay, 0..=2, &ladder, target, Some(&mut transfers));
            let total: f64 = transfers.iter().map(|t| t.volume).sum();
            assert!(total <= opts.max_transfer_volume + 1e-15);
            for t in &transfers {
                assert!(t.source_concentration > target);
                let drops = t.volume / opts.droplet_size;
                assert!((drops - drops.round()).abs() < 1e-6);
                assert!(t.volume >= opts.min_transfer_volume - 1e-15);
            }
        }
    }

    #[test]
    fn test_never_overshoots_upper_bound() {
        let ladder = vec![vec![10e-3], vec![3.5e-4, 1.9e-4], vec![7.9e-6, 8.1e-7]];
        let opts = options();
        for target in opts.targets() {
            let achieved = alias(&opts, Tier::Assay, 0..=2, &ladder, target, None);
            assert!(achieved <= target * (1.0 + opts.tolerance) + 1e-18);
        }
    }

    #[test]
    fn test_intermediate_volume_adjustment() {
        // 1 µL of 10 mM into 10 µL grows the well to 11 µL
        let opts = options();
        let achieved = alias(&opts, Tier::Intermediate, 0..=0, &stock_only(), 10e-3 / 11.0, None);
        assert!((achieved - 10e-3 / 11.0).abs() < 1e-12);

        let fixed = DilutionCurveOptions {
            adjust_intermediate_volume: false,
            ..opts
        };
        let achieved = alias(&fixed, Tier::Intermediate, 0..=0, &stock_only(), 1e-3, None);
        assert!((achieved - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_single_source_stops_after_first_depth() {
        let ladder = vec![vec![10e-3], vec![1e-3]];
        let target = 10e-6 / 10f64.sqrt();
        let opts = DilutionCurveOptions {
            single_source_transfers: true,
            ..options()
        };
        let mut transfers = Vec::new();
        alias(&opts, Tier::Assay, 0..=1, &ladder, target, Some(&mut transfers));

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].source_concentration, 10e-3);
    }

    #[test]
    fn test_single_source_without_volume_adjustment() {
        let ladder = vec![vec![10e-3], vec![1e-3, 1e-4]];
        let opts = DilutionCurveOptions {
            single_source_transfers: true,
            adjust_intermediate_volume: false,
            ..options()
        };
        // 10 µM from 1 mM needs 100 nL into a fixed 10 µL intermediate well
        let mut transfers = Vec::new();
        let achieved = alias(&opts, Tier::Intermediate, 1..=1, &ladder, 10e-6, Some(&mut transfers));
        assert!((achieved - 10e-6).abs() < 1e-12);
        assert_eq!(transfers.len(), 1);
        assert!((transfers[0].volume - 100e-9).abs() < 1e-15);
    }

    #[test]
    fn test_exhausted_budget_stops() {
        let opts = DilutionCurveOptions {
            max_transfer_volume: 2.5e-9,
            ..options()
        };
        // One droplet of 1 mM is 0.25 µM; the budget allows nothing more
        let ladder = vec![vec![1e-3], vec![1e-4]];
        let mut transfers = Vec::new();
        let achieved = alias(&opts, Tier::Assay, 0..=1, &ladder, 0.3e-6, Some(&mut transfers));
        assert_eq!(transfers.len(), 1);
        assert!((achieved - 0.25e-6).abs() < 1e-12);
    }

    #[test]
    fn test_overshooting_closer_count_skips_source() {
        // 2 droplets of 10 mM (5 µM) beat 1 droplet (2.5 µM) for 4.4 µM but
        // overshoot 4.84 µM, so 10 mM is skipped and 1 mM does the work
        let ladder = vec![vec![10e-3], vec![1e-3]];
        let mut transfers = Vec::new();
        let achieved = alias(&options(), Tier::Assay, 0..=1, &ladder, 4.4e-6, Some(&mut transfers));

        assert!(transfers.iter().all(|t| t.source_concentration != 10e-3));
        assert_eq!(transfers.len(), 1);
        assert!((transfers[0].volume - 45e-9).abs() < 1e-15);
        assert!((achieved - 4.5e-6).abs() < 1e-12);
    }
}
