//! Curve explorer - bounded depth-first search over intermediate ladders
//!
//! A ladder is a list of concentration lists: `ladder[0]` holds the stock,
//! `ladder[d]` the helper concentrations on intermediate plate `d`. The
//! search fills one plate at a time, opening a new plate only when the
//! current one is full, and keeps the ladder with the lowest worst-case
//! assay error.

use tracing::debug;

use crate::core::numeric::{geometric_descending, relative_error, ZERO_CONCENTRATION};
use crate::curve::alias::alias;
use crate::curve::options::{CurveError, DilutionCurveOptions, Tier, MAX_INTERMEDIATE_PLATES};

/// Ratio below the previous helper where the next candidate scan starts
const NEXT_POINT_RATIO: f64 = 0.9;

/// Best-so-far accumulator owned by one search
#[derive(Debug, Clone)]
pub struct SearchState {
    /// Worst relative error of the best ladder
    pub best_score: f64,

    /// Best ladder found, trailing empty plates removed
    pub best_ladder: Vec<Vec<f64>>,

    /// Number of ladders scored
    pub evaluated: usize,

    targets: Vec<f64>,
}

impl SearchState {
    pub fn new(options: &DilutionCurveOptions) -> Self {
        Self {
            best_score: f64::INFINITY,
            best_ladder: vec![vec![options.source_concentration]],
            evaluated: 0,
            targets: options.targets(),
        }
    }

    fn offer(&mut self, score: f64, ladder: &[Vec<f64>]) {
        self.evaluated += 1;
        if score < self.best_score {
            let mut best = ladder.to_vec();
            while best.len() > 1 && best.last().is_some_and(|plate| plate.is_empty()) {
                best.pop();
            }
            debug!(
                score,
                plates = best.len() - 1,
                evaluated = self.evaluated,
                "new best ladder"
            );
            self.best_score = score;
            self.best_ladder = best;
        }
    }
}

/// Worst relative error over all assay targets using every depth of `ladder`
pub fn evaluate_fast(options: &DilutionCurveOptions, ladder: &[Vec<f64>], targets: &[f64]) -> f64 {
    let deepest = ladder.len().saturating_sub(1);
    targets
        .iter()
        .map(|&target| {
            let achieved = alias(options, Tier::Assay, 0..=deepest, ladder, target, None);
            relative_error(achieved, target)
        })
        .fold(0.0, f64::max)
}

/// Interval a new helper made from `previous` can land in.
///
/// The lower end is raised to the lowest concentration that can still feed
/// the most dilute assay point. `None` when nothing useful fits.
pub fn candidate_bounds(
    options: &DilutionCurveOptions,
    previous: &[f64],
    min_target: f64,
) -> Option<(f64, f64)> {
    let highest = previous.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = previous.iter().copied().fold(f64::INFINITY, f64::min);
    if !(highest > 0.0 && lowest > 0.0) {
        return None;
    }

    let base = options.intermediate_volume;
    let max_in = options.max_intermediate_transfer_volume;
    let min_in = options.min_transfer_volume;
    let (upper, lower) = if options.adjust_intermediate_volume {
        (
            highest * max_in / (base + max_in),
            lowest * min_in / (base + min_in),
        )
    } else {
        (highest * max_in / base, lowest * min_in / base)
    };

    let useful = min_target * (1.0 - options.tolerance) * options.assay_volume
        / options.max_transfer_volume;
    let lower = lower.max(useful);

    if upper > lower {
        Some((lower, upper))
    } else {
        None
    }
}

/// Explore ladders from plate `depth` onward.
///
/// `ladder` is used as a stack and is restored before returning.
pub fn explore(
    options: &DilutionCurveOptions,
    state: &mut SearchState,
    depth: usize,
    ladder: &mut Vec<Vec<f64>>,
) {
    assert!(
        depth <= MAX_INTERMEDIATE_PLATES + 1,
        "explorer depth {depth} beyond the intermediate plate cap"
    );

    let score = evaluate_fast(options, ladder, &state.targets);
    state.offer(score, ladder);

    if depth > options.max_intermediate_plates || depth >= ladder.len() {
        return;
    }

    if ladder[depth].len() >= options.max_intermediate_points_per_plate {
        if depth + 1 > options.max_intermediate_plates {
            return;
        }
        ladder.push(Vec::new());
        explore(options, state, depth + 1, ladder);
        ladder.pop();
        return;
    }

    let min_target = state.targets.iter().copied().fold(f64::INFINITY, f64::min);
    let Some((lower, upper)) = candidate_bounds(options, &ladder[depth - 1], min_target) else {
        return;
    };

    let limit = ladder[depth]
        .last()
        .map(|&last| last * NEXT_POINT_RATIO)
        .unwrap_or(f64::INFINITY);

    for candidate in geometric_descending(upper, lower, options.num_intermediate_sample_points) {
        if candidate > limit {
            continue;
        }

        let achieved = alias(
            options,
            Tier::Intermediate,
            depth - 1..=depth - 1,
            ladder,
            candidate,
            None,
        );
        if achieved < ZERO_CONCENTRATION {
            break;
        }
        if achieved > limit {
            continue;
        }

        ladder[depth].push(achieved);
        explore(options, state, depth, ladder);
        ladder[depth].pop();
    }
}

/// Run the full search for `options`
pub fn search(options: &DilutionCurveOptions) -> Result<SearchState, CurveError> {
    options.validate()?;

    let mut state = SearchState::new(options);
    let mut ladder = vec![vec![options.source_concentration]];
    if options.max_intermediate_plates > 0 {
        ladder.push(Vec::new());
    }
    explore(options, &mut state, 1, &mut ladder);

    debug!(
        evaluated = state.evaluated,
        score = state.best_score,
        "ladder search finished"
    );
    Ok(state)
}
