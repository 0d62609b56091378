//! Numeric helpers shared by the solver and the allocator
//!
//! All quantities are SI: concentrations in mol/L, volumes in liters.

/// Slack used when converting volumes to droplet counts
pub const QUANTIZE_EPSILON: f64 = 1e-9;

/// Volumes below this are treated as nothing at all (one femtoliter)
pub const VOLUME_EPSILON: f64 = 1e-15;

/// Concentrations below this mean the dilution chain bottomed out
pub const ZERO_CONCENTRATION: f64 = 1e-18;

/// Relative tolerance used to decide two sources describe the same liquid
pub const SOURCE_MATCH_TOLERANCE: f64 = 1e-3;

/// Check whether two values agree within a relative tolerance.
///
/// The tolerance is taken relative to the larger magnitude, so the
/// comparison is symmetric. Two zeros are always close.
pub fn is_close(a: f64, b: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= rel_tol * scale
}

/// Relative error of `actual` against `target`.
///
/// Returns 1.0 (complete miss) when nothing was achieved or the target is
/// not a positive number.
pub fn relative_error(actual: f64, target: f64) -> f64 {
    if target <= 0.0 || !target.is_finite() || actual <= 0.0 {
        return 1.0;
    }
    (actual - target).abs() / target
}

/// Number of whole droplets that fit in `volume`
pub fn whole_drops(volume: f64, droplet: f64) -> u64 {
    if volume <= 0.0 || droplet <= 0.0 {
        return 0;
    }
    (volume / droplet + QUANTIZE_EPSILON).floor().max(0.0) as u64
}

/// Nearest droplet count for `volume`
pub fn nearest_drops(volume: f64, droplet: f64) -> u64 {
    if volume <= 0.0 || droplet <= 0.0 {
        return 0;
    }
    (volume / droplet).round().max(0.0) as u64
}

/// Check that `volume` is an integer multiple of `droplet`
pub fn is_multiple_of(volume: f64, droplet: f64) -> bool {
    if droplet <= 0.0 {
        return false;
    }
    let ratio = volume / droplet;
    (ratio - ratio.round()).abs() <= 1e-6 * ratio.max(1.0)
}

/// `count` values spaced evenly in log space from `high` down to `low`.
///
/// A single requested value yields `high`. Empty when the interval is empty
/// or either bound is not positive.
pub fn geometric_descending(high: f64, low: f64, count: usize) -> Vec<f64> {
    if count == 0 || high <= 0.0 || low <= 0.0 || low > high {
        return Vec::new();
    }
    if count == 1 {
        return vec![high];
    }
    let ratio = low / high;
    let steps = (count - 1) as f64;
    (0..count)
        .map(|i| high * ratio.powf(i as f64 / steps))
        .collect()
}

/// Format a number with up to `decimals` places, dropping trailing zeros
pub fn trim_decimal(value: f64, decimals: usize) -> String {
    let s = format!("{:.*}", decimals, value);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.');
        if trimmed == "-0" {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        s
    }
}
