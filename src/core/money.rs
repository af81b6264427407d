//! Numeric helpers shared by the rollups and the verifier.
//!
//! Money and ratios are rounded when they are aggregated, not when they are shown.

/// Rounds to two decimal places, half away from zero.
#[must_use]
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Rounds to one decimal place, half away from zero.
#[must_use]
pub fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

/// Rounds to `places` decimal places, half away from zero.
#[must_use]
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places.try_into().unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

/// `numerator / denominator` rounded to two decimals; a zero denominator yields 0.
#[must_use]
pub fn safe_avg(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    // Row counts stay far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    let denominator = denominator as f64;
    round2(numerator / denominator)
}

/// Whether `value` carries no more than `places` decimal digits.
///
/// Binary floating point cannot hold most decimal fractions exactly, so the scaled
/// value only has to sit within a millionth of an integer.
#[must_use]
pub fn has_at_most_decimals(value: f64, places: u32) -> bool {
    if !value.is_finite() {
        return false;
    }
    let factor = 10f64.powi(places.try_into().unwrap_or(i32::MAX));
    let scaled = value * factor;
    (scaled - scaled.round()).abs() <= 1e-6 * scaled.abs().max(1.0)
}
