// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for estimating joint velocities from sampled positions.

/// Applies exponential smoothing to a sampled signal.
///
/// # Arguments
/// * `raw` - Newest raw sample
/// * `previous` - Smoothed value of the previous time step
/// * `alpha` - Weight of the newest sample, in (0, 1]
/// # Return
/// Smoothed value `alpha * raw + (1 - alpha) * previous`.
pub fn exponential_smoothing(raw: f64, previous: f64, alpha: f64) -> f64 {
    debug_assert!(alpha > 0. && alpha <= 1.);
    alpha * raw + (1. - alpha) * previous
}

/// First-order finite difference of a position.
///
/// # Return
/// `None` if the period is not positive.
pub fn finite_difference(position: f64, position_last: f64, period: f64) -> Option<f64> {
    if period > 0. && period.is_finite() {
        Some((position - position_last) / period)
    } else {
        None
    }
}
