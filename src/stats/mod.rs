//! Sigma-clipped summary statistics.
//!
//! Change-only telemetry is summarized with each value weighted by how long
//! it was held, so a value that persisted for an hour counts for more than
//! one that lasted a second.

pub mod window;

use crate::time::offset_seconds;
use chrono::{DateTime, Utc};

/// Default clipping threshold in standard deviations.
pub const DEFAULT_SIGMA: f64 = 3.0;

/// Integer weight given to the shortest hold interval.
pub const WEIGHT_RESOLUTION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub stdev: f64,
}

impl ClippedStats {
    pub fn nan() -> Self {
        Self {
            mean: f64::NAN,
            median: f64::NAN,
            stdev: f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.mean.is_nan()
    }
}

/// Sigma-clipped mean, median and population standard deviation.
/// Non-finite inputs are ignored; an empty input gives NaN for all three.
pub fn sigma_clip(values: &[f64], sigma: f64) -> ClippedStats {
    let weights = vec![1u64; values.len()];
    sigma_clip_weighted(values, &weights, sigma)
}

/// Sigma clipping over a weighted sample, equivalent to clipping the
/// multiset in which each value appears `weight` times.
pub fn sigma_clip_weighted(values: &[f64], weights: &[u64], sigma: f64) -> ClippedStats {
    let mut kept: Vec<(f64, u64)> = values
        .iter()
        .zip(weights.iter())
        .filter(|(v, w)| v.is_finite() && **w > 0)
        .map(|(v, w)| (*v, *w))
        .collect();

    loop {
        let Some((mean, stdev)) = weighted_moments(&kept) else {
            return ClippedStats::nan();
        };

        let before = kept.len();
        let limit = sigma * stdev;
        kept.retain(|(v, _)| (v - mean).abs() <= limit);

        if kept.len() == before {
            return ClippedStats {
                mean,
                median: weighted_median(&mut kept),
                stdev,
            };
        }
    }
}

fn weighted_moments(points: &[(f64, u64)]) -> Option<(f64, f64)> {
    let total: u64 = points.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return None;
    }
    let total = total as f64;

    let mean = points.iter().map(|(v, w)| v * *w as f64).sum::<f64>() / total;
    let variance = points
        .iter()
        .map(|(v, w)| (v - mean).powi(2) * *w as f64)
        .sum::<f64>()
        / total;

    Some((mean, variance.sqrt()))
}

fn weighted_median(points: &mut [(f64, u64)]) -> f64 {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: u64 = points.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return f64::NAN;
    }

    let nth = |position: u64| -> f64 {
        let mut seen = 0;
        for (v, w) in points.iter() {
            seen += w;
            if position < seen {
                return *v;
            }
        }
        f64::NAN
    };

    if total % 2 == 1 {
        nth(total / 2)
    } else {
        (nth(total / 2 - 1) + nth(total / 2)) / 2.0
    }
}

/// Hold-duration weights for a change-only series. Each value except the
/// last is weighted by the time until the next sample, relative to the
/// shortest positive interval. The last value has no duration and gets 0.
pub fn hold_weights(times: &[DateTime<Utc>]) -> Vec<u64> {
    if times.len() < 2 {
        return vec![1; times.len()];
    }

    let deltas: Vec<f64> = times
        .windows(2)
        .map(|w| offset_seconds(w[1], w[0]))
        .collect();
    let shortest = deltas
        .iter()
        .copied()
        .filter(|d| *d > 0.0)
        .fold(f64::INFINITY, f64::min);

    let mut weights: Vec<u64> = if shortest.is_finite() {
        deltas
            .iter()
            .map(|d| (d.max(0.0) / shortest * WEIGHT_RESOLUTION) as u64)
            .collect()
    } else {
        // All samples share a timestamp
        vec![1; deltas.len()]
    };
    weights.push(0);
    weights
}

/// Statistics of a change-only series, weighting values by hold duration.
pub fn change_only_stats(times: &[DateTime<Utc>], values: &[f64], sigma: f64) -> ClippedStats {
    match values.len() {
        0 => ClippedStats::nan(),
        1 => ClippedStats {
            mean: values[0],
            median: values[0],
            stdev: 0.0,
        },
        _ => sigma_clip_weighted(values, &hold_weights(times), sigma),
    }
}
