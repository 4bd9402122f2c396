//! Windowed statistics over a mnemonic: whole range, per block, per day and
//! per fixed duration. Each call replaces the mnemonic's cached results.

use super::{change_only_stats, sigma_clip, ClippedStats};
use crate::error::{EngdbError, EngdbResult};
use crate::mnemonic::{Encoding, Mnemonic, Value, Values};
use crate::time::{median_time, midpoint, offset_seconds};
use chrono::{DateTime, Duration, Utc};
use std::ops::Range;
use tracing::debug;

/// Per-window statistics. All four columns have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    pub mean: Vec<Value>,
    pub median: Vec<Value>,
    pub stdev: Vec<f64>,
    pub median_times: Vec<DateTime<Utc>>,
}

impl WindowStats {
    pub fn len(&self) -> usize {
        self.median_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.median_times.is_empty()
    }

    fn push(&mut self, mean: Value, median: Value, stdev: f64, time: DateTime<Utc>) {
        self.mean.push(mean);
        self.median.push(median);
        self.stdev.push(stdev);
        self.median_times.push(time);
    }

    /// Numeric window means, `None` when the windows hold text.
    pub fn numeric_means(&self) -> Option<Vec<f64>> {
        self.mean.iter().map(|v| v.as_f64()).collect()
    }
}

fn summarize(
    mnemonic: &Mnemonic,
    range: Range<usize>,
    encoding: Encoding,
    sigma: f64,
) -> (Value, Value, f64) {
    match mnemonic.values() {
        // Categorical values have no mean; report the window's first state
        Values::Text(text) => match text.get(range.start) {
            Some(first) if !range.is_empty() => {
                (Value::Text(first.clone()), Value::Text(first.clone()), 0.0)
            }
            _ => (Value::Text(String::new()), Value::Text(String::new()), 0.0),
        },
        Values::Numeric(numbers) => {
            let stats = match encoding {
                Encoding::AllPoints => sigma_clip(&numbers[range], sigma),
                Encoding::ChangeOnly => {
                    change_only_stats(&mnemonic.dates()[range.clone()], &numbers[range], sigma)
                }
            };
            let ClippedStats { mean, median, stdev } = stats;
            (Value::Number(mean), Value::Number(median), stdev)
        }
    }
}

/// Index range of samples with `lo <= t < hi`, or `lo <= t <= hi` when
/// `inclusive`.
fn time_range(
    dates: &[DateTime<Utc>],
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
    inclusive: bool,
) -> Range<usize> {
    let start = dates.partition_point(|d| *d < lo);
    let end = if inclusive {
        dates.partition_point(|d| *d <= hi)
    } else {
        dates.partition_point(|d| *d < hi)
    };
    start..end.max(start)
}

impl Mnemonic {
    /// Statistics over the whole series; the representative time is the
    /// midpoint of the data range.
    pub fn full_stats(&mut self, sigma: f64) -> EngdbResult<()> {
        if self.is_empty() {
            self.stats = WindowStats::default();
            return Ok(());
        }
        let encoding = self.require_encoding()?;
        self.stats = self.compute_full_stats(encoding, sigma);
        Ok(())
    }

    pub(crate) fn compute_full_stats(&self, encoding: Encoding, sigma: f64) -> WindowStats {
        let mut stats = WindowStats::default();
        if let Some(time) = median_time(self.dates()) {
            let (mean, median, stdev) = summarize(self, 0..self.len(), encoding, sigma);
            stats.push(mean, median, stdev, time);
        }
        stats
    }

    /// Statistics per block. Without known boundaries the whole series is
    /// one block.
    pub fn block_stats(&mut self, sigma: f64) -> EngdbResult<()> {
        if self.is_empty() {
            self.stats = WindowStats::default();
            return Ok(());
        }
        let encoding = self.require_encoding()?;

        let mut stats = WindowStats::default();
        for range in self.blocks().windows(self.len()) {
            let Some(time) = median_time(&self.dates()[range.clone()]) else {
                continue;
            };
            let (mean, median, stdev) = summarize(self, range, encoding, sigma);
            stats.push(mean, median, stdev, time);
        }

        debug!("{}: block stats over {} blocks", self.identifier, stats.len());
        self.stats = stats;
        Ok(())
    }

    /// Statistics per calendar-length day, counted from the first sample.
    /// The last window ends at the last sample and includes it. Days with
    /// no samples still produce an entry (NaN for numeric data) so the output
    /// stays one-per-day.
    pub fn daily_stats(&mut self, sigma: f64) -> EngdbResult<()> {
        let (Some(first), Some(last)) = (self.data_start(), self.data_end()) else {
            self.stats = WindowStats::default();
            return Ok(());
        };
        let encoding = self.require_encoding()?;

        let mut limits = Vec::new();
        let mut day = 0;
        while first + Duration::days(day) < last {
            limits.push(first + Duration::days(day));
            day += 1;
        }
        limits.push(last);
        if limits.len() == 1 {
            // Every sample shares one timestamp
            limits.push(last);
        }

        let mut stats = WindowStats::default();
        let windows = limits.len() - 1;
        for i in 0..windows {
            let inclusive = i == windows - 1;
            let range = time_range(self.dates(), limits[i], limits[i + 1], inclusive);
            let (mean, median, stdev) = summarize(self, range, encoding, sigma);
            stats.push(mean, median, stdev, midpoint(limits[i], limits[i + 1]));
        }

        debug!("{}: daily stats over {} days", self.identifier, stats.len());
        self.stats = stats;
        Ok(())
    }

    /// Statistics over `ceil(span / duration)` consecutive windows starting at
    /// the first sample. The representative time of each window is the
    /// midpoint of the samples inside it. Windows with no samples still
    /// produce an entry (NaN for numeric data) at the midpoint of their
    /// limits, as in [`Mnemonic::daily_stats`].
    ///
    /// Sample times have microsecond resolution, so `duration` must be at
    /// least one microsecond.
    pub fn timed_stats(&mut self, duration: Duration, sigma: f64) -> EngdbResult<()> {
        if duration < Duration::microseconds(1) {
            return Err(EngdbError::validation(format!(
                "Window duration must be at least one microsecond, got {}",
                duration
            )));
        }
        let (Some(first), Some(last)) = (self.data_start(), self.data_end()) else {
            self.stats = WindowStats::default();
            return Ok(());
        };
        let encoding = self.require_encoding()?;

        let windows = window_count(last - first, duration);

        let mut stats = WindowStats::default();
        let mut lo = first;
        for i in 0..windows {
            let hi = (lo + duration).min(last);
            let range = time_range(self.dates(), lo, hi, i == windows - 1);

            let time =
                median_time(&self.dates()[range.clone()]).unwrap_or_else(|| midpoint(lo, hi));
            let (mean, median, stdev) = summarize(self, range, encoding, sigma);
            stats.push(mean, median, stdev, time);
            lo = hi;
        }

        debug!("{}: timed stats over {} windows", self.identifier, stats.len());
        self.stats = stats;
        Ok(())
    }

    /// Each sample's difference from the window means, interpolated linearly
    /// between window times and held flat beyond the first and last window.
    /// Empty for text data or when no statistics are cached.
    pub fn deviation_from_mean(&self) -> Vec<(DateTime<Utc>, f64)> {
        let (Some(numbers), Some(means)) = (self.values().as_numeric(), self.stats.numeric_means())
        else {
            return Vec::new();
        };
        let Some(&epoch) = self.stats.median_times.first() else {
            return Vec::new();
        };

        // NaN windows would poison the interpolation
        let knots: Vec<(f64, f64)> = self
            .stats
            .median_times
            .iter()
            .zip(means.iter())
            .filter(|(_, m)| m.is_finite())
            .map(|(t, m)| (offset_seconds(*t, epoch), *m))
            .collect();
        if knots.is_empty() {
            return Vec::new();
        }

        self.dates()
            .iter()
            .zip(numbers.iter())
            .map(|(date, value)| {
                let x = offset_seconds(*date, epoch);
                (*date, value - interp_clamped(&knots, x))
            })
            .collect()
    }
}

/// `ceil(span / width)`, at least one.
fn window_count(span: Duration, width: Duration) -> usize {
    let (span, width) = match (span.num_nanoseconds(), width.num_nanoseconds()) {
        (Some(span), Some(width)) => (span, width),
        // Spans beyond ~292 years only fit in microseconds
        _ => (
            span.num_microseconds().unwrap_or(i64::MAX),
            width.num_microseconds().unwrap_or(i64::MAX),
        ),
    };
    let (span, width) = (span.max(0), width.max(1));
    let count = span / width + i64::from(span % width != 0);
    usize::try_from(count).unwrap_or(usize::MAX).max(1)
}

fn interp_clamped(knots: &[(f64, f64)], x: f64) -> f64 {
    let upper = knots.partition_point(|(kx, _)| *kx <= x);
    if upper == 0 {
        return knots[0].1;
    }
    if upper == knots.len() {
        return knots[knots.len() - 1].1;
    }
    let (x0, y0) = knots[upper - 1];
    let (x1, y1) = knots[upper];
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
