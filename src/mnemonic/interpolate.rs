use super::{Blocks, Encoding, Mnemonic, Samples, Values};
use crate::error::{EngdbError, EngdbResult};
use crate::time::offset_seconds;
use chrono::{DateTime, Utc};
use tracing::debug;

impl Mnemonic {
    /// Resample onto `times`, returning a new mnemonic.
    ///
    /// Change-only data holds the latest value at or before each target;
    /// targets before the first sample are dropped. All-points data is
    /// interpolated linearly and never extrapolated, and needs at least two
    /// samples (fewer gives an empty result). Text data can only be held,
    /// not interpolated. An empty series resamples to an empty series
    /// whether or not its encoding is known.
    pub fn interpolate(&self, times: &[DateTime<Utc>]) -> EngdbResult<Mnemonic> {
        if self.is_empty() {
            return Ok(self.with_samples(self.samples().cleared(), Blocks::Unknown));
        }
        let encoding = self.require_encoding()?;

        let mut targets = times.to_vec();
        targets.sort();
        targets.dedup();

        let samples = match encoding {
            Encoding::ChangeOnly => hold_previous(self.samples(), &targets),
            Encoding::AllPoints => linear(self.samples(), &targets).map_err(|e| match e {
                EngdbError::Validation { message } => {
                    EngdbError::validation(format!("{}: {}", self.identifier, message))
                }
                other => other,
            })?,
        };

        let blocks = remap_blocks(self.blocks(), self.dates(), samples.dates());
        debug!(
            "Interpolated {} from {} to {} samples",
            self.identifier,
            self.len(),
            samples.len()
        );
        Ok(self.with_samples(samples, blocks))
    }
}

fn hold_previous(samples: &Samples, targets: &[DateTime<Utc>]) -> Samples {
    let dates = samples.dates();
    let mut kept_dates = Vec::with_capacity(targets.len());
    let mut sources = Vec::with_capacity(targets.len());

    for target in targets {
        let at_or_before = dates.partition_point(|d| d <= target);
        if at_or_before > 0 {
            kept_dates.push(*target);
            sources.push(at_or_before - 1);
        }
    }

    Samples::from_parts_unchecked(kept_dates, samples.values().select(&sources))
}

fn linear(samples: &Samples, targets: &[DateTime<Utc>]) -> EngdbResult<Samples> {
    let ys = match samples.values() {
        Values::Numeric(v) => v,
        Values::Text(_) => {
            return Err(EngdbError::validation(
                "text values can only be resampled with change-only encoding",
            ))
        }
    };
    if samples.len() < 2 {
        return Ok(samples.cleared());
    }

    let epoch = samples.dates()[0];
    let xs: Vec<f64> = samples.dates().iter().map(|d| offset_seconds(*d, epoch)).collect();
    let (first, last) = (xs[0], xs[xs.len() - 1]);

    let mut out_dates = Vec::with_capacity(targets.len());
    let mut out_values = Vec::with_capacity(targets.len());
    for target in targets {
        let x = offset_seconds(*target, epoch);
        if x < first || x > last {
            continue;
        }

        let upper = xs.partition_point(|v| *v <= x);
        let y = if upper == xs.len() {
            ys[ys.len() - 1]
        } else {
            let lower = upper - 1;
            ys[lower] + (ys[upper] - ys[lower]) * (x - xs[lower]) / (xs[upper] - xs[lower])
        };

        out_dates.push(*target);
        out_values.push(y);
    }

    Ok(Samples::from_parts_unchecked(out_dates, Values::Numeric(out_values)))
}

/// Carry block boundaries over to a resampled series: each block now starts
/// at the first new sample at or after its old start time.
pub(crate) fn remap_blocks(
    blocks: &Blocks,
    old_dates: &[DateTime<Utc>],
    new_dates: &[DateTime<Utc>],
) -> Blocks {
    let Blocks::Known(bounds) = blocks else {
        return Blocks::Unknown;
    };

    let mut remapped: Vec<usize> = Vec::with_capacity(bounds.len());
    for &start in bounds.iter().filter(|&&b| b < old_dates.len()) {
        let idx = new_dates.partition_point(|d| *d < old_dates[start]);
        if idx < new_dates.len() && remapped.last() != Some(&idx) {
            remapped.push(idx);
        }
    }
    remapped.push(new_dates.len());

    Blocks::Known(remapped)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::mnemonic::{QueryMeta, Value};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_change_only_holds_previous() {
        let m = numeric(
            "IMIR_HK_ICE_SEC_VOLT4",
            &[(0, 1.0), (10, 2.0)],
            Some(Encoding::ChangeOnly),
            Blocks::Unknown,
        );

        let out = m.interpolate(&[secs(5), secs(-1), secs(15), secs(10)]).unwrap();

        assert_eq!(out.dates(), &[secs(5), secs(10), secs(15)]);
        assert_eq!(out.values().as_numeric().unwrap(), &[1.0, 2.0, 2.0]);
        // Source untouched
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_all_points_linear() {
        let m = numeric(
            "SA_ZFGOUTFOV",
            &[(0, 0.0), (10, 10.0), (20, 0.0)],
            Some(Encoding::AllPoints),
            Blocks::Unknown,
        );

        let out = m.interpolate(&[secs(-5), secs(0), secs(5), secs(15), secs(20), secs(25)]).unwrap();

        assert_eq!(out.dates(), &[secs(0), secs(5), secs(15), secs(20)]);
        let values = out.values().as_numeric().unwrap();
        assert_abs_diff_eq!(values[0], 0.0);
        assert_abs_diff_eq!(values[1], 5.0);
        assert_abs_diff_eq!(values[2], 5.0);
        assert_abs_diff_eq!(values[3], 0.0);
    }

    #[test]
    fn test_all_points_needs_two_samples() {
        let m = numeric("SA_ZFGOUTFOV", &[(0, 1.0)], Some(Encoding::AllPoints), Blocks::Unknown);
        let out = m.interpolate(&[secs(0)]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_encoding() {
        let m = numeric("SA_ZFGOUTFOV", &[(0, 1.0), (1, 2.0)], None, Blocks::Unknown);
        assert!(matches!(
            m.interpolate(&[secs(0)]),
            Err(EngdbError::MissingEncoding { .. })
        ));
    }

    #[test]
    fn test_text_values() {
        let samples = Samples::text(
            vec![secs(0), secs(10)],
            vec!["OFF".to_string(), "ON".to_string()],
        )
        .unwrap();
        let mut m = Mnemonic::new(
            "INRSI_STATE",
            secs(0),
            secs(10),
            samples,
            Some(QueryMeta::new(Encoding::ChangeOnly)),
            None,
            Blocks::Unknown,
        );

        let held = m.interpolate(&[secs(3), secs(12)]).unwrap();
        assert_eq!(held.values().get(0), Some(Value::from("OFF")));
        assert_eq!(held.values().get(1), Some(Value::from("ON")));

        m.meta = Some(QueryMeta::new(Encoding::AllPoints));
        assert!(matches!(
            m.interpolate(&[secs(3)]),
            Err(EngdbError::Validation { .. })
        ));
    }

    #[test]
    fn test_blocks_follow_resampling() {
        let m = numeric(
            "SA_ZFGOUTFOV",
            &[(0, 1.0), (10, 1.0), (100, 5.0), (110, 5.0)],
            Some(Encoding::AllPoints),
            Blocks::Known(vec![0, 2, 4]),
        );

        let targets: Vec<_> = (0..=11).map(|i| secs(i * 10)).collect();
        let out = m.interpolate(&targets).unwrap();

        assert_eq!(out.len(), 12);
        assert_eq!(out.blocks(), &Blocks::Known(vec![0, 10, 12]));
    }

    #[test]
    fn test_unknown_blocks_stay_unknown() {
        let m = numeric(
            "SA_ZFGOUTFOV",
            &[(0, 1.0), (10, 2.0)],
            Some(Encoding::AllPoints),
            Blocks::Unknown,
        );
        let out = m.interpolate(&[secs(5)]).unwrap();
        assert_eq!(out.blocks(), &Blocks::Unknown);
    }

    #[test]
    fn test_remap_drops_duplicate_starts() {
        let old = vec![secs(0), secs(1), secs(2), secs(50)];
        let new = vec![secs(0), secs(40), secs(50)];
        let remapped = remap_blocks(&Blocks::Known(vec![0, 1, 2, 4]), &old, &new);
        assert_eq!(remapped, Blocks::Known(vec![0, 1, 3]));
    }

    #[test]
    fn test_empty_series_resamples_to_empty() {
        let targets = [secs(0), secs(5), secs(10)];
        for encoding in [Some(Encoding::ChangeOnly), Some(Encoding::AllPoints), None] {
            let m = numeric("SA_ZFGOUTFOV", &[], encoding, Blocks::Unknown);
            let out = m.interpolate(&targets).unwrap();
            assert!(out.is_empty());
            assert_eq!(out.encoding(), encoding);
            assert!(out.values().is_numeric());
        }
    }

    #[test]
    fn test_multiply_empty_series() {
        let empty = numeric("SA_ZFGOUTFOV", &[], Some(Encoding::AllPoints), Blocks::Unknown);
        let other = numeric(
            "IMIR_HK_ICE_SEC_VOLT4",
            &[(0, 1.0), (10, 2.0)],
            Some(Encoding::AllPoints),
            Blocks::Unknown,
        );

        let product = empty.multiply(&other).unwrap();
        assert!(product.is_empty());
        assert_eq!(product.identifier, "SA_ZFGOUTFOV");
    }
}
