use super::{Blocks, Mnemonic, Samples};
use chrono::{DateTime, Duration, Utc};

/// Clip change-only samples (retrieved with bracketing values) to
/// `[start, end]` and pin the value in effect at both ends.
///
/// The value at `start` is the last sample strictly before it, or the
/// missing marker (NaN / empty text) when there is none. The value at `end`
/// is the last sample strictly before `end`. No synthetic sample is added
/// at a bound that already has a real sample.
pub fn change_only_bounding_points(
    samples: &Samples,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Samples {
    let dates = samples.dates();
    let before_start = dates.partition_point(|d| *d < start);
    let before_end = dates.partition_point(|d| *d < end);
    let inside_end = dates.partition_point(|d| *d <= end);

    let mut out_dates = Vec::with_capacity(inside_end.saturating_sub(before_start) + 2);
    let mut sources: Vec<Option<usize>> = Vec::with_capacity(out_dates.capacity());

    if dates.get(before_start) != Some(&start) {
        out_dates.push(start);
        sources.push(before_start.checked_sub(1));
    }

    for idx in before_start..inside_end.max(before_start) {
        out_dates.push(dates[idx]);
        sources.push(Some(idx));
    }

    let end_is_real = inside_end > before_start && dates[inside_end - 1] == end;
    if !end_is_real && out_dates.last() != Some(&end) {
        out_dates.push(end);
        sources.push(before_end.checked_sub(1));
    }

    Samples::from_parts_unchecked(out_dates, samples.values().select_or_missing(&sources))
}

impl Mnemonic {
    /// Expand change-only data into a step shape: before every sample after
    /// the first, insert a point one microsecond earlier carrying the previous
    /// value. Insertions that would not land strictly after the preceding
    /// sample are skipped. Returns a new mnemonic with blocks remapped.
    pub fn change_only_add_points(&self) -> Mnemonic {
        let dates = self.dates();
        let step = Duration::microseconds(1);

        let mut new_dates = Vec::with_capacity(dates.len() * 2);
        let mut sources = Vec::with_capacity(dates.len() * 2);
        let mut positions = Vec::with_capacity(dates.len());

        for (i, date) in dates.iter().enumerate() {
            if i > 0 {
                let held = *date - step;
                if held > dates[i - 1] {
                    new_dates.push(held);
                    sources.push(i - 1);
                }
            }
            positions.push(new_dates.len());
            new_dates.push(*date);
            sources.push(i);
        }

        let blocks = match self.blocks() {
            Blocks::Unknown => Blocks::Unknown,
            Blocks::Known(bounds) => Blocks::Known(
                bounds
                    .iter()
                    .map(|&b| positions.get(b).copied().unwrap_or(new_dates.len()))
                    .collect(),
            ),
        };

        let samples = Samples::from_parts_unchecked(new_dates, self.values().select(&sources));
        self.with_samples(samples, blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::mnemonic::{Encoding, Value};

    fn pairs(samples: &Samples) -> Vec<(DateTime<Utc>, Value)> {
        samples.iter().collect()
    }

    #[test]
    fn test_bounding_points_no_prior_value() {
        let samples = Samples::numeric(vec![secs(5), secs(15)], vec![1.0, 2.0]).unwrap();
        let bounded = change_only_bounding_points(&samples, secs(0), secs(20));

        assert_eq!(bounded.dates(), &[secs(0), secs(5), secs(15), secs(20)]);
        let values = bounded.values().as_numeric().unwrap();
        assert!(values[0].is_nan());
        assert_eq!(&values[1..], &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_bounding_points_bracket_values() {
        let samples =
            Samples::numeric(vec![secs(-10), secs(5), secs(15), secs(30)], vec![0.5, 1.0, 2.0, 3.0])
                .unwrap();
        let bounded = change_only_bounding_points(&samples, secs(0), secs(20));

        assert_eq!(
            pairs(&bounded),
            vec![
                (secs(0), Value::from(0.5)),
                (secs(5), Value::from(1.0)),
                (secs(15), Value::from(2.0)),
                (secs(20), Value::from(2.0)),
            ]
        );
    }

    #[test]
    fn test_bounding_points_real_sample_on_bounds() {
        let samples = Samples::numeric(vec![secs(0), secs(10), secs(20)], vec![1.0, 2.0, 3.0]).unwrap();
        let bounded = change_only_bounding_points(&samples, secs(0), secs(20));
        assert_eq!(bounded, samples);
    }

    #[test]
    fn test_bounding_points_nothing_inside() {
        let samples = Samples::numeric(vec![secs(-5)], vec![4.0]).unwrap();
        let bounded = change_only_bounding_points(&samples, secs(0), secs(20));
        assert_eq!(
            pairs(&bounded),
            vec![(secs(0), Value::from(4.0)), (secs(20), Value::from(4.0))]
        );
    }

    #[test]
    fn test_bounding_points_text() {
        let samples = Samples::text(vec![secs(5)], vec!["ON".to_string()]).unwrap();
        let bounded = change_only_bounding_points(&samples, secs(0), secs(10));
        assert_eq!(
            pairs(&bounded),
            vec![
                (secs(0), Value::from("")),
                (secs(5), Value::from("ON")),
                (secs(10), Value::from("ON")),
            ]
        );
    }

    #[test]
    fn test_add_points_step_shape() {
        let m = numeric(
            "IMIR_HK_ICE_SEC_VOLT4",
            &[(0, 1.0), (10, 2.0), (20, 3.0)],
            Some(Encoding::ChangeOnly),
            Blocks::Unknown,
        );
        let expanded = m.change_only_add_points();
        let us = Duration::microseconds(1);

        assert_eq!(
            pairs(expanded.samples()),
            vec![
                (secs(0), Value::from(1.0)),
                (secs(10) - us, Value::from(1.0)),
                (secs(10), Value::from(2.0)),
                (secs(20) - us, Value::from(2.0)),
                (secs(20), Value::from(3.0)),
            ]
        );
    }

    #[test]
    fn test_add_points_skips_adjacent_samples() {
        let us = Duration::microseconds(1);
        let samples = Samples::numeric(vec![secs(0), secs(0) + us], vec![1.0, 2.0]).unwrap();
        let m = Mnemonic::new("X", secs(0), secs(1), samples, None, None, Blocks::Unknown);

        let expanded = m.change_only_add_points();
        assert_eq!(expanded.len(), 2);
    }

    #[test]
    fn test_add_points_remaps_blocks() {
        let m = numeric(
            "IMIR_HK_ICE_SEC_VOLT4",
            &[(0, 1.0), (10, 2.0), (20, 3.0), (30, 4.0)],
            Some(Encoding::ChangeOnly),
            Blocks::Known(vec![0, 2, 4]),
        );
        let expanded = m.change_only_add_points();

        assert_eq!(expanded.len(), 7);
        assert_eq!(expanded.blocks(), &Blocks::Known(vec![0, 4, 7]));
        assert_eq!(expanded.dates()[4], secs(20));
    }

    #[test]
    fn test_add_points_empty() {
        let m = numeric("X", &[], Some(Encoding::ChangeOnly), Blocks::Unknown);
        assert!(m.change_only_add_points().is_empty());
    }
}
