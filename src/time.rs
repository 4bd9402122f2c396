//! Time helpers shared by the mnemonic container, the statistics windows and
//! the monitor records.

use crate::error::{EngdbError, EngdbResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// MJD of 1970-01-01T00:00:00Z.
pub const UNIX_EPOCH_MJD: f64 = 40587.0;

const MICROS_PER_SECOND: f64 = 1.0e6;
const MICROS_PER_DAY: f64 = 86_400.0 * MICROS_PER_SECOND;

/// Format used for archive query parameters and table export.
pub const TABLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Seconds elapsed from `epoch` to `time`, negative when `time` is earlier.
pub fn offset_seconds(time: DateTime<Utc>, epoch: DateTime<Utc>) -> f64 {
    let delta = time.signed_duration_since(epoch);
    match delta.num_microseconds() {
        Some(us) => us as f64 / MICROS_PER_SECOND,
        // Beyond ~292k years; millisecond precision is plenty there
        None => delta.num_milliseconds() as f64 / 1.0e3,
    }
}

/// Inverse of [`offset_seconds`], rounded to the nearest microsecond.
pub fn add_offset(seconds: f64, epoch: DateTime<Utc>) -> DateTime<Utc> {
    epoch + Duration::microseconds((seconds * MICROS_PER_SECOND).round() as i64)
}

pub fn midpoint(start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
    start + (end - start) / 2
}

/// Midpoint between the first and last entries of a time-ordered slice.
pub fn median_time(times: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
    match (times.first(), times.last()) {
        (Some(&first), Some(&last)) => Some(midpoint(first, last)),
        _ => None,
    }
}

pub fn mjd_to_datetime(mjd: f64) -> EngdbResult<DateTime<Utc>> {
    let micros = ((mjd - UNIX_EPOCH_MJD) * MICROS_PER_DAY).round();
    if !micros.is_finite() {
        return Err(EngdbError::validation(format!("MJD {} is not a finite date", mjd)));
    }
    DateTime::from_timestamp_micros(micros as i64)
        .ok_or_else(|| EngdbError::validation(format!("MJD {} is out of range", mjd)))
}

pub fn datetime_to_mjd(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / MICROS_PER_DAY + UNIX_EPOCH_MJD
}

/// Parse a timestamp as returned by the archive.
///
/// Accepts `YYYY-MM-DD HH:MM:SS.ffffff` (also with a `T` separator), RFC 3339,
/// and the `/Date(<unix ms>)/` form used by the engineering database service.
pub fn parse_obstime(text: &str) -> EngdbResult<DateTime<Utc>> {
    let text = text.trim();

    if let Some(inner) = text.strip_prefix("/Date(").and_then(|s| s.strip_suffix(")/")) {
        // Trailing timezone offsets ("+0000") are always UTC here
        let millis: String = inner
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
            .map(|(_, c)| c)
            .collect();
        let millis: i64 = millis
            .parse()
            .map_err(|_| EngdbError::validation(format!("Malformed archive date: {}", text)))?;
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| EngdbError::validation(format!("Archive date out of range: {}", text)));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    let parsed = DateTime::parse_from_rfc3339(text)?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn format_obstime(time: DateTime<Utc>) -> String {
    time.format(TABLE_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    #[test]
    fn test_offset_roundtrip() {
        let epoch = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        let later = epoch + Duration::milliseconds(2500);

        let offset = offset_seconds(later, epoch);
        assert_abs_diff_eq!(offset, 2.5, epsilon = 1e-9);
        assert_eq!(add_offset(offset, epoch), later);
        assert_abs_diff_eq!(offset_seconds(epoch, later), -2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_midpoint_and_median_time() {
        let start = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 3, 2, 0, 0, 0).unwrap();
        let mid = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(midpoint(start, end), mid);
        assert_eq!(median_time(&[start, mid, end]), Some(mid));
        assert_eq!(median_time(&[]), None);
    }

    #[test]
    fn test_mjd_conversion() {
        let cv3 = mjd_to_datetime(57357.0).unwrap();
        assert_eq!(cv3, Utc.with_ymd_and_hms(2015, 12, 1, 0, 0, 0).unwrap());
        assert_abs_diff_eq!(datetime_to_mjd(cv3), 57357.0, epsilon = 1e-9);

        let noon = mjd_to_datetime(59000.5).unwrap();
        assert_eq!(noon, Utc.with_ymd_and_hms(2020, 5, 31, 12, 0, 0).unwrap());

        assert!(mjd_to_datetime(f64::NAN).is_err());
    }

    #[test]
    fn test_parse_obstime_formats() {
        let expected = Utc.with_ymd_and_hms(2022, 2, 10, 3, 4, 5).unwrap() + Duration::microseconds(250_000);

        assert_eq!(parse_obstime("2022-02-10 03:04:05.250000").unwrap(), expected);
        assert_eq!(parse_obstime("2022-02-10T03:04:05.25").unwrap(), expected);
        assert_eq!(parse_obstime("2022-02-10T03:04:05.25Z").unwrap(), expected);

        let millis = expected.timestamp_millis();
        assert_eq!(parse_obstime(&format!("/Date({}+0000)/", millis)).unwrap(), expected);

        assert!(parse_obstime("yesterday").is_err());
    }

    #[test]
    fn test_format_obstime() {
        let time = Utc.with_ymd_and_hms(2022, 2, 10, 3, 4, 5).unwrap();
        assert_eq!(format_obstime(time), "2022-02-10T03:04:05.000000");
        assert_eq!(parse_obstime(&format_obstime(time)).unwrap(), time);
    }
}
