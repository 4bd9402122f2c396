//! Cosmic-ray statistics from detector pipeline output.
//!
//! The pipeline flags jumps in the per-group data-quality cube; this module
//! only reads those flags and measures each jump against the group before it.

use crate::error::{EngdbError, EngdbResult};
use crate::time::mjd_to_datetime;
use chrono::{DateTime, Utc};
use ndarray::{ArrayView3, ArrayView4};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Data-quality bit set by the pipeline's jump step.
pub const JUMP_DET: u32 = 4;

/// Pixel and group of a flagged jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JumpLocation {
    pub integration: usize,
    pub group: usize,
    pub y: usize,
    pub x: usize,
}

impl JumpLocation {
    /// Same pixel one group earlier; `None` for the first group.
    pub fn group_before(&self) -> Option<JumpLocation> {
        self.group.checked_sub(1).map(|group| JumpLocation { group, ..*self })
    }
}

/// Every pixel whose data-quality word carries [`JUMP_DET`]. The cube is
/// indexed `(integration, group, y, x)`.
pub fn jump_locations(dq: ArrayView4<u32>) -> Vec<JumpLocation> {
    dq.indexed_iter()
        .filter(|(_, flags)| **flags & JUMP_DET != 0)
        .map(|((integration, group, y, x), _)| JumpLocation {
            integration,
            group,
            y,
            x,
        })
        .collect()
}

pub fn group_before(locations: &[JumpLocation]) -> Vec<Option<JumpLocation>> {
    locations.iter().map(JumpLocation::group_before).collect()
}

/// Jump size with the expected signal accumulation removed:
/// `data[jump] - data[before] - rate * group_time`. The rate cube is
/// `(integration, y, x)`; a single rate image applies to every integration.
pub fn magnitude(
    location: &JumpLocation,
    data: ArrayView4<f32>,
    rate: ArrayView3<f32>,
    group_time: f64,
) -> Option<f64> {
    let before = location.group_before()?;
    let rate_int = if rate.shape()[0] == 1 { 0 } else { location.integration };

    let at = *data.get([location.integration, location.group, location.y, location.x])?;
    let prior = *data.get([before.integration, before.group, before.y, before.x])?;
    let pixel_rate = *rate.get([rate_int, location.y, location.x])?;

    Some(at as f64 - prior as f64 - pixel_rate as f64 * group_time)
}

/// Magnitudes of every jump that has a preceding group.
pub fn cr_magnitudes(
    locations: &[JumpLocation],
    data: ArrayView4<f32>,
    rate: ArrayView3<f32>,
    group_time: f64,
) -> Vec<f64> {
    locations
        .iter()
        .filter_map(|loc| magnitude(loc, data, rate, group_time))
        .collect()
}

/// Jumps per second.
pub fn cr_rate(jump_count: usize, time: f64) -> EngdbResult<f64> {
    if time.is_nan() || time <= 0.0 {
        return Err(EngdbError::validation(format!(
            "Cannot compute a jump rate over {} seconds",
            time
        )));
    }
    Ok(jump_count as f64 / time)
}

/// Header keywords needed from a jump file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    pub nints: usize,
    /// TGROUP, seconds
    pub group_time: f64,
    /// EFFEXPTM, seconds
    pub effective_exposure_time: f64,
    pub exp_start_mjd: f64,
    pub exp_end_mjd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmicRayEntry {
    pub entry_date: DateTime<Utc>,
    pub aperture: String,
    pub source_file: String,
    pub obs_start_time: DateTime<Utc>,
    pub obs_end_time: DateTime<Utc>,
    pub jump_count: usize,
    pub jump_rate: f64,
    pub magnitude: Vec<f64>,
}

/// Count and measure the jumps in one exposure.
pub fn analyze_exposure(
    aperture: &str,
    source_file: &str,
    header: &ExposureHeader,
    dq: ArrayView4<u32>,
    data: ArrayView4<f32>,
    rate: ArrayView3<f32>,
) -> EngdbResult<CosmicRayEntry> {
    if dq.shape() != data.shape() {
        return Err(EngdbError::validation(format!(
            "{}: data-quality shape {:?} does not match data shape {:?}",
            source_file,
            dq.shape(),
            data.shape()
        )));
    }

    let locations = jump_locations(dq);
    let magnitudes = cr_magnitudes(&locations, data, rate, header.group_time);
    if magnitudes.len() < locations.len() {
        debug!(
            "{}: {} jumps without a preceding group",
            source_file,
            locations.len() - magnitudes.len()
        );
    }

    let entry = CosmicRayEntry {
        entry_date: Utc::now(),
        aperture: aperture.to_string(),
        source_file: source_file.to_string(),
        obs_start_time: mjd_to_datetime(header.exp_start_mjd)?,
        obs_end_time: mjd_to_datetime(header.exp_end_mjd)?,
        jump_count: locations.len(),
        jump_rate: cr_rate(locations.len(), header.effective_exposure_time)?,
        magnitude: magnitudes,
    };

    info!(
        "{}: {} jumps in {} integration(s)",
        source_file, entry.jump_count, header.nints
    );
    Ok(entry)
}

/// Raw exposures are the only monitor inputs.
pub fn is_uncal(filename: &str) -> bool {
    filename.contains("uncal")
}

/// Working directory for one exposure: the first four `_` fields of its name.
pub fn observation_dir_name(filename: &str) -> EngdbResult<String> {
    let fields: Vec<&str> = filename.split('_').take(4).collect();
    if fields.len() < 4 {
        return Err(EngdbError::validation(format!(
            "{} has fewer than four '_'-separated fields",
            filename
        )));
    }
    Ok(fields.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, Array4};

    fn header() -> ExposureHeader {
        ExposureHeader {
            nints: 1,
            group_time: 2.0,
            effective_exposure_time: 10.0,
            exp_start_mjd: 59600.0,
            exp_end_mjd: 59600.5,
        }
    }

    #[test]
    fn test_jump_locations() {
        let mut dq = Array4::<u32>::zeros((1, 3, 2, 2));
        dq[[0, 1, 0, 1]] = JUMP_DET;
        dq[[0, 2, 1, 0]] = JUMP_DET | 1;
        dq[[0, 2, 1, 1]] = 2;

        let locations = jump_locations(dq.view());
        assert_eq!(
            locations,
            vec![
                JumpLocation { integration: 0, group: 1, y: 0, x: 1 },
                JumpLocation { integration: 0, group: 2, y: 1, x: 0 },
            ]
        );
        assert_eq!(
            group_before(&locations)[0],
            Some(JumpLocation { integration: 0, group: 0, y: 0, x: 1 })
        );
    }

    #[test]
    fn test_magnitude() {
        let mut data = Array4::<f32>::zeros((1, 2, 1, 1));
        data[[0, 0, 0, 0]] = 10.0;
        data[[0, 1, 0, 0]] = 115.0;
        let rate = Array3::<f32>::from_elem((1, 1, 1), 2.5);

        let jump = JumpLocation { integration: 0, group: 1, y: 0, x: 0 };
        let mag = magnitude(&jump, data.view(), rate.view(), 2.0).unwrap();
        assert_abs_diff_eq!(mag, 100.0);

        let first_group = JumpLocation { group: 0, ..jump };
        assert_eq!(magnitude(&first_group, data.view(), rate.view(), 2.0), None);
    }

    #[test]
    fn test_magnitude_per_integration_rate() {
        let mut data = Array4::<f32>::zeros((2, 2, 1, 1));
        data[[1, 1, 0, 0]] = 50.0;
        let mut rate = Array3::<f32>::zeros((2, 1, 1));
        rate[[1, 0, 0]] = 5.0;

        let jump = JumpLocation { integration: 1, group: 1, y: 0, x: 0 };
        let mag = magnitude(&jump, data.view(), rate.view(), 2.0).unwrap();
        assert_abs_diff_eq!(mag, 40.0);
    }

    #[test]
    fn test_cr_rate() {
        assert_abs_diff_eq!(cr_rate(5, 10.0).unwrap(), 0.5);
        assert!(cr_rate(5, 0.0).is_err());
        assert!(cr_rate(5, f64::NAN).is_err());
    }

    #[test]
    fn test_analyze_exposure() {
        let mut dq = Array4::<u32>::zeros((1, 3, 1, 2));
        dq[[0, 2, 0, 0]] = JUMP_DET;
        dq[[0, 0, 0, 1]] = JUMP_DET;
        let mut data = Array4::<f32>::zeros((1, 3, 1, 2));
        data[[0, 2, 0, 0]] = 30.0;
        let rate = Array3::<f32>::zeros((1, 1, 2));

        let entry = analyze_exposure(
            "MIRIM_FULL",
            "jw01234001001_01101_00001_mirimage_uncal.fits",
            &header(),
            dq.view(),
            data.view(),
            rate.view(),
        )
        .unwrap();

        assert_eq!(entry.jump_count, 2);
        assert_eq!(entry.magnitude, vec![30.0]);
        assert_abs_diff_eq!(entry.jump_rate, 0.2);
        assert_eq!(entry.obs_end_time - entry.obs_start_time, chrono::Duration::hours(12));
    }

    #[test]
    fn test_analyze_rejects_shape_mismatch() {
        let dq = Array4::<u32>::zeros((1, 3, 1, 2));
        let data = Array4::<f32>::zeros((1, 2, 1, 2));
        let rate = Array3::<f32>::zeros((1, 1, 2));

        assert!(analyze_exposure("A", "f", &header(), dq.view(), data.view(), rate.view()).is_err());
    }

    #[test]
    fn test_file_selection() {
        let name = "jw01234001001_01101_00001_mirimage_uncal.fits";
        assert!(is_uncal(name));
        assert!(!is_uncal("jw01234001001_01101_00001_mirimage_rate.fits"));
        assert_eq!(observation_dir_name(name).unwrap(), "jw01234001001_01101_00001_mirimage");
        assert!(observation_dir_name("short_name.fits").is_err());
    }
}
