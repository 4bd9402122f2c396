//! Exposure file naming convention:
//! `jw<PPPPP><OOO><VVV>_<GG><S><AA>_<EEEEE>_<detector>_<suffix>.fits`.

use crate::error::{EngdbError, EngdbResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

lazy_static! {
    static ref EXPOSURE_FILE: Regex = Regex::new(concat!(
        r"^[a-z]+(?P<program_id>\d{5})(?P<observation>\d{3})(?P<visit>\d{3})",
        r"_(?P<visit_group>\d{2})(?P<parallel_seq_id>\d{1})(?P<activity>\d{2})",
        r"_(?P<exposure_id>\d+)_(?P<detector>\w+)_(?P<suffix>\w+)",
    ))
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    pub program_id: String,
    pub observation: String,
    pub visit: String,
    pub visit_group: String,
    pub parallel_seq_id: String,
    pub activity: String,
    pub exposure_id: String,
    pub detector: String,
    pub suffix: String,
}

impl FileProperties {
    /// Root shared by every product of one exposure, e.g.
    /// `jw00327001001_02101_00001_nrca1`.
    pub fn rootname(&self) -> String {
        format!(
            "jw{}{}{}_{}{}{}_{}_{}",
            self.program_id,
            self.observation,
            self.visit,
            self.visit_group,
            self.parallel_seq_id,
            self.activity,
            self.exposure_id,
            self.detector
        )
    }
}

/// Parse the base name of an exposure file.
pub fn parse_filename<P: AsRef<Path>>(path: P) -> EngdbResult<FileProperties> {
    let name = path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let captures = EXPOSURE_FILE.captures(name).ok_or_else(|| {
        EngdbError::validation(format!(
            "Provided file {} does not follow JWST naming conventions \
             (jw<PPPPP><OOO><VVV>_<GGSAA>_<EEEEE>_<detector>_<suffix>.fits)",
            name
        ))
    })?;

    let field = |key: &str| captures[key].to_string();
    Ok(FileProperties {
        program_id: field("program_id"),
        observation: field("observation"),
        visit: field("visit"),
        visit_group: field("visit_group"),
        parallel_seq_id: field("parallel_seq_id"),
        activity: field("activity"),
        exposure_id: field("exposure_id"),
        detector: field("detector"),
        suffix: field("suffix"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uncal() {
        let props = parse_filename("jw00327001001_02101_00001_nrca1_uncal.fits").unwrap();

        assert_eq!(props.program_id, "00327");
        assert_eq!(props.observation, "001");
        assert_eq!(props.visit, "001");
        assert_eq!(props.visit_group, "02");
        assert_eq!(props.parallel_seq_id, "1");
        assert_eq!(props.activity, "01");
        assert_eq!(props.exposure_id, "00001");
        assert_eq!(props.detector, "nrca1");
        assert_eq!(props.suffix, "uncal");
        assert_eq!(props.rootname(), "jw00327001001_02101_00001_nrca1");
    }

    #[test]
    fn test_parse_with_directory() {
        let props = parse_filename("/data/jw00327/jw00327001001_02101_00001_mirimage_rate.fits").unwrap();
        assert_eq!(props.detector, "mirimage");
        assert_eq!(props.suffix, "rate");
    }

    #[test]
    fn test_rejects_other_names() {
        assert!(matches!(
            parse_filename("not_a_jwst_file.fits"),
            Err(EngdbError::Validation { .. })
        ));
        assert!(parse_filename("").is_err());
    }
}
