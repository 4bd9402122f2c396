pub mod change_only;
pub mod combine;
pub mod interpolate;

use crate::error::{EngdbError, EngdbResult};
use crate::stats::window::WindowStats;
use crate::stats::DEFAULT_SIGMA;
use crate::time::format_obstime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

pub use change_only::change_only_bounding_points;

/// How the archive stores a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Every physical sample is recorded.
    AllPoints,
    /// A sample is recorded only when the value changes; it holds until the next one.
    ChangeOnly,
}

impl Encoding {
    /// Decode the archive's `AllPoints` flag (nonzero means all points).
    pub fn from_all_points_flag(flag: i64) -> Self {
        if flag != 0 {
            Encoding::AllPoints
        } else {
            Encoding::ChangeOnly
        }
    }
}

/// Metadata returned alongside a query: the encoding plus whatever else the
/// archive reported about the mnemonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    pub encoding: Encoding,
    #[serde(default)]
    pub provenance: serde_json::Map<String, serde_json::Value>,
}

impl QueryMeta {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            provenance: serde_json::Map::new(),
        }
    }
}

/// Auxiliary description of a mnemonic, as served by the archive dictionary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub tlm_mnemonic: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub sql_data_type: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
}

/// A single value, either numeric or categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Number(_) => None,
            Value::Text(s) => Some(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A homogeneous column of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Default for Values {
    fn default() -> Self {
        Values::Numeric(Vec::new())
    }
}

impl Values {
    /// Build a column from loose values. All numbers give a numeric column,
    /// all strings a text column; a mix is rejected.
    pub fn from_values(values: Vec<Value>) -> EngdbResult<Self> {
        if values.iter().all(|v| matches!(v, Value::Number(_))) {
            return Ok(Values::Numeric(values.into_iter().filter_map(|v| v.as_f64()).collect()));
        }
        if values.iter().all(|v| matches!(v, Value::Text(_))) {
            return Ok(Values::Text(
                values
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Text(s) => Some(s),
                        Value::Number(_) => None,
                    })
                    .collect(),
            ));
        }
        Err(EngdbError::validation("Mixed numeric and text values in one mnemonic"))
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Numeric(v) => v.len(),
            Values::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Values::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Values::Numeric(v) => Some(v),
            Values::Text(_) => None,
        }
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        match self {
            Values::Numeric(v) => v.get(idx).map(|x| Value::Number(*x)),
            Values::Text(v) => v.get(idx).map(|s| Value::Text(s.clone())),
        }
    }

    /// Placeholder for "no value known": NaN for numbers, empty for text.
    pub fn missing(&self) -> Value {
        match self {
            Values::Numeric(_) => Value::Number(f64::NAN),
            Values::Text(_) => Value::Text(String::new()),
        }
    }

    pub fn empty_like(&self) -> Self {
        match self {
            Values::Numeric(_) => Values::Numeric(Vec::new()),
            Values::Text(_) => Values::Text(Vec::new()),
        }
    }

    /// Gather values by index; `None` entries become [`Values::missing`].
    /// Indices must be in range.
    pub fn select_or_missing(&self, sources: &[Option<usize>]) -> Self {
        match self {
            Values::Numeric(v) => {
                Values::Numeric(sources.iter().map(|s| s.map_or(f64::NAN, |i| v[i])).collect())
            }
            Values::Text(v) => Values::Text(
                sources
                    .iter()
                    .map(|s| s.map_or_else(String::new, |i| v[i].clone()))
                    .collect(),
            ),
        }
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        let sources: Vec<Option<usize>> = indices.iter().copied().map(Some).collect();
        self.select_or_missing(&sources)
    }

    pub fn concat(&self, other: &Values) -> EngdbResult<Self> {
        match (self, other) {
            (Values::Numeric(a), Values::Numeric(b)) => {
                Ok(Values::Numeric(a.iter().chain(b.iter()).copied().collect()))
            }
            (Values::Text(a), Values::Text(b)) => {
                Ok(Values::Text(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => Err(EngdbError::validation(
                "Cannot combine numeric and text telemetry values",
            )),
        }
    }
}

/// Time-ordered (timestamp, value) pairs stored as two parallel columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Samples {
    dates: Vec<DateTime<Utc>>,
    values: Values,
}

impl Samples {
    /// Pair up timestamps with values, sorting by time (stable) if needed.
    pub fn new(dates: Vec<DateTime<Utc>>, values: Values) -> EngdbResult<Self> {
        if dates.len() != values.len() {
            return Err(EngdbError::validation(format!(
                "Got {} timestamps but {} values",
                dates.len(),
                values.len()
            )));
        }

        if dates.windows(2).all(|w| w[0] <= w[1]) {
            return Ok(Self { dates, values });
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        Ok(Self {
            dates: order.iter().map(|&i| dates[i]).collect(),
            values: values.select(&order),
        })
    }

    pub fn numeric(dates: Vec<DateTime<Utc>>, values: Vec<f64>) -> EngdbResult<Self> {
        Self::new(dates, Values::Numeric(values))
    }

    pub fn text(dates: Vec<DateTime<Utc>>, values: Vec<String>) -> EngdbResult<Self> {
        Self::new(dates, Values::Text(values))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[DateTime<Utc>] {
        &self.dates
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, Value)> + '_ {
        self.dates
            .iter()
            .enumerate()
            .filter_map(move |(i, d)| self.values.get(i).map(|v| (*d, v)))
    }

    pub fn data_start(&self) -> Option<DateTime<Utc>> {
        self.dates.iter().min().copied()
    }

    pub fn data_end(&self) -> Option<DateTime<Utc>> {
        self.dates.iter().max().copied()
    }

    /// Same value type, no rows.
    pub fn cleared(&self) -> Self {
        Self {
            dates: Vec::new(),
            values: self.values.empty_like(),
        }
    }

    pub(crate) fn from_parts_unchecked(dates: Vec<DateTime<Utc>>, values: Values) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self { dates, values }
    }
}

/// Sample-index boundaries of independently analyzed runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Blocks {
    /// Boundaries not known; the whole series is one run.
    #[default]
    Unknown,
    /// Increasing start indices, optionally ending with the series length.
    Known(Vec<usize>),
}

impl Blocks {
    pub fn boundaries(&self) -> Option<&[usize]> {
        match self {
            Blocks::Unknown => None,
            Blocks::Known(b) => Some(b),
        }
    }

    /// Index ranges of each run for a series of `len` samples. The series
    /// length terminates the last run when it is not listed explicitly.
    /// Empty runs are skipped.
    pub fn windows(&self, len: usize) -> Vec<Range<usize>> {
        match self {
            Blocks::Unknown => {
                if len == 0 {
                    Vec::new()
                } else {
                    vec![0..len]
                }
            }
            Blocks::Known(bounds) => {
                let mut edges: Vec<usize> = bounds.iter().map(|&b| b.min(len)).collect();
                if edges.last().map_or(true, |&last| last < len) {
                    edges.push(len);
                }
                edges
                    .windows(2)
                    .filter(|w| w[0] < w[1])
                    .map(|w| w[0]..w[1])
                    .collect()
            }
        }
    }
}

/// One mnemonic's telemetry over a requested interval.
#[derive(Debug, Clone)]
pub struct Mnemonic {
    pub identifier: String,
    pub requested_start: DateTime<Utc>,
    pub requested_end: DateTime<Utc>,
    pub meta: Option<QueryMeta>,
    pub descriptor: Option<Descriptor>,
    samples: Samples,
    blocks: Blocks,
    pub(crate) stats: WindowStats,
}

impl Mnemonic {
    /// Build a mnemonic. With numeric samples and known encoding, whole-range
    /// statistics are computed immediately.
    pub fn new(
        identifier: impl Into<String>,
        requested_start: DateTime<Utc>,
        requested_end: DateTime<Utc>,
        samples: Samples,
        meta: Option<QueryMeta>,
        descriptor: Option<Descriptor>,
        blocks: Blocks,
    ) -> Self {
        let mut mnemonic = Self {
            identifier: identifier.into(),
            requested_start,
            requested_end,
            meta,
            descriptor,
            samples,
            blocks,
            stats: WindowStats::default(),
        };

        if let Some(encoding) = mnemonic.encoding() {
            if !mnemonic.samples.is_empty() && mnemonic.samples.values().is_numeric() {
                mnemonic.stats = mnemonic.compute_full_stats(encoding, DEFAULT_SIGMA);
            }
        }

        mnemonic
    }

    /// A copy with the same identity and metadata but no samples.
    pub fn emptied(&self) -> Self {
        Self::new(
            self.identifier.clone(),
            self.requested_start,
            self.requested_end,
            self.samples.cleared(),
            self.meta.clone(),
            self.descriptor.clone(),
            Blocks::Unknown,
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn dates(&self) -> &[DateTime<Utc>] {
        self.samples.dates()
    }

    pub fn values(&self) -> &Values {
        self.samples.values()
    }

    pub fn blocks(&self) -> &Blocks {
        &self.blocks
    }

    pub fn stats(&self) -> &WindowStats {
        &self.stats
    }

    pub fn data_start(&self) -> Option<DateTime<Utc>> {
        self.samples.data_start()
    }

    pub fn data_end(&self) -> Option<DateTime<Utc>> {
        self.samples.data_end()
    }

    pub fn encoding(&self) -> Option<Encoding> {
        self.meta.as_ref().map(|m| m.encoding)
    }

    pub(crate) fn require_encoding(&self) -> EngdbResult<Encoding> {
        self.encoding().ok_or_else(|| EngdbError::MissingEncoding {
            mnemonic: self.identifier.clone(),
        })
    }

    /// Supply an encoding for a mnemonic that arrived without metadata.
    /// Existing metadata is left untouched.
    pub fn assume_encoding(&mut self, encoding: Encoding) {
        if self.meta.is_none() {
            debug!("Assuming {:?} encoding for {}", encoding, self.identifier);
            self.meta = Some(QueryMeta::new(encoding));
        }
    }

    /// Unit label for plots, `"Unknown"` without a descriptor unit.
    pub fn display_unit(&self) -> String {
        self.descriptor
            .as_ref()
            .and_then(|d| d.unit.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn display_title(&self) -> String {
        match &self.descriptor {
            Some(d) if !d.description.is_empty() => {
                format!("{} - {}", self.identifier, d.description)
            }
            _ => self.identifier.clone(),
        }
    }

    /// Time range a plot of this mnemonic should cover.
    pub fn plot_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match (self.data_start(), self.data_end()) {
            (Some(start), Some(end)) => (start, end),
            _ => (self.requested_start, self.requested_end),
        }
    }

    /// Write the samples as a space-delimited `dates euvalues` table,
    /// overwriting any existing file.
    pub fn save_table<P: AsRef<Path>>(&self, path: P) -> EngdbResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .from_path(path.as_ref())?;

        writer.write_record(["dates", "euvalues"])?;
        for (date, value) in self.samples.iter() {
            writer.write_record([format_obstime(date), value.to_string()])?;
        }
        writer.flush()?;

        debug!("Saved {} rows of {} to {:?}", self.len(), self.identifier, path.as_ref());
        Ok(())
    }

    pub(crate) fn with_samples(&self, samples: Samples, blocks: Blocks) -> Self {
        Self::new(
            self.identifier.clone(),
            self.requested_start,
            self.requested_end,
            samples,
            self.meta.clone(),
            self.descriptor.clone(),
            blocks,
        )
    }
}

fn fmt_bound(bound: Option<DateTime<Utc>>) -> String {
    bound.map_or_else(|| "None".to_string(), |t| t.to_string())
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EdbMnemonic {} with {} records between {} and {}",
            self.identifier,
            self.len(),
            fmt_bound(self.data_start()),
            fmt_bound(self.data_end())
        )
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    #[test]
    fn test_construction_computes_full_stats() {
        let m = numeric(
            "SA_ZFGOUTFOV",
            &[(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0), (4, 5.0)],
            Some(Encoding::AllPoints),
            Blocks::Unknown,
        );

        assert_eq!(m.len(), 5);
        assert_eq!(m.data_start(), Some(secs(0)));
        assert_eq!(m.data_end(), Some(secs(4)));
        assert_eq!(m.stats().len(), 1);
        assert_abs_diff_eq!(m.stats().mean[0].as_f64().unwrap(), 3.0);
        assert_eq!(m.stats().median_times[0], secs(2));
    }

    #[test]
    fn test_missing_meta_skips_stats() {
        let m = numeric("IMIR_HK_ICE_SEC_VOLT4", &[(0, 1.0), (1, 2.0)], None, Blocks::Unknown);
        assert!(m.stats().is_empty());
        assert!(m.encoding().is_none());
    }

    #[test]
    fn test_empty_mnemonic() {
        let m = numeric("SA_ZFGOUTFOV", &[], Some(Encoding::AllPoints), Blocks::Unknown);
        assert!(m.is_empty());
        assert_eq!(m.data_start(), None);
        assert_eq!(
            m.to_string(),
            "EdbMnemonic SA_ZFGOUTFOV with 0 records between None and None"
        );
        assert_eq!(m.plot_range(), (m.requested_start, m.requested_end));
    }

    #[test]
    fn test_samples_sorted_on_construction() {
        let samples = Samples::numeric(vec![secs(2), secs(0), secs(1)], vec![3.0, 1.0, 2.0]).unwrap();
        assert_eq!(samples.dates(), &[secs(0), secs(1), secs(2)]);
        assert_eq!(samples.values().as_numeric().unwrap(), &[1.0, 2.0, 3.0]);

        assert!(Samples::numeric(vec![secs(0)], vec![]).is_err());
    }

    #[test]
    fn test_values_from_mixed_rejected() {
        let mixed = vec![Value::from(1.0), Value::from("ON")];
        assert!(Values::from_values(mixed).is_err());

        let text = Values::from_values(vec![Value::from("ON"), Value::from("OFF")]).unwrap();
        assert!(!text.is_numeric());
        assert_eq!(text.get(1), Some(Value::from("OFF")));
    }

    #[test]
    fn test_block_windows() {
        assert_eq!(Blocks::Unknown.windows(4), vec![0..4]);
        assert!(Blocks::Unknown.windows(0).is_empty());
        assert_eq!(Blocks::Known(vec![0, 2, 4]).windows(4), vec![0..2, 2..4]);
        // Series length closes the last run
        assert_eq!(Blocks::Known(vec![0, 3]).windows(5), vec![0..3, 3..5]);
        assert_eq!(Blocks::Known(vec![0, 0, 2]).windows(2), vec![0..2]);
    }

    #[test]
    fn test_display_helpers() {
        let mut m = numeric("SA_ZFGOUTFOV", &[(0, 1.0)], None, Blocks::Unknown);
        assert_eq!(m.display_unit(), "Unknown");
        assert_eq!(m.display_title(), "SA_ZFGOUTFOV");

        m.descriptor = Some(Descriptor {
            description: "Fine guidance output".to_string(),
            unit: Some("V".to_string()),
            ..Default::default()
        });
        assert_eq!(m.display_unit(), "V");
        assert_eq!(m.display_title(), "SA_ZFGOUTFOV - Fine guidance output");
    }

    #[test]
    fn test_summary_string() {
        let m = numeric("SA_ZFGOUTFOV", &[(0, 1.0), (60, 2.0)], None, Blocks::Unknown);
        assert_eq!(
            m.to_string(),
            format!("EdbMnemonic SA_ZFGOUTFOV with 2 records between {} and {}", secs(0), secs(60))
        );
    }

    #[test]
    fn test_save_table_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("table.txt");
        std::fs::write(&path, "stale contents\n").unwrap();

        let m = numeric("SA_ZFGOUTFOV", &[(0, 1.5), (1, 2.5)], None, Blocks::Unknown);
        m.save_table(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "dates euvalues");
        assert_eq!(lines[1], "2022-02-01T00:00:00.000000 1.5");
        assert_eq!(lines[2], "2022-02-01T00:00:01.000000 2.5");
    }

    #[test]
    fn test_assume_encoding() {
        let mut m = numeric("SA_ZFGOUTFOV", &[(0, 1.0)], None, Blocks::Unknown);
        m.assume_encoding(Encoding::ChangeOnly);
        assert_eq!(m.encoding(), Some(Encoding::ChangeOnly));

        m.assume_encoding(Encoding::AllPoints);
        assert_eq!(m.encoding(), Some(Encoding::ChangeOnly));
    }
}
