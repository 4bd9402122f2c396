use crate::cosmic_ray::CosmicRayEntry;
use crate::error::{EngdbError, EngdbResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::{debug, info};

/// MJD of the earliest search: the start of instrument ground testing.
pub const DEFAULT_SEARCH_START_MJD: f64 = 57357.0;

const STATS_FILE: &str = "cosmic_ray_stats.json";
const HISTORY_FILE: &str = "query_history.json";

/// One monitor search over the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub instrument: String,
    pub aperture: String,
    pub start_time_mjd: f64,
    pub end_time_mjd: f64,
    pub files_found: usize,
    pub run_monitor: bool,
    pub entry_date: DateTime<Utc>,
}

/// Monitor results as JSON documents, one directory per instrument.
pub struct ResultStore {
    data_dir: PathBuf,
}

impl ResultStore {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> EngdbResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        if !data_dir.exists() {
            async_fs::create_dir_all(&data_dir).await?;
        }

        Ok(Self { data_dir })
    }

    pub async fn insert_stats(&self, instrument: &str, entry: CosmicRayEntry) -> EngdbResult<()> {
        let path = self.document_path(instrument, STATS_FILE)?;
        let mut entries: Vec<CosmicRayEntry> = Self::load_document(&path).await?;
        entries.push(entry);
        Self::save_document(&path, &entries).await?;

        info!("Stored cosmic ray stats for {} ({} entries)", instrument, entries.len());
        Ok(())
    }

    pub async fn load_stats(&self, instrument: &str, aperture: &str) -> EngdbResult<Vec<CosmicRayEntry>> {
        let path = self.document_path(instrument, STATS_FILE)?;
        let entries: Vec<CosmicRayEntry> = Self::load_document(&path).await?;

        Ok(entries.into_iter().filter(|e| e.aperture == aperture).collect())
    }

    pub async fn record_query(&self, entry: QueryHistoryEntry) -> EngdbResult<()> {
        let path = self.document_path(&entry.instrument, HISTORY_FILE)?;
        let mut history: Vec<QueryHistoryEntry> = Self::load_document(&path).await?;
        debug!(
            "Recording {} search {}..{} for {}",
            entry.instrument, entry.start_time_mjd, entry.end_time_mjd, entry.aperture
        );
        history.push(entry);
        Self::save_document(&path, &history).await
    }

    /// End of the latest search that ran the monitor for this aperture, or
    /// [`DEFAULT_SEARCH_START_MJD`] when there is none.
    pub async fn most_recent_search(&self, instrument: &str, aperture: &str) -> EngdbResult<f64> {
        let path = self.document_path(instrument, HISTORY_FILE)?;
        let history: Vec<QueryHistoryEntry> = Self::load_document(&path).await?;

        let latest = history
            .iter()
            .filter(|h| h.aperture == aperture && h.run_monitor)
            .map(|h| h.end_time_mjd)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

        match latest {
            Some(mjd) => Ok(mjd),
            None => {
                info!(
                    "No previous {} query history for {}. Beginning search date will be set to {}.",
                    instrument, aperture, DEFAULT_SEARCH_START_MJD
                );
                Ok(DEFAULT_SEARCH_START_MJD)
            }
        }
    }

    pub async fn get_instrument_list(&self) -> EngdbResult<Vec<String>> {
        let mut instruments = Vec::new();

        let mut dir_entries = async_fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    instruments.push(name.to_string());
                }
            }
        }

        instruments.sort();
        Ok(instruments)
    }

    fn document_path(&self, instrument: &str, file_name: &str) -> EngdbResult<PathBuf> {
        let valid = !instrument.is_empty()
            && instrument
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(EngdbError::Storage {
                message: format!("Invalid instrument name: {:?}", instrument),
            });
        }
        Ok(self.data_dir.join(instrument.to_lowercase()).join(file_name))
    }

    async fn load_document<T: DeserializeOwned>(path: &Path) -> EngdbResult<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = async_fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn save_document<T: Serialize>(path: &Path, rows: &[T]) -> EngdbResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                async_fs::create_dir_all(dir).await?;
            }
        }

        let serialized = serde_json::to_vec_pretty(rows)?;
        async_fs::write(path, serialized).await?;
        Ok(())
    }
}
