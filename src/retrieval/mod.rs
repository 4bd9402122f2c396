pub mod inventory;
pub mod mast;
pub mod mock;

use crate::error::{EngdbError, EngdbResult};
use crate::mnemonic::{change_only_bounding_points, Blocks, Descriptor, Encoding, Mnemonic, QueryMeta, Samples};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

pub use inventory::{InventoryCache, MnemonicInventory};
pub use mast::MastClient;
pub use mock::MockEngdbService;

/// One row of the archive's mnemonic inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub tlm_mnemonic: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub tlm_identifier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub subsystem: Option<String>,
}

impl InventoryEntry {
    pub fn new(tlm_mnemonic: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tlm_mnemonic: tlm_mnemonic.into(),
            tlm_identifier: String::new(),
            description: description.into(),
            unit: None,
            subsystem: None,
        }
    }
}

// Identifiers come back as numbers; keep them as strings like everything else
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Source of engineering telemetry.
#[async_trait]
pub trait EngdbService: Send + Sync {
    async fn fetch_meta(&self, mnemonic: &str) -> EngdbResult<QueryMeta>;

    /// Samples in `[start, end]`. With `include_bracket_values`, the last
    /// sample before `start` and the first after `end` are included too.
    async fn fetch_samples(
        &self,
        mnemonic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_bracket_values: bool,
    ) -> EngdbResult<Samples>;

    async fn fetch_descriptor(&self, mnemonic: &str) -> EngdbResult<Descriptor>;

    async fn fetch_inventory(&self) -> EngdbResult<Vec<InventoryEntry>>;
}

/// Retrieve one mnemonic over `[start, end]`.
///
/// Change-only data is fetched with bracketing values, pinned at both ends
/// of the range and expanded into step form. With no value in effect the
/// pinned ends carry the missing marker (NaN for numeric data). A missing descriptor is
/// logged and tolerated.
pub async fn get_mnemonic<S: EngdbService + ?Sized>(
    service: &S,
    mnemonic: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> EngdbResult<Mnemonic> {
    let request_id = uuid::Uuid::new_v4().to_string();
    info!(
        "Retrieving {} from {} to {} ({})",
        mnemonic, start, end, request_id
    );

    let meta = service.fetch_meta(mnemonic).await?;
    let change_only = meta.encoding == Encoding::ChangeOnly;
    debug!("{} encoding: {:?}", mnemonic, meta.encoding);

    let mut samples = service.fetch_samples(mnemonic, start, end, change_only).await?;
    if samples.is_empty() {
        warn!("No data for {} between {} and {} ({})", mnemonic, start, end, request_id);
    }
    if change_only {
        samples = change_only_bounding_points(&samples, start, end);
    }

    let descriptor = match service.fetch_descriptor(mnemonic).await {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!("No descriptor for {}: {} ({})", mnemonic, e, request_id);
            None
        }
    };

    let result = Mnemonic::new(
        mnemonic,
        start,
        end,
        samples,
        Some(meta),
        descriptor,
        Blocks::Unknown,
    );

    if change_only {
        return Ok(result.change_only_add_points());
    }
    Ok(result)
}

/// Retrieve several mnemonics over the same range, in request order.
pub async fn get_mnemonics<S: EngdbService + ?Sized>(
    service: &S,
    mnemonics: &[&str],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> EngdbResult<Vec<Mnemonic>> {
    if mnemonics.is_empty() {
        return Err(EngdbError::validation("No mnemonics requested"));
    }

    let mut results = Vec::with_capacity(mnemonics.len());
    for mnemonic in mnemonics {
        results.push(get_mnemonic(service, mnemonic, start, end).await?);
    }
    Ok(results)
}
