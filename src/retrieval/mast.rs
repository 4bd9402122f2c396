//! HTTP client for the MAST portal and the engineering database behind it.

use super::{EngdbService, InventoryEntry};
use crate::error::{EngdbError, EngdbResult};
use crate::mnemonic::{Descriptor, Encoding, QueryMeta, Samples, Value, Values};
use crate::time::parse_obstime;
use crate::EngdbConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use std::time::Duration;
use tracing::{debug, info};

pub const MNEMONIC_SERVICE: &str = "Mast.JwstEdb.Mnemonics";
pub const DICTIONARY_SERVICE: &str = "Mast.JwstEdb.Dictionary";

const INVOKE_PATH: &str = "api/v0/invoke";
const ENGDB_PATH: &str = "edp/api/v0.1";
const ENGDB_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const PAGE_SIZE: u64 = 100_000;

/// Decoded portal response: the `data` rows plus every other top-level key.
#[derive(Debug, Clone)]
pub struct ServiceResult {
    pub data: Vec<serde_json::Value>,
    pub meta: Map<String, serde_json::Value>,
}

/// Check a portal response for completion and split it into data and meta.
pub fn process_service_result(json: serde_json::Value) -> EngdbResult<ServiceResult> {
    let serde_json::Value::Object(mut fields) = json else {
        return Err(EngdbError::Retrieval {
            status: "UNKNOWN".to_string(),
            message: "response is not a JSON object".to_string(),
        });
    };

    let status = fields.get("status").and_then(|s| s.as_str()).unwrap_or("UNKNOWN");
    if status != "COMPLETE" {
        return Err(EngdbError::Retrieval {
            status: status.to_string(),
            message: fields
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
        });
    }

    let data = match fields.remove("data") {
        Some(serde_json::Value::Array(rows)) => rows,
        _ => Vec::new(),
    };
    Ok(ServiceResult { data, meta: fields })
}

/// Read the encoding out of a `TlmMnemonics` metadata record.
pub fn parse_meta(mnemonic: &str, json: &serde_json::Value) -> EngdbResult<QueryMeta> {
    let record = json
        .get("TlmMnemonics")
        .and_then(|r| r.get(0))
        .and_then(|r| r.as_object())
        .ok_or_else(|| EngdbError::Retrieval {
            status: "COMPLETE".to_string(),
            message: format!("no metadata returned for {}", mnemonic),
        })?;

    let flag = record
        .get("AllPoints")
        .and_then(|f| f.as_i64().or_else(|| f.as_bool().map(i64::from)))
        .ok_or_else(|| EngdbError::validation(format!("{}: metadata lacks AllPoints", mnemonic)))?;

    let mut provenance = record.clone();
    provenance.remove("AllPoints");

    Ok(QueryMeta {
        encoding: Encoding::from_all_points_flag(flag),
        provenance,
    })
}

/// Turn a `Data` listing of `ObsTime`/`EUValue` rows into samples.
pub fn parse_samples(json: &serde_json::Value) -> EngdbResult<Samples> {
    let rows: &[serde_json::Value] = match json.get("Data") {
        Some(serde_json::Value::Array(rows)) => rows.as_slice(),
        Some(serde_json::Value::Null) | None => &[],
        Some(_) => return Err(EngdbError::validation("Data field is not a list")),
    };

    let mut dates = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let obstime = row
            .get("ObsTime")
            .and_then(|t| t.as_str())
            .ok_or_else(|| EngdbError::validation("sample without ObsTime"))?;
        dates.push(parse_obstime(obstime)?);

        values.push(match row.get("EUValue") {
            Some(serde_json::Value::Number(n)) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Some(serde_json::Value::String(s)) => Value::Text(s.clone()),
            Some(serde_json::Value::Bool(b)) => Value::Number(if *b { 1.0 } else { 0.0 }),
            _ => Value::Number(f64::NAN),
        });
    }

    let values = match Values::from_values(values) {
        Ok(values) => values,
        // Mixed columns are text with numbers spelled out
        Err(_) => Values::Text(
            rows.iter()
                .map(|row| match row.get("EUValue") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect(),
        ),
    };

    Samples::new(dates, values)
}

pub struct MastClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl MastClient {
    pub fn new(config: &EngdbConfig) -> EngdbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {}", token)),
            None => request,
        }
    }

    async fn read_json(response: reqwest::Response) -> EngdbResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EngdbError::Retrieval {
                status: status.to_string(),
                message,
            });
        }
        Ok(response.json::<serde_json::Value>().await?)
    }

    /// Invoke a named portal service.
    pub async fn service_request(
        &self,
        service: &str,
        params: serde_json::Value,
    ) -> EngdbResult<ServiceResult> {
        let url = format!("{}/{}", self.base_url, INVOKE_PATH);
        let request = json!({
            "service": service,
            "params": params,
            "format": "json",
            "pagesize": PAGE_SIZE,
            "page": 1,
            "removenullcolumns": false,
        });
        debug!("Invoking {} at {}", service, url);

        let response = self
            .authorize(self.client.post(&url))
            .form(&[("request", request.to_string())])
            .send()
            .await?;

        process_service_result(Self::read_json(response).await?)
    }

    async fn engdb_get(&self, path: &str, query: &[(&str, String)]) -> EngdbResult<serde_json::Value> {
        let url = format!("{}/{}/{}", self.base_url, ENGDB_PATH, path);
        debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .query(query)
            .send()
            .await?;

        Self::read_json(response).await
    }
}

#[async_trait]
impl EngdbService for MastClient {
    async fn fetch_meta(&self, mnemonic: &str) -> EngdbResult<QueryMeta> {
        let json = self
            .engdb_get(&format!("MetaData/TlmMnemonics/{}", mnemonic), &[])
            .await?;
        parse_meta(mnemonic, &json)
    }

    async fn fetch_samples(
        &self,
        mnemonic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_bracket_values: bool,
    ) -> EngdbResult<Samples> {
        let endpoint = if include_bracket_values { "BracketData" } else { "Data" };
        let query = [
            ("sTime", start.format(ENGDB_TIME_FORMAT).to_string()),
            ("eTime", end.format(ENGDB_TIME_FORMAT).to_string()),
        ];

        let json = self.engdb_get(&format!("{}/{}", endpoint, mnemonic), &query).await?;
        let samples = parse_samples(&json)?;
        debug!("{}: {} samples from {}", mnemonic, samples.len(), endpoint);
        Ok(samples)
    }

    async fn fetch_descriptor(&self, mnemonic: &str) -> EngdbResult<Descriptor> {
        let result = self
            .service_request(DICTIONARY_SERVICE, json!({ "mnemonic": mnemonic }))
            .await?;

        let first = result.data.into_iter().next().ok_or_else(|| EngdbError::Retrieval {
            status: "COMPLETE".to_string(),
            message: format!("no dictionary entry for {}", mnemonic),
        })?;
        Ok(serde_json::from_value(first)?)
    }

    async fn fetch_inventory(&self) -> EngdbResult<Vec<InventoryEntry>> {
        let result = self.service_request(MNEMONIC_SERVICE, json!({})).await?;
        info!("Fetched inventory of {} mnemonics", result.data.len());

        result
            .data
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(EngdbError::from))
            .collect()
    }
}
