pub mod cosmic_ray;
pub mod error;
pub mod filename;
pub mod mnemonic;
pub mod retrieval;
pub mod stats;
pub mod storage;
pub mod time;
pub mod units;

pub use error::{EngdbError, EngdbResult};
pub use mnemonic::{Blocks, Descriptor, Encoding, Mnemonic, QueryMeta, Samples, Value, Values};
pub use retrieval::{get_mnemonic, get_mnemonics, EngdbService};
pub use stats::window::WindowStats;

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct EngdbConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
    pub default_sigma: f64,
    pub inventory_ttl_seconds: u64,
    pub output_dir: String,
}

impl Default for EngdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mast.stsci.edu".to_string(),
            api_token: None,
            request_timeout_seconds: 30,
            default_sigma: stats::DEFAULT_SIGMA,
            inventory_ttl_seconds: 86400, // 1 day
            output_dir: "./engdb_output".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    api_token: Option<String>,
    request_timeout_seconds: Option<u64>,
    default_sigma: Option<f64>,
    inventory_ttl_seconds: Option<u64>,
    output_dir: Option<String>,
}

impl EngdbConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("ENGDB_BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(token) = std::env::var("MAST_API_TOKEN") {
            if !token.trim().is_empty() {
                config.api_token = Some(token);
            }
        }

        if let Ok(timeout_str) = std::env::var("ENGDB_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = timeout_str.parse().unwrap_or(30);
        }

        if let Ok(sigma_str) = std::env::var("ENGDB_SIGMA") {
            config.default_sigma = sigma_str.parse().unwrap_or(stats::DEFAULT_SIGMA);
        }

        if let Ok(ttl_str) = std::env::var("ENGDB_INVENTORY_TTL") {
            config.inventory_ttl_seconds = ttl_str.parse().unwrap_or(86400);
        }

        if let Ok(output_dir) = std::env::var("ENGDB_OUTPUT_DIR") {
            config.output_dir = output_dir;
        }

        config
    }

    /// Load settings from a JSON file. Keys left out keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngdbResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        let file: ConfigFile = serde_json::from_slice(&data)?;
        let defaults = Self::default();

        Ok(Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            api_token: file.api_token.or(defaults.api_token),
            request_timeout_seconds: file
                .request_timeout_seconds
                .unwrap_or(defaults.request_timeout_seconds),
            default_sigma: file.default_sigma.unwrap_or(defaults.default_sigma),
            inventory_ttl_seconds: file
                .inventory_ttl_seconds
                .unwrap_or(defaults.inventory_ttl_seconds),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
        })
    }
}
