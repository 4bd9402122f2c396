//! Process-wide cache of the mnemonic inventory.
//!
//! The inventory is large (~15k rows) and changes rarely, so one fetch is
//! reused until the time-to-live runs out or the cache is invalidated.

use super::{EngdbService, InventoryEntry};
use crate::error::EngdbResult;
use crate::EngdbConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct MnemonicInventory {
    entries: Vec<InventoryEntry>,
    names: HashSet<String>,
    fetched_at: Instant,
}

impl MnemonicInventory {
    pub fn new(entries: Vec<InventoryEntry>) -> Self {
        let names = entries.iter().map(|e| e.tlm_mnemonic.clone()).collect();
        Self {
            entries,
            names,
            fetched_at: Instant::now(),
        }
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.names.contains(mnemonic)
    }

    /// Entries whose name contains `pattern`, ignoring case.
    pub fn matching(&self, pattern: &str) -> Vec<&InventoryEntry> {
        let pattern = pattern.to_uppercase();
        self.entries
            .iter()
            .filter(|e| e.tlm_mnemonic.to_uppercase().contains(&pattern))
            .collect()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

pub struct InventoryCache {
    ttl: Duration,
    cached: RwLock<Option<Arc<MnemonicInventory>>>,
}

impl InventoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn from_config(config: &EngdbConfig) -> Self {
        Self::new(Duration::from_secs(config.inventory_ttl_seconds))
    }

    /// Cached inventory, fetched from `service` when absent or expired.
    pub async fn get<S: EngdbService + ?Sized>(&self, service: &S) -> EngdbResult<Arc<MnemonicInventory>> {
        {
            let cached = self.cached.read().await;
            if let Some(inventory) = cached.as_ref() {
                if !inventory.is_expired(self.ttl) {
                    debug!("Inventory served from cache ({} entries)", inventory.len());
                    return Ok(Arc::clone(inventory));
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(inventory) = cached.as_ref() {
            if !inventory.is_expired(self.ttl) {
                return Ok(Arc::clone(inventory));
            }
        }

        let inventory = Arc::new(MnemonicInventory::new(service.fetch_inventory().await?));
        info!("Refreshed mnemonic inventory: {} entries", inventory.len());
        *cached = Some(Arc::clone(&inventory));
        Ok(inventory)
    }

    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        if cached.take().is_some() {
            debug!("Mnemonic inventory invalidated");
        }
    }

    pub async fn is_valid_mnemonic<S: EngdbService + ?Sized>(
        &self,
        service: &S,
        mnemonic: &str,
    ) -> EngdbResult<bool> {
        Ok(self.get(service).await?.contains(mnemonic))
    }
}
