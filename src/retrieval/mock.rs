use super::{EngdbService, InventoryEntry};
use crate::error::{EngdbError, EngdbResult};
use crate::mnemonic::{Descriptor, Encoding, QueryMeta, Samples};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

struct MockSeries {
    meta: QueryMeta,
    samples: Samples,
    descriptor: Option<Descriptor>,
}

// In-memory telemetry archive for tests and demos
#[derive(Default)]
pub struct MockEngdbService {
    series: HashMap<String, MockSeries>,
    inventory: Vec<InventoryEntry>,
    inventory_fetches: AtomicUsize,
}

impl MockEngdbService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        mnemonic: &str,
        encoding: Encoding,
        samples: Samples,
        descriptor: Option<Descriptor>,
    ) {
        self.series.insert(
            mnemonic.to_string(),
            MockSeries {
                meta: QueryMeta::new(encoding),
                samples,
                descriptor,
            },
        );
    }

    pub fn set_inventory(&mut self, entries: Vec<InventoryEntry>) {
        self.inventory = entries;
    }

    pub fn inventory_fetches(&self) -> usize {
        self.inventory_fetches.load(Ordering::SeqCst)
    }

    fn lookup(&self, mnemonic: &str) -> EngdbResult<&MockSeries> {
        self.series.get(mnemonic).ok_or_else(|| EngdbError::Retrieval {
            status: "ERROR".to_string(),
            message: format!("Unknown mnemonic: {}", mnemonic),
        })
    }
}

#[async_trait]
impl EngdbService for MockEngdbService {
    async fn fetch_meta(&self, mnemonic: &str) -> EngdbResult<QueryMeta> {
        Ok(self.lookup(mnemonic)?.meta.clone())
    }

    async fn fetch_samples(
        &self,
        mnemonic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_bracket_values: bool,
    ) -> EngdbResult<Samples> {
        let samples = &self.lookup(mnemonic)?.samples;
        let dates = samples.dates();

        let mut lo = dates.partition_point(|d| *d < start);
        let mut hi = dates.partition_point(|d| *d <= end);
        if include_bracket_values {
            lo = lo.saturating_sub(1);
            hi = (hi + 1).min(dates.len());
        }

        let indices: Vec<usize> = (lo..hi.max(lo)).collect();
        Samples::new(
            indices.iter().map(|&i| dates[i]).collect(),
            samples.values().select(&indices),
        )
    }

    async fn fetch_descriptor(&self, mnemonic: &str) -> EngdbResult<Descriptor> {
        self.lookup(mnemonic)?
            .descriptor
            .clone()
            .ok_or_else(|| EngdbError::Retrieval {
                status: "COMPLETE".to_string(),
                message: format!("no dictionary entry for {}", mnemonic),
            })
    }

    async fn fetch_inventory(&self) -> EngdbResult<Vec<InventoryEntry>> {
        self.inventory_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.inventory.clone())
    }
}
