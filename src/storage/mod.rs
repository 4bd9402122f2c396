pub mod disk;

pub use disk::{QueryHistoryEntry, ResultStore, DEFAULT_SEARCH_START_MJD};
