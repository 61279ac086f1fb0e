//! Reference-dataset loading: the geographic hierarchy, the expected table
//! universe and the registered political parties, read once at startup.

use std::fs;

use log::info;
use snafu::prelude::*;

use ballot_tally::{MemoryReferenceStore, ReferenceData};

use crate::ingest::IngestResult;

pub fn load_reference_store(path: &str) -> IngestResult<MemoryReferenceStore> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => whatever!("Error opening reference dataset {}: {}", path, e),
    };
    let data: ReferenceData = match serde_json::from_str(&contents) {
        Ok(d) => d,
        Err(e) => whatever!("Error parsing reference dataset {}: {}", path, e),
    };
    info!(
        "Loaded reference dataset: {} locations, {} tables, {} parties",
        data.electoral_locations.len(),
        data.electoral_tables.len(),
        data.political_parties.len()
    );
    Ok(MemoryReferenceStore::new(data))
}
