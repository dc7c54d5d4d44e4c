//! Seed import from a legacy identity export
//!
//! The export is a JSON object whose values each carry `brown_id`,
//! `short_id` and `email`. Object keys are ignored.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use rabdap_common::identity::rabid_for;
use rabdap_common::{CacheEntry, Error, History, Result};
use serde::Deserialize;
use tracing::warn;

/// One value of the export object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct SeedRecord {
    pub brown_id: String,
    pub short_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl SeedRecord {
    fn into_entry(self, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            rabid: rabid_for(&self.short_id),
            bruid: self.brown_id,
            shortid: self.short_id,
            uuid: None,
            name: None,
            email: self.email,
            created: now,
            updated: now,
            historical: History::new(),
        }
    }
}

/// Parse an export into cache entries stamped with `now`
///
/// Identical records collapse to one. Records that still share a bruid
/// after that are dropped after the first, with a warning.
pub fn parse_seed_export(content: &str, now: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
    let export: BTreeMap<String, SeedRecord> = serde_json::from_str(content)
        .map_err(|e| Error::InvalidInput(format!("Malformed seed export: {}", e)))?;

    let unique: BTreeSet<SeedRecord> = export.into_values().collect();

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(unique.len());
    for record in unique {
        if !seen.insert(record.brown_id.clone()) {
            warn!(bruid = %record.brown_id, "Conflicting seed records for bruid, keeping first");
            continue;
        }
        entries.push(record.into_entry(now));
    }

    Ok(entries)
}

/// Read and parse a seed export file
pub fn read_seed_file(path: &Path, now: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_seed_export(&content, now)
}
