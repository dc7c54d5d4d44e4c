//! Cache lookup, create-on-miss, and batch refresh against the directory
//!
//! The batch refresh is not transactional: every entry is written back on
//! its own, and a failed write is recorded in the report while the rest of
//! the batch proceeds. Directory failures abort the whole batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rabdap_common::{time, CacheEntry, IdField, LookupView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::canonical::{cast_at, source_attribute};
use super::reconcile::merge;
use crate::db::{CacheStore, SelectionFilter};
use crate::directory::DirectoryClient;
use crate::error::{SyncError, SyncResult};

/// Result of refreshing one cached entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Updated,
    /// The directory returned nothing for the key; entry left untouched
    NotInDirectory,
    /// The directory returned the key but the record could not be used
    InvalidRecord,
    WriteFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    /// Rows modified by the write-back, 0 unless updated
    pub modified: u64,
    pub status: RefreshStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshOutcome {
    fn updated(modified: u64) -> Self {
        Self {
            modified,
            status: RefreshStatus::Updated,
            error: None,
        }
    }

    fn skipped(status: RefreshStatus) -> Self {
        Self {
            modified: 0,
            status,
            error: None,
        }
    }

    fn failed(error: &SyncError) -> Self {
        Self {
            modified: 0,
            status: RefreshStatus::WriteFailed,
            error: Some(error.to_string()),
        }
    }
}

/// Per-key outcome of a batch refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub key_field: IdField,
    pub outcomes: BTreeMap<String, RefreshOutcome>,
}

impl RefreshReport {
    fn new(key_field: IdField) -> Self {
        Self {
            key_field,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RefreshOutcome> {
        self.outcomes.get(key)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, status: RefreshStatus) -> usize {
        self.outcomes.values().filter(|o| o.status == status).count()
    }
}

/// Ties the cache store to the directory
pub struct RefreshPipeline {
    store: Arc<dyn CacheStore>,
    directory: Arc<DirectoryClient>,
}

impl RefreshPipeline {
    pub fn new(store: Arc<dyn CacheStore>, directory: Arc<DirectoryClient>) -> Self {
        Self { store, directory }
    }

    pub fn directory(&self) -> &Arc<DirectoryClient> {
        &self.directory
    }

    /// Cached entry for `field = value`, if any
    pub async fn lookup(&self, field: IdField, value: &str) -> SyncResult<Option<CacheEntry>> {
        Ok(self.store.find_one(field, value).await?)
    }

    /// Cached projection for `field = value`, resolving a miss against the
    /// directory and inserting the result
    pub async fn get_or_create(&self, field: IdField, value: &str) -> SyncResult<LookupView> {
        if let Some(entry) = self.lookup(field, value).await? {
            debug!(field = %field, value, "Cache hit");
            return Ok(entry.lookup_view());
        }

        debug!(field = %field, value, "Cache miss, querying directory");

        let records = self.directory.search(value, field).await?;
        let record = records.first().ok_or_else(|| SyncError::NotInDirectory {
            field,
            value: value.to_string(),
        })?;

        let entry = merge(None, cast_at(record, time::now())?);

        match self.store.insert(&entry).await {
            Ok(_) => {
                info!(bruid = %entry.bruid, shortid = %entry.shortid, "Created cache entry");
                Ok(entry.lookup_view())
            }
            Err(e) => {
                // A concurrent caller may have inserted the same person
                if let Some(existing) = self.store.find_one(IdField::Bruid, &entry.bruid).await? {
                    debug!(bruid = %entry.bruid, "Entry inserted concurrently");
                    return Ok(existing.lookup_view());
                }
                Err(e.into())
            }
        }
    }

    /// Re-fetch every entry matching `filter` and merge the directory's
    /// current values into it, keyed on `key_field`
    pub async fn regenerate(
        &self,
        filter: &SelectionFilter,
        key_field: IdField,
    ) -> SyncResult<RefreshReport> {
        let mut report = RefreshReport::new(key_field);

        let entries = self.store.find_many(filter).await?;
        let keys: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.field(key_field).map(str::to_string))
            .collect();

        if keys.len() < entries.len() {
            debug!(
                key_field = %key_field,
                skipped = entries.len() - keys.len(),
                "Entries without a key value skipped"
            );
        }
        if keys.is_empty() {
            info!(key_field = %key_field, "Nothing selected for refresh");
            return Ok(report);
        }

        info!(key_field = %key_field, selected = keys.len(), "Refreshing cache entries");

        let raw = self.directory.search(keys, key_field).await?;
        let now = time::now();

        let mut fresh: HashMap<String, CacheEntry> = HashMap::new();
        let mut invalid: HashSet<String> = HashSet::new();
        for record in &raw {
            match cast_at(record, now) {
                Ok(entry) => {
                    if let Some(key) = entry.field(key_field).map(|v| match_key(key_field, v)) {
                        fresh.entry(key).or_insert(entry);
                    }
                }
                Err(e) => {
                    warn!(dn = %record.dn, error = %e, "Dropping unusable directory record");
                    if let Some(key) = record.get(source_attribute(key_field)) {
                        invalid.insert(match_key(key_field, key));
                    }
                }
            }
        }

        for old in &entries {
            let Some(key) = old.field(key_field) else {
                continue;
            };

            let matched = match_key(key_field, key);
            let outcome = match fresh.get(&matched) {
                None if invalid.contains(&matched) => RefreshOutcome::skipped(RefreshStatus::InvalidRecord),
                None => {
                    debug!(key_field = %key_field, key, "Not in directory, left untouched");
                    RefreshOutcome::skipped(RefreshStatus::NotInDirectory)
                }
                Some(new) => {
                    let merged = merge(Some(old), new.clone());
                    match self.store.replace_by_key(key_field, key, &merged).await {
                        Ok(modified) => RefreshOutcome::updated(modified),
                        Err(e) => {
                            let err = SyncError::RecordWrite {
                                key: key.to_string(),
                                reason: e.to_string(),
                            };
                            warn!(error = %err, "Refresh write failed, continuing");
                            RefreshOutcome::failed(&err)
                        }
                    }
                }
            };

            report.outcomes.insert(key.to_string(), outcome);
        }

        info!(
            key_field = %key_field,
            updated = report.count(RefreshStatus::Updated),
            not_in_directory = report.count(RefreshStatus::NotInDirectory),
            invalid = report.count(RefreshStatus::InvalidRecord),
            write_failed = report.count(RefreshStatus::WriteFailed),
            "Refresh completed"
        );

        Ok(report)
    }
}

/// Key under which a fresh record is matched to a cached entry
///
/// The directory compares `mail` and `displayName` case-insensitively, so a
/// cached value may differ in case from the record it found.
fn match_key(field: IdField, value: &str) -> String {
    match field {
        IdField::Email | IdField::Name => value.to_lowercase(),
        IdField::Bruid | IdField::Shortid | IdField::Uuid => value.to_string(),
    }
}

impl std::fmt::Debug for RefreshPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshPipeline")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
