//! In-process directory for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{DirectoryConnector, DirectoryQuery, DirectoryRecord, DirectorySession};
use crate::error::{SyncError, SyncResult};

/// Activity seen by the mock
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub connects: usize,
    pub unbinds: usize,
    pub queries: Vec<(Instant, DirectoryQuery)>,
}

/// Serves a fixed record set; a query matches records whose searched
/// attribute equals one of the query values, ignoring case for `mail` and
/// `displayname` as the directory does
#[derive(Clone, Default)]
pub(crate) struct MockDirectory {
    records: Arc<Mutex<Vec<DirectoryRecord>>>,
    log: Arc<Mutex<MockLog>>,
    fail_connect: Arc<AtomicBool>,
    fail_search: Arc<AtomicBool>,
}

impl MockDirectory {
    pub fn new(records: Vec<DirectoryRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<DirectoryRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    pub fn unbinds(&self) -> usize {
        self.log.lock().unwrap().unbinds
    }

    pub fn queries(&self) -> Vec<DirectoryQuery> {
        self.log.lock().unwrap().queries.iter().map(|(_, q)| q.clone()).collect()
    }

    pub fn query_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().queries.iter().map(|(at, _)| *at).collect()
    }
}

/// A directory entry carrying all five requested attributes
pub(crate) fn person(bruid: &str, shortid: &str, name: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("uid={},ou=people,dc=brown,dc=edu", shortid))
        .with_attribute("brownBruID", bruid)
        .with_attribute("brownShortID", shortid)
        .with_attribute("brownUUID", format!("uuid-{}", bruid))
        .with_attribute("displayName", name)
        .with_attribute("mail", format!("{}@brown.edu", shortid.to_lowercase()))
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(&self) -> SyncResult<Arc<dyn DirectorySession>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SyncError::DirectoryConnection("connection refused".to_string()));
        }
        self.log.lock().unwrap().connects += 1;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl DirectorySession for MockDirectory {
    async fn search(&self, query: &DirectoryQuery) -> SyncResult<Vec<DirectoryRecord>> {
        self.log
            .lock()
            .unwrap()
            .queries
            .push((Instant::now(), query.clone()));

        if self.fail_search.load(Ordering::SeqCst) {
            return Err(SyncError::DirectoryConnection("connection reset".to_string()));
        }

        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|record| {
                record.get(query.attribute).is_some_and(|value| {
                    query.values.iter().any(|v| match query.attribute {
                        "mail" | "displayname" => v.eq_ignore_ascii_case(value),
                        _ => v == value,
                    })
                })
            })
            .cloned()
            .collect())
    }

    async fn unbind(&self) -> SyncResult<()> {
        self.log.lock().unwrap().unbinds += 1;
        Ok(())
    }
}
