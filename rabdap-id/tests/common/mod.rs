//! Shared fixtures for rabdap-id integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rabdap_id::db::{init_memory_pool, SqliteCacheStore};
use rabdap_id::directory::{
    ClientSettings, DirectoryClient, DirectoryConnector, DirectoryQuery, DirectoryRecord,
    DirectorySession,
};
use rabdap_id::sync::RefreshPipeline;
use rabdap_id::{build_router, AppState, SyncError, SyncResult};

/// Directory stand-in serving a replaceable record set
#[derive(Clone, Default)]
pub struct FakeDirectory {
    records: Arc<Mutex<Vec<DirectoryRecord>>>,
    queries: Arc<Mutex<Vec<DirectoryQuery>>>,
    offline: Arc<Mutex<bool>>,
}

impl FakeDirectory {
    pub fn new(records: Vec<DirectoryRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<DirectoryRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn queries(&self) -> Vec<DirectoryQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryConnector for FakeDirectory {
    async fn connect(&self) -> SyncResult<Arc<dyn DirectorySession>> {
        if *self.offline.lock().unwrap() {
            return Err(SyncError::DirectoryConnection("server unreachable".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl DirectorySession for FakeDirectory {
    async fn search(&self, query: &DirectoryQuery) -> SyncResult<Vec<DirectoryRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| {
                r.get(query.attribute)
                    .is_some_and(|v| query.values.iter().any(|q| q == v))
            })
            .cloned()
            .collect())
    }

    async fn unbind(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Directory entry with all five requested attributes
pub fn person(bruid: &str, shortid: &str, name: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("uid={},ou=people,dc=brown,dc=edu", shortid))
        .with_attribute("brownBruID", bruid)
        .with_attribute("brownShortID", shortid)
        .with_attribute("brownUUID", format!("uuid-{}", bruid))
        .with_attribute("displayName", name)
        .with_attribute("mail", format!("{}@brown.edu", shortid.to_lowercase()))
}

/// Test helper: router over an in-memory database and a fake directory
pub async fn create_test_app(
    directory: &FakeDirectory,
) -> (axum::Router, SqliteCacheStore, Arc<DirectoryClient>) {
    let pool = init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    let store = SqliteCacheStore::new(pool);

    let settings = ClientSettings {
        throttle: Duration::from_millis(1),
        idle_timeout: Duration::from_secs(60),
    };
    let client = Arc::new(DirectoryClient::new(Arc::new(directory.clone()), settings));
    let pipeline = Arc::new(RefreshPipeline::new(
        Arc::new(store.clone()),
        Arc::clone(&client),
    ));

    (build_router(AppState::new(pipeline)), store, client)
}
