//! LDAP transport for the directory client

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use rabdap_common::config::DirectoryConfig;
use tracing::{debug, info, warn};

use super::{DirectoryConnector, DirectoryQuery, DirectoryRecord, DirectorySession, REQUESTED_ATTRIBUTES};
use crate::error::{SyncError, SyncResult};

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// LDAP result codes
const RC_SUCCESS: u32 = 0;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Simple-bind LDAP connector
pub struct LdapConnector {
    url: String,
    bind_dn: String,
    password: String,
    search_base: String,
}

impl LdapConnector {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            url: config.url.clone(),
            bind_dn: config.bind_dn(),
            password: config.password.clone().unwrap_or_default(),
            search_base: config.search_base.clone(),
        }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> SyncResult<Arc<dyn DirectorySession>> {
        debug!(url = %self.url, "Connecting to directory server");

        let settings =
            LdapConnSettings::new().set_conn_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| {
                SyncError::DirectoryConnection(format!("connect to {} failed: {}", self.url, e))
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "Directory connection driver error");
            }
        });

        debug!(bind_dn = %self.bind_dn, "Performing directory bind");

        let result = ldap
            .simple_bind(&self.bind_dn, &self.password)
            .await
            .map_err(|e| {
                SyncError::DirectoryConnection(format!("bind as {} failed: {}", self.bind_dn, e))
            })?;

        if result.rc != RC_SUCCESS {
            let reason = if result.rc == RC_INVALID_CREDENTIALS {
                "invalid credentials".to_string()
            } else {
                format!("code {}: {}", result.rc, result.text)
            };
            return Err(SyncError::DirectoryConnection(format!(
                "bind as {} rejected ({})",
                self.bind_dn, reason
            )));
        }

        info!(url = %self.url, "Directory bind established");

        Ok(Arc::new(LdapSession {
            ldap,
            search_base: self.search_base.clone(),
        }))
    }
}

impl fmt::Debug for LdapConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConnector")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("search_base", &self.search_base)
            .finish_non_exhaustive()
    }
}

struct LdapSession {
    ldap: Ldap,
    search_base: String,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(&self, query: &DirectoryQuery) -> SyncResult<Vec<DirectoryRecord>> {
        // Ldap handles are cheap clones over one multiplexed connection
        let mut ldap = self.ldap.clone();

        let SearchResult(entries, status) = ldap
            .search(
                &self.search_base,
                Scope::Subtree,
                &query.filter,
                REQUESTED_ATTRIBUTES.to_vec(),
            )
            .await
            .map_err(|e| SyncError::DirectoryConnection(format!("search failed: {}", e)))?;

        if status.rc != RC_SUCCESS {
            warn!(
                rc = status.rc,
                text = %status.text,
                terms = query.values.len(),
                "Directory query unsuccessful, skipping"
            );
            return Ok(Vec::new());
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryRecord::from_multi_valued(entry.dn, entry.attrs))
            .collect())
    }

    async fn unbind(&self) -> SyncResult<()> {
        let mut ldap = self.ldap.clone();
        ldap.unbind()
            .await
            .map_err(|e| SyncError::DirectoryConnection(format!("unbind failed: {}", e)))
    }
}
