//! Directory service access
//!
//! The directory is the authoritative source of identity attributes. All
//! access goes through one [`DirectoryClient`] per process, which owns a
//! single connection, closes it after an idle period, throttles every query,
//! and splits large lookups into chunks the server will accept.
//!
//! The transport sits behind [`DirectoryConnector`] / [`DirectorySession`];
//! [`LdapConnector`] is the production implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rabdap_common::IdField;

use crate::error::SyncResult;

pub mod client;
pub mod ldap;
#[cfg(test)]
pub(crate) mod mock;
pub mod query;

pub use client::{ClientSettings, DirectoryClient};
pub use ldap::LdapConnector;
pub use query::{build_queries, DirectoryQuery, SearchTerms, CHUNK_SIZE};

/// Attributes requested on every search
pub const REQUESTED_ATTRIBUTES: [&str; 5] = [
    "brownBruID",
    "brownShortID",
    "brownUUID",
    "displayName",
    "mail",
];

/// Directory attribute matched when searching by a logical field
pub fn search_attribute(field: IdField) -> &'static str {
    match field {
        IdField::Bruid => "brownbruid",
        IdField::Shortid => "brownshortid",
        IdField::Uuid => "brownuuid",
        IdField::Name => "displayname",
        IdField::Email => "mail",
    }
}

/// One directory entry, reduced to a single value per attribute
///
/// Attribute names compare case-insensitively, as they do in LDAP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub dn: String,
    attributes: BTreeMap<String, String>,
}

impl DirectoryRecord {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Build from raw multi-valued attributes, keeping the first value of each
    pub fn from_multi_valued<I>(dn: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let attributes = attributes
            .into_iter()
            .filter_map(|(name, values)| values.into_iter().next().map(|first| (name, first)))
            .collect();

        Self {
            dn: dn.into(),
            attributes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Opens bound sessions against a directory server
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind
    async fn connect(&self) -> SyncResult<Arc<dyn DirectorySession>>;
}

/// A bound directory session
#[async_trait]
pub trait DirectorySession: Send + Sync {
    /// Run one query
    ///
    /// A query the server answers with a non-success result code yields an
    /// empty list; transport failures are errors.
    async fn search(&self, query: &DirectoryQuery) -> SyncResult<Vec<DirectoryRecord>>;

    async fn unbind(&self) -> SyncResult<()>;
}
