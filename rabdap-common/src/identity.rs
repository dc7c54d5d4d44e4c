//! Identity cache model
//!
//! A [`CacheEntry`] mirrors one person in the directory. The five identity
//! fields named by [`IdField`] are both the lookup keys and the fields whose
//! prior values are kept in the entry's [`History`]. `rabid` is derived from
//! `shortid` and is never tracked on its own.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Prefix of the derived research identifier; the short id is appended
pub const RABID_PREFIX: &str = "http://vivo.brown.edu/individual/";

/// Maximum number of prior values kept per field
pub const HISTORY_CAP: usize = 10;

/// Derive the research identifier for a short id
pub fn rabid_for(shortid: &str) -> String {
    format!("{}{}", RABID_PREFIX, shortid)
}

/// Logical identity field
///
/// Used as lookup key, directory search field and history key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdField {
    Bruid,
    Shortid,
    Uuid,
    Name,
    Email,
}

impl IdField {
    /// Every field, in canonical order
    pub const ALL: [IdField; 5] = [
        IdField::Bruid,
        IdField::Shortid,
        IdField::Uuid,
        IdField::Name,
        IdField::Email,
    ];

    /// Canonical (and column) name
    pub fn as_str(&self) -> &'static str {
        match self {
            IdField::Bruid => "bruid",
            IdField::Shortid => "shortid",
            IdField::Uuid => "uuid",
            IdField::Name => "name",
            IdField::Email => "email",
        }
    }
}

impl fmt::Display for IdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

/// Prior values per field, newest first, at most [`HISTORY_CAP`] each
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(BTreeMap<IdField, VecDeque<String>>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a superseded value, discarding the oldest beyond the cap
    pub fn record(&mut self, field: IdField, prior: String) {
        let values = self.0.entry(field).or_default();
        values.push_front(prior);
        values.truncate(HISTORY_CAP);
    }

    pub fn get(&self, field: IdField) -> Option<&VecDeque<String>> {
        self.0.get(&field)
    }

    /// Prior values of `field` as a plain list, newest first
    pub fn prior_values(&self, field: IdField) -> Vec<String> {
        self.get(field)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(VecDeque::is_empty)
    }

    pub fn fields(&self) -> impl Iterator<Item = IdField> + '_ {
        self.0.keys().copied()
    }
}

/// Cached identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub bruid: String,
    pub shortid: String,
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub rabid: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub historical: History,
}

impl CacheEntry {
    /// Current value of an identity field
    pub fn field(&self, field: IdField) -> Option<&str> {
        match field {
            IdField::Bruid => Some(self.bruid.as_str()),
            IdField::Shortid => Some(self.shortid.as_str()),
            IdField::Uuid => self.uuid.as_deref(),
            IdField::Name => self.name.as_deref(),
            IdField::Email => self.email.as_deref(),
        }
    }

    pub fn lookup_view(&self) -> LookupView {
        LookupView {
            bruid: self.bruid.clone(),
            shortid: self.shortid.clone(),
            rabid: self.rabid.clone(),
        }
    }
}

/// Projection returned by lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupView {
    pub bruid: String,
    pub shortid: String,
    pub rabid: String,
}
