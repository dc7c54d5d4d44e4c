//! Directory filter rendering and chunking

use rabdap_common::IdField;

use super::search_attribute;

/// Maximum number of terms OR-combined into one query
pub const CHUNK_SIZE: usize = 100;

/// Search input: one value or an ordered list of values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerms {
    One(String),
    Many(Vec<String>),
}

impl SearchTerms {
    /// Number of values searched for
    pub fn len(&self) -> usize {
        match self {
            SearchTerms::One(_) => 1,
            SearchTerms::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for SearchTerms {
    fn from(value: &str) -> Self {
        SearchTerms::One(value.to_string())
    }
}

impl From<String> for SearchTerms {
    fn from(value: String) -> Self {
        SearchTerms::One(value)
    }
}

impl From<Vec<String>> for SearchTerms {
    fn from(values: Vec<String>) -> Self {
        SearchTerms::Many(values)
    }
}

/// One rendered directory query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    /// Attribute matched by the filter
    pub attribute: &'static str,
    /// Unescaped values in this query, in input order
    pub values: Vec<String>,
    /// RFC 4515 filter string
    pub filter: String,
}

/// Escape special characters in filter values (RFC 4515)
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

fn equality(attribute: &str, value: &str) -> String {
    format!("({}={})", attribute, escape_filter_value(value))
}

/// Render the queries for a search
///
/// A single value becomes one equality filter. A list is split into chunks
/// of [`CHUNK_SIZE`], each rendered as one OR of equality filters; an empty
/// list renders no queries.
pub fn build_queries(terms: &SearchTerms, field: IdField) -> Vec<DirectoryQuery> {
    let attribute = search_attribute(field);

    match terms {
        SearchTerms::One(value) => vec![DirectoryQuery {
            attribute,
            values: vec![value.clone()],
            filter: equality(attribute, value),
        }],
        SearchTerms::Many(values) => values
            .chunks(CHUNK_SIZE)
            .map(|chunk| {
                let clauses: String = chunk.iter().map(|v| equality(attribute, v)).collect();
                DirectoryQuery {
                    attribute,
                    values: chunk.to_vec(),
                    filter: format!("(|{})", clauses),
                }
            })
            .collect(),
    }
}
