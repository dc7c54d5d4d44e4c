//! # RABDAP Common Library
//!
//! Shared code for the RABDAP identity cache including:
//! - Identity model (cache entries, bounded field history, lookup projection)
//! - Configuration loading
//! - Error types
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod identity;
pub mod time;

pub use error::{Error, Result};
pub use identity::{CacheEntry, History, IdField, LookupView};
