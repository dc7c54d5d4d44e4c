//! Synchronization of the identity cache with the directory
//!
//! - [`canonical`]: directory record → cache entry
//! - [`reconcile`]: merge with bounded field history
//! - [`refresh`]: lookup, create-on-miss, batch refresh
//! - [`scheduler`]: periodic refresh of stale entries

pub mod canonical;
pub mod reconcile;
pub mod refresh;
pub mod scheduler;

pub use crate::error::{SyncError, SyncResult};
pub use canonical::{cast, unpack};
pub use reconcile::merge;
pub use refresh::{RefreshOutcome, RefreshPipeline, RefreshReport, RefreshStatus};
pub use scheduler::{refresh_stale, spawn_refresh_scheduler};
