//! Merge of a fresh directory entry into a cached one

use rabdap_common::identity::rabid_for;
use rabdap_common::{CacheEntry, IdField};

/// Merge `new` over `old`
///
/// With no `old`, `new` is returned as is. Otherwise the result is `new`
/// with `old.created` kept and `old.historical` carried forward; each
/// tracked field whose value changed gets its previous value prepended to
/// its history. A previous value that was absent records nothing.
pub fn merge(old: Option<&CacheEntry>, new: CacheEntry) -> CacheEntry {
    let Some(old) = old else {
        return new;
    };

    let mut merged = new;
    merged.created = old.created;
    merged.historical = old.historical.clone();

    for field in IdField::ALL {
        let previous = old.field(field);
        if previous != merged.field(field) {
            if let Some(previous) = previous {
                merged.historical.record(field, previous.to_string());
            }
        }
    }

    merged.rabid = rabid_for(&merged.shortid);
    merged
}
