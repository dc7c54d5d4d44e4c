//! Directory record → cache entry
//!
//! Directory attribute names map onto the canonical identity fields through
//! a fixed table. Attributes outside the table are ignored.

use chrono::{DateTime, Utc};
use rabdap_common::identity::rabid_for;
use rabdap_common::{time, CacheEntry, History, IdField};

use crate::directory::DirectoryRecord;
use crate::error::{SyncError, SyncResult};

/// Directory attribute that supplies a canonical field
pub fn source_attribute(field: IdField) -> &'static str {
    match field {
        IdField::Bruid => "brownBruID",
        IdField::Shortid => "brownShortID",
        IdField::Uuid => "brownUUID",
        IdField::Name => "displayName",
        IdField::Email => "mail",
    }
}

/// The five identity fields of a directory record, without derived data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedIdentity {
    pub bruid: String,
    pub shortid: String,
    pub uuid: String,
    pub name: String,
    pub email: String,
}

/// Rename a record's attributes to canonical fields
///
/// Fails with [`SyncError::UnrecognizedAttribute`] naming the first
/// required attribute the record lacks.
pub fn unpack(record: &DirectoryRecord) -> SyncResult<UnpackedIdentity> {
    let take = |field: IdField| -> SyncResult<String> {
        let attribute = source_attribute(field);
        record
            .get(attribute)
            .map(str::to_string)
            .ok_or_else(|| SyncError::UnrecognizedAttribute {
                attribute,
                dn: record.dn.clone(),
            })
    };

    Ok(UnpackedIdentity {
        bruid: take(IdField::Bruid)?,
        shortid: take(IdField::Shortid)?,
        uuid: take(IdField::Uuid)?,
        name: take(IdField::Name)?,
        email: take(IdField::Email)?,
    })
}

/// Build a fresh cache entry stamped with the current time
pub fn cast(record: &DirectoryRecord) -> SyncResult<CacheEntry> {
    cast_at(record, time::now())
}

/// Build a fresh cache entry stamped with `now`
pub fn cast_at(record: &DirectoryRecord, now: DateTime<Utc>) -> SyncResult<CacheEntry> {
    let identity = unpack(record)?;
    let rabid = rabid_for(&identity.shortid);

    Ok(CacheEntry {
        bruid: identity.bruid,
        shortid: identity.shortid,
        uuid: Some(identity.uuid),
        name: Some(identity.name),
        email: Some(identity.email),
        rabid,
        created: now,
        updated: now,
        historical: History::new(),
    })
}
