//! Cache store
//!
//! [`CacheStore`] is the persistence boundary of the sync engine: lookup by
//! identity field, insert, replace keyed on an identity field, and filtered
//! multi-get. Each call is a single statement; callers get no cross-call
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rabdap_common::{time, CacheEntry, History, IdField, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

const SELECT_COLUMNS: &str =
    "bruid, shortid, uuid, name, email, rabid, created, updated, historical";

/// Selection of cache entries for refresh
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionFilter {
    All,
    /// Entries last updated strictly before the timestamp
    UpdatedBefore(DateTime<Utc>),
    Equals { field: IdField, value: String },
    In { field: IdField, values: Vec<String> },
}

impl SelectionFilter {
    /// In-process evaluation, matching the SQL rendering
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        match self {
            SelectionFilter::All => true,
            SelectionFilter::UpdatedBefore(cutoff) => entry.updated < *cutoff,
            SelectionFilter::Equals { field, value } => entry.field(*field) == Some(value.as_str()),
            SelectionFilter::In { field, values } => entry
                .field(*field)
                .is_some_and(|current| values.iter().any(|v| v == current)),
        }
    }
}

/// Persistent store of cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// First entry whose `field` equals `value`
    async fn find_one(&self, field: IdField, value: &str) -> Result<Option<CacheEntry>>;

    /// All entries matching `filter`, in insertion order
    async fn find_many(&self, filter: &SelectionFilter) -> Result<Vec<CacheEntry>>;

    /// Insert a new entry; returns the store-assigned key
    async fn insert(&self, entry: &CacheEntry) -> Result<i64>;

    /// Replace the entry whose `field` equals `value`; returns rows modified
    async fn replace_by_key(&self, field: IdField, value: &str, entry: &CacheEntry) -> Result<u64>;
}

/// SQLite-backed cache store
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a batch in one transaction; all or nothing
    pub async fn insert_many(&self, entries: &[CacheEntry]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            insert_with(&mut *tx, entry).await?;
        }
        tx.commit().await?;
        Ok(entries.len() as u64)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn insert_with<'c, E>(executor: E, entry: &CacheEntry) -> Result<i64>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO identities (
            bruid, shortid, uuid, name, email, rabid, created, updated, historical
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.bruid)
    .bind(&entry.shortid)
    .bind(&entry.uuid)
    .bind(&entry.name)
    .bind(&entry.email)
    .bind(&entry.rabid)
    .bind(time::to_storage(&entry.created))
    .bind(time::to_storage(&entry.updated))
    .bind(Json(&entry.historical))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

fn entry_from_row(row: &SqliteRow) -> Result<CacheEntry> {
    let created: String = row.try_get("created")?;
    let updated: String = row.try_get("updated")?;
    let historical: Json<History> = row.try_get("historical")?;

    Ok(CacheEntry {
        bruid: row.try_get("bruid")?,
        shortid: row.try_get("shortid")?,
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        rabid: row.try_get("rabid")?,
        created: time::from_storage(&created)?,
        updated: time::from_storage(&updated)?,
        historical: historical.0,
    })
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn find_one(&self, field: IdField, value: &str) -> Result<Option<CacheEntry>> {
        // Column names come from the fixed IdField table
        let sql = format!(
            "SELECT {} FROM identities WHERE {} = ? ORDER BY id LIMIT 1",
            SELECT_COLUMNS,
            field.as_str()
        );

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn find_many(&self, filter: &SelectionFilter) -> Result<Vec<CacheEntry>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM identities", SELECT_COLUMNS));

        match filter {
            SelectionFilter::All => {}
            SelectionFilter::UpdatedBefore(cutoff) => {
                builder.push(" WHERE updated < ").push_bind(time::to_storage(cutoff));
            }
            SelectionFilter::Equals { field, value } => {
                builder
                    .push(" WHERE ")
                    .push(field.as_str())
                    .push(" = ")
                    .push_bind(value.clone());
            }
            SelectionFilter::In { field, values } => {
                if values.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" WHERE ").push(field.as_str()).push(" IN (");
                let mut separated = builder.separated(", ");
                for value in values {
                    separated.push_bind(value.clone());
                }
                separated.push_unseparated(")");
            }
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn insert(&self, entry: &CacheEntry) -> Result<i64> {
        insert_with(&self.pool, entry).await
    }

    async fn replace_by_key(&self, field: IdField, value: &str, entry: &CacheEntry) -> Result<u64> {
        let sql = format!(
            r#"
            UPDATE identities SET
                bruid = ?, shortid = ?, uuid = ?, name = ?, email = ?,
                rabid = ?, created = ?, updated = ?, historical = ?
            WHERE {} = ?
            "#,
            field.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&entry.bruid)
            .bind(&entry.shortid)
            .bind(&entry.uuid)
            .bind(&entry.name)
            .bind(&entry.email)
            .bind(&entry.rabid)
            .bind(time::to_storage(&entry.created))
            .bind(time::to_storage(&entry.updated))
            .bind(Json(&entry.historical))
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::TimeZone;
    use rabdap_common::identity::rabid_for;
    use rabdap_common::Error;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn entry(bruid: &str, shortid: &str, updated_day: u32) -> CacheEntry {
        CacheEntry {
            bruid: bruid.to_string(),
            shortid: shortid.to_string(),
            uuid: Some(format!("uuid-{}", bruid)),
            name: Some(format!("Name {}", bruid)),
            email: Some(format!("{}@brown.edu", shortid.to_lowercase())),
            rabid: rabid_for(shortid),
            created: at(1),
            updated: at(updated_day),
            historical: History::new(),
        }
    }

    async fn store_with(entries: &[CacheEntry]) -> SqliteCacheStore {
        let store = SqliteCacheStore::new(init_memory_pool().await.unwrap());
        for e in entries {
            store.insert(e).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_and_find_one() {
        let mut original = entry("B1", "S1", 2);
        original.historical.record(IdField::Name, "Old Name".to_string());
        let store = store_with(&[original.clone()]).await;

        for (field, value) in [
            (IdField::Bruid, "B1"),
            (IdField::Shortid, "S1"),
            (IdField::Uuid, "uuid-B1"),
            (IdField::Email, "s1@brown.edu"),
        ] {
            let found = store.find_one(field, value).await.unwrap();
            assert_eq!(found.as_ref(), Some(&original), "lookup by {}", field);
        }

        assert!(store.find_one(IdField::Bruid, "B404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_returns_distinct_keys() {
        let store = store_with(&[]).await;
        let first = store.insert(&entry("B1", "S1", 2)).await.unwrap();
        let second = store.insert(&entry("B2", "S2", 2)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_bruid_rejected() {
        let store = store_with(&[entry("B1", "S1", 2)]).await;
        let err = store.insert(&entry("B1", "S9", 3)).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_optional_fields_round_trip() {
        let mut sparse = entry("B1", "S1", 2);
        sparse.uuid = None;
        sparse.name = None;
        let store = store_with(&[sparse.clone()]).await;

        let found = store.find_one(IdField::Bruid, "B1").await.unwrap().unwrap();
        assert_eq!(found, sparse);
        assert!(store.find_one(IdField::Name, "Name B1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_many_filters() {
        let store = store_with(&[
            entry("B1", "S1", 2),
            entry("B2", "S2", 5),
            entry("B3", "S3", 9),
        ])
        .await;

        let bruids = |entries: Vec<CacheEntry>| -> Vec<String> {
            entries.into_iter().map(|e| e.bruid).collect()
        };

        let all = store.find_many(&SelectionFilter::All).await.unwrap();
        assert_eq!(bruids(all), vec!["B1", "B2", "B3"]);

        let stale = store
            .find_many(&SelectionFilter::UpdatedBefore(at(6)))
            .await
            .unwrap();
        assert_eq!(bruids(stale), vec!["B1", "B2"]);

        // Strictly before
        let none = store
            .find_many(&SelectionFilter::UpdatedBefore(at(2)))
            .await
            .unwrap();
        assert!(none.is_empty());

        let one = store
            .find_many(&SelectionFilter::Equals {
                field: IdField::Shortid,
                value: "S2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(bruids(one), vec!["B2"]);

        let some = store
            .find_many(&SelectionFilter::In {
                field: IdField::Bruid,
                values: vec!["B3".to_string(), "B1".to_string(), "B404".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(bruids(some), vec!["B1", "B3"]);

        let empty = store
            .find_many(&SelectionFilter::In {
                field: IdField::Bruid,
                values: vec![],
            })
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_filter_matches_agrees_with_sql() {
        let entries = vec![entry("B1", "S1", 2), entry("B2", "S2", 5)];
        let store = store_with(&entries).await;
        let filters = [
            SelectionFilter::All,
            SelectionFilter::UpdatedBefore(at(3)),
            SelectionFilter::Equals {
                field: IdField::Email,
                value: "s2@brown.edu".to_string(),
            },
            SelectionFilter::In {
                field: IdField::Shortid,
                values: vec!["S1".to_string()],
            },
        ];

        for filter in filters {
            let from_sql = store.find_many(&filter).await.unwrap();
            let in_process: Vec<CacheEntry> =
                entries.iter().filter(|e| filter.matches(e)).cloned().collect();
            assert_eq!(from_sql, in_process, "{:?}", filter);
        }
    }

    #[tokio::test]
    async fn test_replace_by_key() {
        let store = store_with(&[entry("B1", "S1", 2), entry("B2", "S2", 2)]).await;

        let mut replacement = entry("B1", "S1", 8);
        replacement.name = Some("Renamed".to_string());
        replacement.historical.record(IdField::Name, "Name B1".to_string());

        let modified = store
            .replace_by_key(IdField::Bruid, "B1", &replacement)
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let found = store.find_one(IdField::Bruid, "B1").await.unwrap().unwrap();
        assert_eq!(found, replacement);

        // Other rows untouched
        let other = store.find_one(IdField::Bruid, "B2").await.unwrap().unwrap();
        assert_eq!(other, entry("B2", "S2", 2));
    }

    #[tokio::test]
    async fn test_replace_missing_key_modifies_nothing() {
        let store = store_with(&[entry("B1", "S1", 2)]).await;
        let modified = store
            .replace_by_key(IdField::Bruid, "B404", &entry("B404", "S4", 3))
            .await
            .unwrap();
        assert_eq!(modified, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_many_is_atomic() {
        let store = store_with(&[entry("B1", "S1", 2)]).await;

        // Second row collides with the existing bruid
        let batch = vec![entry("B2", "S2", 2), entry("B1", "S1", 2)];
        assert!(store.insert_many(&batch).await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);

        let inserted = store
            .insert_many(&[entry("B2", "S2", 2), entry("B3", "S3", 2)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 3);
    }
}
