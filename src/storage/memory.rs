//! A complete, documented in-memory [`StorageClient`], standing in for a
//! real typed-SQL driver in this crate's own tests and doctests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::Document;

use crate::error::{Error, Result};
use super::{Predicate, Row, SelectOptions, StorageClient, StorageValue};

/// One physical row as the fake keeps it: the decoded document (for
/// predicate evaluation) alongside its encoded shadow-column values (for
/// column-exclusivity inspection and back-fill).
#[derive(Debug, Clone)]
struct StoredRow {
    doc: Document,
    columns: Row,
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<StoredRow>,
}

impl Table {
    fn id_hash_of(row: &StoredRow) -> Option<u64> {
        match row.columns.get("id_hash") {
            Some(StorageValue::Int64(v)) => Some(*v as u64),
            _ => None,
        }
    }

    fn record_id_of(row: &StoredRow) -> Option<i64> {
        match row.columns.get("_ferretdb_record_id") {
            Some(StorageValue::Int64(v)) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Database {
    exists: bool,
    tables: BTreeMap<String, Table>,
    metadata: BTreeMap<String, String>,
}

/// An in-memory [`StorageClient`] with no external dependencies.
///
/// It is a first-class part of this crate (used by its own doctests), not a
/// throwaway test double: it faithfully preserves insert-duplicate
/// detection, `id_hash`-prefixed primary keys, and `_ferretdb_record_id`
/// ordering, while keeping the JSON-path/indexed-column distinction purely
/// advisory, exactly as a real query planner's choice of access path never
/// changes the result set.
#[derive(Default)]
pub struct InMemoryStorageClient {
    databases: Mutex<BTreeMap<String, Database>>,
}

impl InMemoryStorageClient {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, db: &str, table: &str, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        let database = dbs.entry(db.to_string()).or_default();
        let t = database.tables.entry(table.to_string()).or_default();
        Ok(f(t))
    }
}

#[async_trait]
impl StorageClient for InMemoryStorageClient {
    async fn make_directory(&self, db: &str) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        dbs.entry(db.to_string()).or_default().exists = true;
        Ok(())
    }

    async fn remove_directory_recursive(&self, db: &str) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        dbs.remove(db);
        Ok(())
    }

    async fn create_table(&self, db: &str, table: &str, columns: &[String]) -> Result<()> {
        self.with_table(db, table, |t| {
            t.columns = columns.to_vec();
        })
    }

    async fn drop_table(&self, db: &str, table: &str) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        if let Some(database) = dbs.get_mut(db) {
            database.tables.remove(table);
        }
        Ok(())
    }

    async fn alter_table_add_columns(&self, db: &str, table: &str, columns: &[String]) -> Result<()> {
        self.with_table(db, table, |t| {
            for c in columns {
                if !t.columns.contains(c) {
                    t.columns.push(c.clone());
                }
            }
        })
    }

    async fn alter_table_drop_columns(&self, db: &str, table: &str, columns: &[String]) -> Result<()> {
        self.with_table(db, table, |t| {
            t.columns.retain(|c| !columns.contains(c));
            for row in &mut t.rows {
                for c in columns {
                    row.columns.remove(c);
                }
            }
        })
    }

    async fn alter_table_add_index(&self, _db: &str, _table: &str, _index: &str, _columns: &[String]) -> Result<()> {
        Ok(())
    }

    async fn drop_index(&self, _db: &str, _table: &str, _index: &str) -> Result<()> {
        Ok(())
    }

    async fn insert_rows(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()> {
        self.with_table(db, table, move |t| {
            for row in rows {
                let doc = extract_doc(&row)?;
                let key = row_key(&row);
                if t.rows.iter().any(|existing| row_key(&existing.columns) == key) {
                    return Err(Error::InsertDuplicateID { collection: table.to_string() });
                }
                t.rows.push(StoredRow { doc, columns: row });
            }
            Ok(())
        })?
    }

    async fn upsert_rows(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()> {
        self.with_table(db, table, move |t| -> Result<()> {
            for row in rows {
                let doc = extract_doc(&row)?;
                let key = row_key(&row);
                if let Some(existing) = t.rows.iter_mut().find(|existing| row_key(&existing.columns) == key) {
                    existing.doc = doc;
                    existing.columns = row;
                } else {
                    t.rows.push(StoredRow { doc, columns: row });
                }
            }
            Ok(())
        })?
    }

    async fn delete_by_id_hash(&self, db: &str, table: &str, id_hashes: &[u64]) -> Result<u64> {
        self.with_table(db, table, |t| {
            let before = t.rows.len();
            t.rows.retain(|row| !matches!(Table::id_hash_of(row), Some(h) if id_hashes.contains(&h)));
            (before - t.rows.len()) as u64
        })
    }

    async fn delete_by_record_id(&self, db: &str, table: &str, record_ids: &[i64]) -> Result<u64> {
        self.with_table(db, table, |t| {
            let before = t.rows.len();
            t.rows.retain(|row| !matches!(Table::record_id_of(row), Some(r) if record_ids.contains(&r)));
            (before - t.rows.len()) as u64
        })
    }

    async fn select(&self, db: &str, table: &str, predicate: &Predicate, opts: &SelectOptions) -> Result<Vec<Row>> {
        self.with_table(db, table, |t| {
            let mut matches: Vec<&StoredRow> = t.rows.iter().filter(|row| predicate.matches(&row.doc)).collect();

            if let Some(ascending) = opts.natural_order {
                matches.sort_by_key(|row| Table::record_id_of(row).unwrap_or(0));
                if !ascending {
                    matches.reverse();
                }
            }

            matches.into_iter().take(opts.limit.max(1) as usize).map(|row| row.columns.clone()).collect()
        })
    }

    async fn scan_id_hash_page(&self, db: &str, table: &str, after: u64, limit: usize) -> Result<Vec<Row>> {
        self.with_table(db, table, |t| {
            let mut matches: Vec<&StoredRow> = t
                .rows
                .iter()
                .filter(|row| Table::id_hash_of(row).is_some_and(|h| h > after))
                .collect();
            matches.sort_by_key(|row| Table::id_hash_of(row).unwrap_or(0));
            matches.into_iter().take(limit).map(|row| row.columns.clone()).collect()
        })
    }

    async fn backfill_upsert(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()> {
        self.with_table(db, table, move |t| {
            for patch in rows {
                let Some(StorageValue::Int64(hash)) = patch.get("id_hash") else { continue };
                let hash = *hash as u64;
                if let Some(existing) = t.rows.iter_mut().find(|row| Table::id_hash_of(row) == Some(hash)) {
                    for (k, v) in patch {
                        if k != "id_hash" {
                            existing.columns.insert(k, v);
                        }
                    }
                }
            }
        })
    }

    async fn get_metadata_row(&self, db: &str, id: &str) -> Result<Option<String>> {
        let dbs = self.databases.lock().expect("storage mutex poisoned");
        Ok(dbs.get(db).and_then(|d| d.metadata.get(id).cloned()))
    }

    async fn list_metadata_rows(&self, db: &str) -> Result<Vec<(String, String)>> {
        let dbs = self.databases.lock().expect("storage mutex poisoned");
        Ok(dbs.get(db).map(|d| d.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default())
    }

    async fn put_metadata_row(&self, db: &str, id: &str, jsonb: String) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        dbs.entry(db.to_string()).or_default().metadata.insert(id.to_string(), jsonb);
        Ok(())
    }

    async fn delete_metadata_row(&self, db: &str, id: &str) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        if let Some(database) = dbs.get_mut(db) {
            database.metadata.remove(id);
        }
        Ok(())
    }

    async fn rename_metadata_row(&self, db: &str, old_id: &str, new_id: &str, jsonb: String) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage mutex poisoned");
        let database = dbs.entry(db.to_string()).or_default();
        database.metadata.insert(new_id.to_string(), jsonb);
        database.metadata.remove(old_id);
        Ok(())
    }
}

/// Decodes the `_jsonb` column of an encoded row back into a `Document`.
fn extract_doc(row: &Row) -> Result<Document> {
    match row.get("_jsonb") {
        Some(StorageValue::Json(s)) => {
            crate::codec::decode(s).map_err(|_| Error::invariant("row is missing a well-formed _jsonb column"))
        }
        _ => Err(Error::invariant("row is missing a _jsonb column")),
    }
}

/// The composite dedup key for insert/upsert: `id_hash` plus whichever
/// single `_id_<alias>` column is populated, so hash collisions between
/// distinct `_id` values don't overwrite each other.
fn row_key(row: &Row) -> String {
    let hash = match row.get("id_hash") {
        Some(StorageValue::Int64(v)) => v.to_string(),
        _ => "?".to_string(),
    };
    let mut id_part = String::new();
    for col in ["_id_string", "_id_objectId", "_id_scalar", "_id_date", "_id_bool"] {
        if let Some(v) = row.get(col) {
            if !matches!(v, StorageValue::Null) {
                id_part = format!("{col}={v:?}");
                break;
            }
        }
    }
    format!("{hash}:{id_part}")
}
