//! The seam this crate is built against: a typed SQL backend capable of
//! per-database directories, DDL, batched DML, and JSON-path predicates.
//!
//! A real deployment plugs in a driver for the target engine; this crate
//! ships [`InMemoryStorageClient`], a complete, documented fake used by the
//! crate's own tests and doctests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::Result;

/// A value as it travels across the storage seam: either a typed scalar
/// parameter/column value, or the document's full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    /// SQL `NULL`.
    Null,
    /// `Bool` column.
    Bool(bool),
    /// 32-bit integer column/parameter.
    Int32(i32),
    /// 64-bit integer column/parameter (also used for `Uint64` values such
    /// as `id_hash`, bit-reinterpreted, since the fake has no need for an
    /// unsigned wire type of its own).
    Int64(i64),
    /// `DyNumber`/floating point column/parameter.
    Double(f64),
    /// UTF-8 string column/parameter (also used for hex-encoded ObjectIds).
    Utf8(String),
    /// Serialized `_jsonb` document body.
    Json(String),
}

/// One physical row, keyed by column name.
pub type Row = BTreeMap<String, StorageValue>;

/// A single field-level condition produced by the query translator.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `$eq`.
    Eq,
    /// `$ne`.
    Ne,
}

/// The predicate tree the query translator hands to the storage client.
///
/// This mirrors the *semantics* of the WHERE clause the translator also
/// renders to text (see [`crate::query::Translation::where_clause`]):
/// pushdown through an index versus a `_jsonb` JSON-path scan changes only
/// the backend's query plan, never the result set, so the predicate tree is
/// the single source of truth both for execution (here) and for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row (empty filter).
    True,
    /// Conjunction of sub-predicates.
    And(Vec<Predicate>),
    /// `field <op> value`, where `field` is a dot-notation path.
    Field {
        /// Dot-notation path, e.g. `"address.city"`.
        path: String,
        /// `$eq` or `$ne`.
        op: Op,
        /// The BSON value compared against.
        value: Bson,
    },
}

impl Predicate {
    /// Evaluates this predicate against `doc`. `$ne` matches documents where
    /// the field is absent, has a different BSON type, or has a different
    /// value — never documents where the field matches `value`'s type but
    /// compares unequal under looser coercion.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(subs) => subs.iter().all(|p| p.matches(doc)),
            Predicate::Field { path, op, value } => {
                let found = resolve_path(doc, path);
                match op {
                    Op::Eq => found.as_deref() == Some(value),
                    Op::Ne => found.as_deref() != Some(value),
                }
            }
        }
    }
}

/// Resolves a dot-notation path (`a.b.0.c`) against a document, walking
/// array indices as well as nested documents.
pub fn resolve_path<'a>(doc: &'a Document, path: &str) -> Option<std::borrow::Cow<'a, Bson>> {
    let mut current = Bson::Document(doc.clone());
    for segment in path.split('.') {
        current = match current {
            Bson::Document(ref d) => d.get(segment)?.clone(),
            Bson::Array(ref items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?.clone()
            }
            _ => return None,
        };
    }
    Some(std::borrow::Cow::Owned(current))
}

/// Sort/limit/projection options for a [`StorageClient::select`] call.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// `true` natural order ascending, `false` descending, `None` unordered.
    pub natural_order: Option<bool>,
    /// Row cap; the caller (collection.rs) fills in the configured default.
    pub limit: u32,
}

/// An abstraction over a typed SQL backend capable of hosting this crate's
/// per-database directories, DDL, batched DML, and JSON-path predicates.
///
/// Every method corresponds to one documented operation in the backing
/// SQL dialect (table/index DDL, `AS_TABLE` batch DML, `JSON_EXISTS`
/// predicates); see the crate-level documentation for the mapping.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Creates the per-database directory. Idempotent.
    async fn make_directory(&self, db: &str) -> Result<()>;

    /// Recursively removes a database's directory and everything under it.
    async fn remove_directory_recursive(&self, db: &str) -> Result<()>;

    /// `CREATE TABLE` with the given column names.
    async fn create_table(&self, db: &str, table: &str, columns: &[String]) -> Result<()>;

    /// Drops a table. Idempotent.
    async fn drop_table(&self, db: &str, table: &str) -> Result<()>;

    /// `ALTER TABLE ... ADD COLUMN ...` for each name in `columns`.
    async fn alter_table_add_columns(&self, db: &str, table: &str, columns: &[String]) -> Result<()>;

    /// `ALTER TABLE ... DROP COLUMN ...` for each name in `columns`.
    async fn alter_table_drop_columns(&self, db: &str, table: &str, columns: &[String]) -> Result<()>;

    /// `ALTER TABLE ... ADD INDEX <name> GLOBAL ON (...)`.
    async fn alter_table_add_index(&self, db: &str, table: &str, index: &str, columns: &[String]) -> Result<()>;

    /// Drops a secondary index by its physical name.
    async fn drop_index(&self, db: &str, table: &str, index: &str) -> Result<()>;

    /// `INSERT INTO t SELECT ... FROM AS_TABLE($batch)`. Fails the whole
    /// batch with [`Error::InsertDuplicateID`] if any row's primary key
    /// already exists.
    async fn insert_rows(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()>;

    /// `UPSERT INTO t SELECT ... FROM AS_TABLE($batch)`.
    async fn upsert_rows(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()>;

    /// Deletes by `id_hash`, returning the number of rows removed.
    async fn delete_by_id_hash(&self, db: &str, table: &str, id_hashes: &[u64]) -> Result<u64>;

    /// Deletes by `_ferretdb_record_id` (capped collections), returning the
    /// number of rows removed.
    async fn delete_by_record_id(&self, db: &str, table: &str, record_ids: &[i64]) -> Result<u64>;

    /// Executes a translated predicate against a table.
    async fn select(&self, db: &str, table: &str, predicate: &Predicate, opts: &SelectOptions) -> Result<Vec<Row>>;

    /// Scans one page of `id_hash > after` ordered rows, for index back-fill.
    async fn scan_id_hash_page(&self, db: &str, table: &str, after: u64, limit: usize) -> Result<Vec<Row>>;

    /// Upserts computed shadow-column values for one back-fill page. Rows
    /// carry only `id_hash` and the shadow columns being populated.
    async fn backfill_upsert(&self, db: &str, table: &str, rows: Vec<Row>) -> Result<()>;

    /// Reads one row of the `_database_metadata` table by collection name.
    async fn get_metadata_row(&self, db: &str, id: &str) -> Result<Option<String>>;

    /// Lists all `_database_metadata` rows for a database, sorted by id.
    async fn list_metadata_rows(&self, db: &str) -> Result<Vec<(String, String)>>;

    /// Upserts one `_database_metadata` row.
    async fn put_metadata_row(&self, db: &str, id: &str, jsonb: String) -> Result<()>;

    /// Deletes one `_database_metadata` row. Idempotent.
    async fn delete_metadata_row(&self, db: &str, id: &str) -> Result<()>;

    /// Atomically upserts `new_id` and deletes `old_id` from
    /// `_database_metadata` — stands in for `StorageClient::with_write_tx`
    /// wrapping both statements in one transaction.
    async fn rename_metadata_row(&self, db: &str, old_id: &str, new_id: &str, jsonb: String) -> Result<()>;
}

mod memory;
pub use memory::InMemoryStorageClient;

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn predicate_eq_matches_same_value_and_type() {
        let doc = doc! { "name": "alice" };
        let pred = Predicate::Field { path: "name".into(), op: Op::Eq, value: Bson::String("alice".into()) };
        assert!(pred.matches(&doc));
    }

    #[test]
    fn predicate_ne_matches_missing_field() {
        let doc = doc! { "other": 1 };
        let pred = Predicate::Field { path: "name".into(), op: Op::Ne, value: Bson::String("alice".into()) };
        assert!(pred.matches(&doc));
    }

    #[test]
    fn predicate_ne_matches_different_type() {
        let doc = doc! { "name": 1 };
        let pred = Predicate::Field { path: "name".into(), op: Op::Ne, value: Bson::String("alice".into()) };
        assert!(pred.matches(&doc));
    }

    #[test]
    fn predicate_ne_rejects_equal_value() {
        let doc = doc! { "name": "alice" };
        let pred = Predicate::Field { path: "name".into(), op: Op::Ne, value: Bson::String("alice".into()) };
        assert!(!pred.matches(&doc));
    }

    #[test]
    fn resolve_path_walks_array_indices() {
        let doc = doc! { "a": { "b": [ { "c": 1 }, { "c": 2 } ] } };
        assert_eq!(resolve_path(&doc, "a.b.1.c").as_deref(), Some(&Bson::Int32(2)));
    }
}
