//! The catalog of known databases and collections: the single write-locked
//! source of truth for schema, reconciled lazily against the metadata table.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::schema;
use crate::storage::StorageClient;
use crate::types::COLUMN_ORDER;

/// One field of an index's key list. `descending` is accepted at the API
/// boundary but ignored at the storage layer; callers asking for a
/// descending index get a warning logged once and an ascending index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexKeyPair {
    /// Dot-notation field path.
    pub field: String,
    /// Accepted, but not honored — see struct docs.
    pub descending: bool,
}

/// A secondary (or implicit `_id`) index over a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    /// User-facing index name.
    pub name: String,
    /// Physical index name (`<sanitized>_<fnv32a hex8>_idx`).
    pub sanitized_name: String,
    /// Ordered key fields.
    pub key: Vec<IndexKeyPair>,
    /// Only the implicit `_id` index may be unique.
    pub unique: bool,
    /// `false` while back-fill is running; the query translator never
    /// pushes a filter through a non-ready index.
    pub ready: bool,
}

/// `{cappedSize, cappedDocuments}`; `capped()` iff `capped_size > 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CollectionSettings {
    /// Maximum byte size of a capped collection; `0` means uncapped.
    pub capped_size: i64,
    /// Maximum document count of a capped collection.
    pub capped_documents: i64,
}

impl CollectionSettings {
    /// Whether these settings describe a capped collection.
    pub fn capped(&self) -> bool {
        self.capped_size > 0
    }
}

/// An immutable snapshot of one collection's schema. Mutations replace the
/// whole value under the registry's write lock; callers receive deep copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    /// User-visible collection name.
    pub name: String,
    /// Sanitized, FNV32a-suffixed physical table name; immutable after
    /// creation (renaming the collection never renames the table).
    pub table_name: String,
    /// Declared indexes, including the implicit `_id` index.
    pub indexes: Vec<IndexInfo>,
    /// Capped-collection settings.
    pub settings: CollectionSettings,
}

impl Collection {
    fn new(name: &str, table_name: String, settings: CollectionSettings) -> Self {
        Collection {
            name: name.to_string(),
            table_name,
            indexes: vec![IndexInfo {
                name: "_id_".to_string(),
                sanitized_name: "_id__idx".to_string(),
                key: vec![IndexKeyPair { field: "_id".to_string(), descending: false }],
                unique: true,
                ready: true,
            }],
            settings,
        }
    }

    /// The full physical column list for this collection's backing table:
    /// primary-key columns, `_jsonb`, shadow columns for every indexed
    /// non-`_id` field, and `_ferretdb_record_id` if capped.
    pub fn column_list(&self) -> Vec<String> {
        let mut columns = vec!["id_hash".to_string()];
        columns.extend(schema::shadow_columns("_id"));
        columns.push("_jsonb".to_string());
        for field in self.indexed_fields() {
            columns.extend(schema::shadow_columns(&field));
        }
        if self.settings.capped() {
            columns.push("_ferretdb_record_id".to_string());
        }
        columns
    }

    /// Every distinct non-`_id` field referenced by a declared index.
    pub fn indexed_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for index in &self.indexes {
            for key in &index.key {
                if key.field != "_id" && !fields.contains(&key.field) {
                    fields.push(key.field.clone());
                }
            }
        }
        fields
    }
}

struct Entry {
    collection: Collection,
    /// Next `_ferretdb_record_id` to hand out; unused for uncapped
    /// collections. Not persisted in the metadata row — reset to 0 across
    /// catalog reloads, which is fine for a ring-buffer ordering hint but
    /// would need to be recovered from `MAX(_ferretdb_record_id)` on a real
    /// backend restart.
    next_record_id: AtomicI64,
}

impl Entry {
    fn new(collection: Collection) -> Self {
        Entry { collection, next_record_id: AtomicI64::new(0) }
    }
}

type DbCatalog = BTreeMap<String, Entry>;

/// Owns the catalog for all databases known to a [`StorageClient`], gates
/// every schema mutation behind a single write lock, and lazily loads
/// per-database metadata on first access.
pub struct Registry<S: StorageClient> {
    storage: Arc<S>,
    catalog: RwLock<BTreeMap<String, DbCatalog>>,
    backfill_tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    backfill_page_size: usize,
}

/// Databases never loaded or created: internal namespace.
fn is_internal_db(name: &str) -> bool {
    name.is_empty() || name == "local"
}

impl<S: StorageClient + 'static> Registry<S> {
    /// Creates a registry backed by `storage`, with an empty in-memory
    /// catalog (populated lazily per database on first access).
    /// `backfill_page_size` sets the page size `index::backfill` reads at;
    /// see [`crate::config::Config::backfill_page_size`].
    pub fn new(storage: Arc<S>, backfill_page_size: usize) -> Self {
        Registry {
            storage,
            catalog: RwLock::new(BTreeMap::new()),
            backfill_tasks: tokio::sync::Mutex::new(Vec::new()),
            backfill_page_size: backfill_page_size.max(1),
        }
    }

    /// Idempotent lazy load: pages through `_database_metadata` for `db`
    /// and installs its collections into the in-memory catalog if absent.
    #[instrument(skip(self), fields(db = db))]
    async fn ensure_loaded(&self, db: &str) -> Result<()> {
        if is_internal_db(db) {
            return Ok(());
        }
        {
            let catalog = self.catalog.read().await;
            if catalog.contains_key(db) {
                return Ok(());
            }
        }

        let mut catalog = self.catalog.write().await;
        if catalog.contains_key(db) {
            return Ok(());
        }

        debug!("lazily loading metadata table");
        let rows = self.storage.list_metadata_rows(db).await?;
        let mut loaded = BTreeMap::new();
        for (name, jsonb) in rows {
            match serde_json::from_str::<Collection>(&jsonb) {
                Ok(collection) => { loaded.insert(name, Entry::new(collection)); }
                Err(e) => warn!(collection = %name, error = %e, "skipping unparsable metadata row"),
            }
        }
        catalog.insert(db.to_string(), loaded);
        Ok(())
    }

    /// Sorted list of known database names.
    #[instrument(skip(self))]
    pub async fn database_list(&self) -> Vec<String> {
        self.catalog.read().await.keys().cloned().collect()
    }

    /// Ensures `db`'s directory and catalog entry exist, creating both if
    /// necessary.
    #[instrument(skip(self), fields(db = db))]
    pub async fn database_get_or_create(&self, db: &str) -> Result<()> {
        if is_internal_db(db) {
            return Ok(());
        }
        self.ensure_loaded(db).await?;
        let exists = self.catalog.read().await.contains_key(db);
        if exists {
            return Ok(());
        }

        let mut catalog = self.catalog.write().await;
        if catalog.contains_key(db) {
            return Ok(());
        }
        self.storage.make_directory(db).await?;
        catalog.insert(db.to_string(), BTreeMap::new());
        metrics::set_database_count(catalog.len());
        Ok(())
    }

    /// Drops `db` and everything in it. Returns whether it previously
    /// existed.
    #[instrument(skip(self), fields(db = db))]
    pub async fn database_drop(&self, db: &str) -> Result<bool> {
        self.ensure_loaded(db).await?;
        let mut catalog = self.catalog.write().await;
        let existed = catalog.remove(db).is_some();
        if existed {
            self.storage.remove_directory_recursive(db).await?;
            metrics::set_database_count(catalog.len());
        }
        Ok(existed)
    }

    /// Sorted snapshots of every collection in `db`.
    #[instrument(skip(self), fields(db = db))]
    pub async fn collection_list(&self, db: &str) -> Result<Vec<Collection>> {
        self.ensure_loaded(db).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.get(db).map(|c| c.values().map(|e| e.collection.clone()).collect()).unwrap_or_default())
    }

    /// A deep copy of one collection's snapshot, or `None` if it (or its
    /// database) does not exist.
    #[instrument(skip(self), fields(db = db, collection = name))]
    pub async fn collection_get(&self, db: &str, name: &str) -> Result<Option<Collection>> {
        self.ensure_loaded(db).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.get(db).and_then(|c| c.get(name)).map(|e| e.collection.clone()))
    }

    /// Hands out the next `_ferretdb_record_id` for a capped collection's
    /// insert/update, or `None` if the collection is uncapped or unknown.
    #[instrument(skip(self), fields(db = db, collection = name))]
    pub async fn next_record_id(&self, db: &str, name: &str) -> Result<Option<i64>> {
        self.ensure_loaded(db).await?;
        let catalog = self.catalog.read().await;
        let Some(entry) = catalog.get(db).and_then(|c| c.get(name)) else { return Ok(None) };
        if !entry.collection.settings.capped() {
            return Ok(None);
        }
        Ok(Some(entry.next_record_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Creates a collection (and, if supplied, its initial indexes) if one
    /// by this name does not already exist. Returns whether it was created.
    #[instrument(skip(self, indexes), fields(db = db, collection = name))]
    pub async fn collection_create(
        &self,
        db: &str,
        name: &str,
        settings: CollectionSettings,
        indexes: Vec<IndexInfo>,
    ) -> Result<bool> {
        self.database_get_or_create(db).await?;
        let mut catalog = self.catalog.write().await;
        let db_catalog = catalog.entry(db.to_string()).or_default();
        if db_catalog.contains_key(name) {
            return Ok(false);
        }

        let existing_names: Vec<String> = db_catalog.values().map(|e| e.collection.table_name.clone()).collect();
        let table_name = schema::generate_unique_table_name(name, |candidate| existing_names.iter().any(|n| n == candidate));

        let mut collection = Collection::new(name, table_name.clone(), settings);
        for mut index in indexes {
            if !index.unique {
                index.sanitized_name = schema::index_physical_name(&index.name);
                index.ready = false;
                collection.indexes.push(index);
            }
        }

        self.storage.create_table(db, &table_name, &collection.column_list()).await?;
        for index in &collection.indexes {
            if index.name == "_id_" {
                continue;
            }
            let all_shadow: Vec<String> = index.key.iter().flat_map(|k| schema::shadow_columns(&k.field)).collect();
            self.storage.alter_table_add_index(db, &table_name, &index.sanitized_name, &all_shadow).await?;
        }

        let jsonb = serde_json::to_string(&collection).expect("Collection is always JSON-serializable");
        if let Err(e) = self.storage.put_metadata_row(db, name, jsonb).await {
            let _ = self.storage.drop_table(db, &table_name).await;
            return Err(e);
        }

        db_catalog.insert(name.to_string(), Entry::new(collection));
        metrics::set_collection_count(db, db_catalog.len());
        Ok(true)
    }

    /// Drops a collection's backing table and metadata row. Returns whether
    /// it existed.
    #[instrument(skip(self), fields(db = db, collection = name))]
    pub async fn collection_drop(&self, db: &str, name: &str) -> Result<bool> {
        self.ensure_loaded(db).await?;
        let mut catalog = self.catalog.write().await;
        let Some(db_catalog) = catalog.get_mut(db) else { return Ok(false) };
        let Some(entry) = db_catalog.remove(name) else { return Ok(false) };

        self.storage.drop_table(db, &entry.collection.table_name).await?;
        self.storage.delete_metadata_row(db, name).await?;
        metrics::set_collection_count(db, db_catalog.len());
        Ok(true)
    }

    /// Renames a collection. `table_name` is preserved (no data movement).
    #[instrument(skip(self), fields(db = db, old = old_name, new = new_name))]
    pub async fn collection_rename(&self, db: &str, old_name: &str, new_name: &str) -> Result<bool> {
        self.ensure_loaded(db).await?;
        let mut catalog = self.catalog.write().await;
        let Some(db_catalog) = catalog.get_mut(db) else { return Ok(false) };
        let Some(mut entry) = db_catalog.remove(old_name) else { return Ok(false) };

        entry.collection.name = new_name.to_string();
        let jsonb = serde_json::to_string(&entry.collection).expect("Collection is always JSON-serializable");
        self.storage.rename_metadata_row(db, old_name, new_name, jsonb).await?;
        db_catalog.insert(new_name.to_string(), entry);
        Ok(true)
    }

    /// Adds indexes to an existing collection (or creates it with them, if
    /// absent — an atomic "collection + indexes"). Spawns one detached
    /// back-fill task per newly added non-unique index.
    #[instrument(skip(self, requested), fields(db = db, collection = name))]
    pub async fn indexes_create(self: &Arc<Self>, db: &str, name: &str, requested: Vec<IndexInfo>) -> Result<()> {
        self.database_get_or_create(db).await?;

        let needs_create = {
            let catalog = self.catalog.read().await;
            !catalog.get(db).is_some_and(|c| c.contains_key(name))
        };
        if needs_create {
            self.collection_create(db, name, CollectionSettings::default(), requested.clone()).await?;
            let mut handles = self.backfill_tasks.lock().await;
            for index in &requested {
                if !index.unique {
                    handles.push(self.spawn_backfill(db, name, &index.name));
                }
            }
            return Ok(());
        }

        let mut catalog = self.catalog.write().await;
        let db_catalog = catalog.entry(db.to_string()).or_default();
        let Some(entry) = db_catalog.get_mut(name) else {
            return Err(Error::invariant("collection vanished under the write lock"));
        };

        let mut new_columns = Vec::new();
        let mut added = Vec::new();
        for mut index in requested {
            if index.unique {
                warn!(index = %index.name, "skipping unique index on non-_id field");
                continue;
            }
            if entry.collection.indexes.iter().any(|i| i.name == index.name) {
                continue;
            }
            index.sanitized_name = schema::index_physical_name(&index.name);
            index.ready = false;
            for key in &index.key {
                if !entry.collection.indexed_fields().contains(&key.field) {
                    new_columns.extend(schema::shadow_columns(&key.field));
                }
            }
            entry.collection.indexes.push(index.clone());
            added.push(index);
        }

        if !new_columns.is_empty() {
            self.storage.alter_table_add_columns(db, &entry.collection.table_name, &new_columns).await?;
        }
        for index in &added {
            let all_shadow: Vec<String> = index.key.iter().flat_map(|k| schema::shadow_columns(&k.field)).collect();
            self.storage.alter_table_add_index(db, &entry.collection.table_name, &index.sanitized_name, &all_shadow).await?;
        }

        let jsonb = serde_json::to_string(&entry.collection).expect("Collection is always JSON-serializable");
        self.storage.put_metadata_row(db, name, jsonb).await?;

        let mut handles = self.backfill_tasks.lock().await;
        for index in &added {
            handles.push(self.spawn_backfill(db, name, &index.name));
        }
        Ok(())
    }

    /// Drops named indexes, then drops any shadow column no longer
    /// referenced by a remaining index.
    #[instrument(skip(self, names), fields(db = db, collection = name))]
    pub async fn indexes_drop(&self, db: &str, name: &str, names: &[String]) -> Result<()> {
        self.ensure_loaded(db).await?;
        let mut catalog = self.catalog.write().await;
        let Some(db_catalog) = catalog.get_mut(db) else { return Ok(()) };
        let Some(entry) = db_catalog.get_mut(name) else { return Ok(()) };

        let before_fields = entry.collection.indexed_fields();
        let mut dropped_sanitized = Vec::new();
        entry.collection.indexes.retain(|idx| {
            if names.contains(&idx.name) {
                dropped_sanitized.push(idx.sanitized_name.clone());
                false
            } else {
                true
            }
        });

        for sanitized in &dropped_sanitized {
            self.storage.drop_index(db, &entry.collection.table_name, sanitized).await?;
        }

        let after_fields = entry.collection.indexed_fields();
        let orphaned: Vec<String> = before_fields.into_iter().filter(|f| !after_fields.contains(f)).collect();
        let dropped_columns: Vec<String> = orphaned.iter().flat_map(|f| schema::shadow_columns(f)).collect();
        if !dropped_columns.is_empty() {
            self.storage.alter_table_drop_columns(db, &entry.collection.table_name, &dropped_columns).await?;
        }

        let jsonb = serde_json::to_string(&entry.collection).expect("Collection is always JSON-serializable");
        self.storage.put_metadata_row(db, name, jsonb).await?;
        Ok(())
    }

    fn spawn_backfill(self: &Arc<Self>, db: &str, collection: &str, index_name: &str) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let db = db.to_string();
        let collection = collection.to_string();
        let index_name = index_name.to_string();
        let page_size = self.backfill_page_size;
        tokio::spawn(async move {
            match crate::index::backfill(&registry, &db, &collection, &index_name, page_size).await {
                Ok(()) => {
                    if let Err(e) = registry.mark_index_ready(&db, &collection, &index_name).await {
                        warn!(db = %db, collection = %collection, index = %index_name, error = %e, "failed to persist index readiness");
                    } else {
                        debug!(db = %db, collection = %collection, index = %index_name, "index back-fill complete, marked ready");
                    }
                }
                Err(e) => warn!(db = %db, collection = %collection, index = %index_name, error = %e, "index back-fill failed"),
            }
        })
    }

    /// Marks `index_name` on `collection` ready, persisting the updated
    /// snapshot. Called by the back-fill task once it drains the table.
    pub(crate) async fn mark_index_ready(&self, db: &str, collection: &str, index_name: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let Some(db_catalog) = catalog.get_mut(db) else { return Ok(()) };
        let Some(entry) = db_catalog.get_mut(collection) else { return Ok(()) };
        for index in &mut entry.collection.indexes {
            if index.name == index_name {
                index.ready = true;
            }
        }
        let jsonb = serde_json::to_string(&entry.collection).expect("Collection is always JSON-serializable");
        self.storage.put_metadata_row(db, collection, jsonb).await
    }

    /// Aborts every outstanding back-fill task. The only supported way to
    /// stop a back-fill, since tasks are spawned detached from any
    /// triggering request's own cancellation.
    pub async fn shutdown(&self) {
        let mut handles = self.backfill_tasks.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Access to the underlying storage client, for write/query callers
    /// that need to issue DML directly against a collection's table.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

/// Warns (at most the caller decides how often) that a caller-requested
/// descending index key is accepted but not honored.
pub fn warn_descending_ignored(field: &str) {
    warn!(field = %field, "descending index keys are accepted but ignored at the storage layer");
}

#[allow(dead_code)]
fn _assert_column_order_len() {
    let _: [crate::types::ColumnAlias; 5] = COLUMN_ORDER;
}
