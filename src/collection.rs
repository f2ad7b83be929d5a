//! The public CRUD surface: a handle to one collection within one database,
//! wiring the registry, query translator, write path, and cursor together —
//! the teacher crate's `Collection<T>` reshaped for schemaless documents.

use std::sync::Arc;

use bson::{Bson, Document};
use tracing::instrument;

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::query;
use crate::registry::{CollectionSettings, IndexInfo, Registry};
use crate::storage::{SelectOptions, StorageClient};
use crate::write;

/// A handle to one collection in one database. Cheap to clone (an `Arc`
/// registry handle plus two owned strings); every method re-reads the
/// collection's current schema snapshot, so a handle never goes stale.
#[derive(Clone)]
pub struct Collection<S: StorageClient> {
    registry: Arc<Registry<S>>,
    db: String,
    name: String,
    default_limit: u32,
    batch_size: usize,
}

/// The outcome of a batch update/upsert, mirroring the teacher's
/// `UpdateManyResult`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateManyResult {
    /// Number of documents written.
    pub num_matched: usize,
}

impl<S: StorageClient + 'static> Collection<S> {
    /// Constructs a handle. Exposed to [`crate::backend::Backend`], which
    /// owns the `Registry` and `Config` every handle it hands out shares.
    pub(crate) fn new(registry: Arc<Registry<S>>, db: String, name: String, default_limit: u32, batch_size: usize) -> Self {
        Collection { registry, db, name, default_limit, batch_size }
    }

    /// The owning database's name.
    pub fn database(&self) -> &str {
        &self.db
    }

    /// This collection's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the collection (with no indexes beyond the implicit `_id_`
    /// one) if it doesn't already exist. Returns whether it was created.
    #[instrument(skip(self), fields(db = %self.db, collection = %self.name))]
    pub async fn create(&self, settings: CollectionSettings) -> Result<bool> {
        self.registry.collection_create(&self.db, &self.name, settings, vec![]).await
    }

    /// Drops this collection. Returns whether it existed.
    #[instrument(skip(self), fields(db = %self.db, collection = %self.name))]
    pub async fn drop(&self) -> Result<bool> {
        self.registry.collection_drop(&self.db, &self.name).await
    }

    /// Renames this collection in place (the handle keeps pointing at the
    /// same underlying table under its new name).
    #[instrument(skip(self), fields(db = %self.db, collection = %self.name, new_name = new_name))]
    pub async fn rename(&mut self, new_name: &str) -> Result<bool> {
        let renamed = self.registry.collection_rename(&self.db, &self.name, new_name).await?;
        if renamed {
            self.name = new_name.to_string();
        }
        Ok(renamed)
    }

    /// Declares indexes on this collection, creating it first if absent.
    #[instrument(skip(self, indexes), fields(db = %self.db, collection = %self.name))]
    pub async fn create_indexes(&self, indexes: Vec<IndexInfo>) -> Result<()> {
        self.registry.indexes_create(&self.db, &self.name, indexes).await
    }

    /// Inserts every document in `docs`, auto-creating the collection if it
    /// doesn't exist yet (matching MongoDB's implicit-collection-creation
    /// semantics). Fails the whole call on the first duplicate `_id`.
    #[instrument(skip(self, docs), fields(db = %self.db, collection = %self.name, count = docs.len()))]
    pub async fn insert_many(&self, docs: &[Document]) -> Result<()> {
        let snapshot = self.ensure_collection().await?;
        let indexed_fields = snapshot.indexed_fields();
        let record_ids = self.allocate_record_ids(docs.len()).await?;
        write::insert_all(
            self.registry.storage().as_ref(),
            &self.db,
            &snapshot.table_name,
            docs,
            &indexed_fields,
            record_ids.as_deref(),
            self.batch_size,
        )
        .await
    }

    /// Inserts a single document.
    pub async fn insert_one(&self, doc: &Document) -> Result<()> {
        self.insert_many(std::slice::from_ref(doc)).await
    }

    /// Replaces (upserts) every document in `docs` by its `_id`.
    #[instrument(skip(self, docs), fields(db = %self.db, collection = %self.name, count = docs.len()))]
    pub async fn update_many(&self, docs: &[Document]) -> Result<UpdateManyResult> {
        let snapshot = self.require_collection().await?;
        let indexed_fields = snapshot.indexed_fields();
        let record_ids = self.allocate_record_ids(docs.len()).await?;
        write::update_all(
            self.registry.storage().as_ref(),
            &self.db,
            &snapshot.table_name,
            docs,
            &indexed_fields,
            record_ids.as_deref(),
            self.batch_size,
        )
        .await?;
        Ok(UpdateManyResult { num_matched: docs.len() })
    }

    /// Deletes every document whose `_id` is in `ids`. Returns the number
    /// of rows actually removed (a collection that doesn't exist removes
    /// zero, never an error).
    #[instrument(skip(self, ids), fields(db = %self.db, collection = %self.name, count = ids.len()))]
    pub async fn delete_many(&self, ids: &[Bson]) -> Result<u64> {
        let Some(snapshot) = self.registry.collection_get(&self.db, &self.name).await? else { return Ok(0) };
        write::delete_all(self.registry.storage().as_ref(), &self.db, &snapshot.table_name, ids, self.batch_size).await
    }

    /// Deletes a single document by `_id`.
    pub async fn delete_one(&self, id: &Bson) -> Result<bool> {
        Ok(self.delete_many(std::slice::from_ref(id)).await? > 0)
    }

    /// Finds every document matching `filter`, applying `sort`'s `$natural`
    /// direction (if any) and `limit` (defaulting to this handle's
    /// configured default). A collection that doesn't exist yields an empty
    /// cursor, matching MongoDB's "query a nonexistent collection" semantics.
    #[instrument(skip(self, filter, sort), fields(db = %self.db, collection = %self.name))]
    pub async fn find(&self, filter: &Document, sort: Option<&Document>, limit: Option<u32>) -> Result<Cursor> {
        let Some(snapshot) = self.registry.collection_get(&self.db, &self.name).await? else {
            return Ok(Cursor::new(Vec::new()));
        };

        let translation = query::translate(filter, &snapshot.indexes);
        let opts = SelectOptions { natural_order: query::natural_sort(sort), limit: limit.unwrap_or(self.default_limit) };
        let rows = self.registry.storage().select(&self.db, &snapshot.table_name, &translation.predicate, &opts).await?;
        Ok(Cursor::new(rows))
    }

    /// Finds the first document matching `filter`, if any.
    pub async fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        let mut cursor = self.find(filter, None, Some(1)).await?;
        Ok(cursor.advance()?.map(|item| item.into_document()))
    }

    /// Counts documents matching `filter`.
    pub async fn count(&self, filter: &Document) -> Result<u64> {
        let Some(snapshot) = self.registry.collection_get(&self.db, &self.name).await? else { return Ok(0) };
        let translation = query::translate(filter, &snapshot.indexes);
        let opts = SelectOptions { natural_order: None, limit: u32::MAX };
        let rows = self.registry.storage().select(&self.db, &snapshot.table_name, &translation.predicate, &opts).await?;
        Ok(rows.len() as u64)
    }

    /// Ensures the collection exists, creating it with no extra indexes if
    /// absent, and returns its current snapshot.
    async fn ensure_collection(&self) -> Result<crate::registry::Collection> {
        self.registry.collection_create(&self.db, &self.name, CollectionSettings::default(), vec![]).await?;
        self.require_collection().await
    }

    async fn require_collection(&self) -> Result<crate::registry::Collection> {
        self.registry
            .collection_get(&self.db, &self.name)
            .await?
            .ok_or_else(|| Error::CollectionDoesNotExist { db: self.db.clone(), collection: self.name.clone() })
    }

    /// Draws `count` sequential `_ferretdb_record_id`s from the registry, or
    /// `None` if this collection isn't capped.
    async fn allocate_record_ids(&self, count: usize) -> Result<Option<Vec<i64>>> {
        let Some(first) = self.registry.next_record_id(&self.db, &self.name).await? else { return Ok(None) };
        if count <= 1 {
            return Ok(Some(vec![first; count]));
        }
        let mut ids = Vec::with_capacity(count);
        ids.push(first);
        for _ in 1..count {
            let Some(id) = self.registry.next_record_id(&self.db, &self.name).await? else {
                unreachable!("collection stopped being capped mid-batch")
            };
            ids.push(id);
        }
        Ok(Some(ids))
    }
}

impl<S: StorageClient> std::fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Collection({}.{})", self.db, self.name)
    }
}
