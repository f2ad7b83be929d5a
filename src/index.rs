//! Background back-fill of shadow columns for an index created against an
//! already-populated collection.

use std::sync::Arc;

use bson::Document;

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::schema::shadow_column_name;
use crate::storage::{StorageClient, StorageValue};
use crate::types::{BsonType, COLUMN_ORDER};

/// Runs one index's back-fill to completion: pages through the table in
/// `id_hash` order, computing and upserting the shadow-column values for
/// `index_name`'s key fields on each row, reading `page_size` rows at a time
/// (see [`crate::config::Config::backfill_page_size`]). Idempotent and
/// crash-safe — each page is its own upsert, and re-running a finished
/// back-fill is a no-op because every shadow value it would write already
/// matches.
pub async fn backfill<S: StorageClient + 'static>(
    registry: &Arc<Registry<S>>,
    db: &str,
    collection: &str,
    index_name: &str,
    page_size: usize,
) -> Result<()> {
    let snapshot = registry
        .collection_get(db, collection)
        .await?
        .ok_or_else(|| Error::CollectionDoesNotExist { db: db.to_string(), collection: collection.to_string() })?;

    let index = snapshot
        .indexes
        .iter()
        .find(|i| i.name == index_name)
        .ok_or_else(|| Error::invariant(format!("index {index_name} vanished before back-fill started")))?;

    let fields: Vec<String> = index.key.iter().map(|k| k.field.clone()).collect();
    let storage = registry.storage();
    let table_name = &snapshot.table_name;

    let page_size = page_size.max(1);
    let mut last = 0u64;
    loop {
        let page = storage.scan_id_hash_page(db, table_name, last, page_size).await?;
        if page.is_empty() {
            break;
        }

        let mut patches = Vec::with_capacity(page.len());
        for row in &page {
            let Some(StorageValue::Int64(hash)) = row.get("id_hash") else { continue };
            last = last.max(*hash as u64);

            let Some(StorageValue::Json(jsonb)) = row.get("_jsonb") else { continue };
            let Ok(doc) = crate::codec::decode(jsonb) else { continue };

            let mut patch = crate::storage::Row::new();
            patch.insert("id_hash".to_string(), StorageValue::Int64(*hash));
            for field in &fields {
                apply_shadow_values(&doc, field, &mut patch);
            }
            patches.push(patch);
        }

        storage.backfill_upsert(db, table_name, patches).await?;
    }

    Ok(())
}

/// Resolves `field` in `doc` and, if it has an indexable BSON type,
/// populates its matching shadow column in `patch` (leaving the other four
/// `NULL`, mirroring column exclusivity at insert time).
fn apply_shadow_values(doc: &Document, field: &str, patch: &mut crate::storage::Row) {
    let Some(value) = crate::storage::resolve_path(doc, field) else { return };
    let Some(bson_type) = BsonType::of(&value) else { return };

    for alias in COLUMN_ORDER {
        let column = shadow_column_name(field, alias);
        if alias == bson_type.column_alias() {
            patch.insert(column, crate::write::encode_storage_value(bson_type, &value));
        } else {
            patch.insert(column, StorageValue::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CollectionSettings, IndexInfo, IndexKeyPair};
    use crate::storage::InMemoryStorageClient;
    use bson::doc;

    #[tokio::test]
    async fn backfill_populates_existing_rows_and_marks_ready() {
        let registry = Arc::new(Registry::new(Arc::new(InMemoryStorageClient::new()), crate::config::DEFAULT_BACKFILL_PAGE_SIZE));
        registry.collection_create("db", "widgets", CollectionSettings::default(), vec![]).await.unwrap();

        let encoded = crate::write::encode_document(&doc! { "_id": "a", "name": "alice" }, &[], None).unwrap();
        let table_name = registry.collection_get("db", "widgets").await.unwrap().unwrap().table_name;
        registry.storage().insert_rows("db", &table_name, vec![encoded]).await.unwrap();

        registry.indexes_create("db", "widgets", vec![IndexInfo {
            name: "by_name".into(),
            sanitized_name: String::new(),
            key: vec![IndexKeyPair { field: "name".into(), descending: false }],
            unique: false,
            ready: true,
        }]).await.unwrap();

        backfill(&registry, "db", "widgets", "by_name", crate::config::DEFAULT_BACKFILL_PAGE_SIZE).await.unwrap();
        registry.mark_index_ready("db", "widgets", "by_name").await.unwrap();

        let collection = registry.collection_get("db", "widgets").await.unwrap().unwrap();
        assert!(collection.indexes.iter().find(|i| i.name == "by_name").unwrap().ready);

        let rows = registry.storage().scan_id_hash_page("db", &table_name, 0, 10).await.unwrap();
        assert_eq!(rows[0].get("name_string"), Some(&StorageValue::Utf8("alice".to_string())));
    }

    #[tokio::test]
    async fn backfill_with_page_size_one_still_drains_every_row() {
        let registry = Arc::new(Registry::new(Arc::new(InMemoryStorageClient::new()), 1));
        registry.collection_create("db", "widgets", CollectionSettings::default(), vec![]).await.unwrap();

        let table_name = registry.collection_get("db", "widgets").await.unwrap().unwrap().table_name;
        for i in 0..5 {
            let encoded = crate::write::encode_document(&doc! { "_id": i, "name": format!("n{i}") }, &[], None).unwrap();
            registry.storage().insert_rows("db", &table_name, vec![encoded]).await.unwrap();
        }

        registry.indexes_create("db", "widgets", vec![IndexInfo {
            name: "by_name".into(),
            sanitized_name: String::new(),
            key: vec![IndexKeyPair { field: "name".into(), descending: false }],
            unique: false,
            ready: true,
        }]).await.unwrap();

        backfill(&registry, "db", "widgets", "by_name", 1).await.unwrap();

        let rows = registry.storage().scan_id_hash_page("db", &table_name, 0, 100).await.unwrap();
        assert_eq!(rows.len(), 5);
        let mut backfilled: Vec<String> = rows
            .iter()
            .map(|row| match row.get("name_string") {
                Some(StorageValue::Utf8(s)) => s.clone(),
                other => panic!("expected a populated name_string shadow column, got {other:?}"),
            })
            .collect();
        backfilled.sort();
        assert_eq!(backfilled, vec!["n0", "n1", "n2", "n3", "n4"]);
    }
}
