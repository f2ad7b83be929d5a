//! End-to-end tests exercising the adapter's moving parts together:
//! [`docbridge::backend`], [`docbridge::collection`], [`docbridge::registry`],
//! and [`docbridge::query`], all driven against the in-memory
//! [`docbridge::storage::InMemoryStorageClient`] fake.

use docbridge::prelude::*;
use docbridge::query;
use docbridge::registry::{IndexInfo, IndexKeyPair};

fn backend() -> Backend<InMemoryStorageClient> {
    let config = Config::parse("grpc://localhost:2136/root").unwrap();
    Backend::new(config, InMemoryStorageClient::new())
}

/// Three `_id`s of different BSON types never cross-match, and each is
/// independently findable.
#[tokio::test]
async fn heterogeneous_id_round_trips_without_cross_matching() {
    let backend = backend();
    let coll = backend.collection("db", "widgets");
    let oid = ObjectId::parse_str("0102030405060708090a0b0c").unwrap();

    coll.insert_many(&[doc! { "_id": "s" }, doc! { "_id": 42 }, doc! { "_id": oid }]).await.unwrap();

    assert_eq!(coll.count(&doc! {}).await.unwrap(), 3);
    assert_eq!(coll.find_one(&doc! { "_id": 42 }).await.unwrap(), Some(doc! { "_id": 42 }));
    assert_eq!(coll.find_one(&doc! { "_id": "s" }).await.unwrap(), Some(doc! { "_id": "s" }));
    assert_eq!(coll.find_one(&doc! { "_id": oid }).await.unwrap(), Some(doc! { "_id": oid }));
    assert!(coll.find_one(&doc! { "_id": "42" }).await.unwrap().is_none());
}

/// A numeric value one above the safe-double range gets its `$eq` filter
/// rewritten into a strict inequality against the safe-range boundary
/// instead of an exact-equality JSON-path comparison, since doubles can't
/// distinguish values past `2^53 - 1`.
#[tokio::test]
async fn numeric_value_above_safe_range_is_clamped_in_translation() {
    let backend = backend();
    let coll = backend.collection("db", "widgets");
    coll.insert_one(&doc! { "_id": "big", "v": 9_007_199_254_740_992i64 }).await.unwrap();

    let widgets = backend.collection_list("db").await.unwrap().into_iter().find(|c| c.name == "widgets").unwrap();
    let translation = query::translate(&doc! { "v": 9_007_199_254_740_992i64 }, &widgets.indexes);
    assert!(translation.where_clause.contains('>'));
    assert_eq!(translation.params[0].value, Bson::Int64(9_007_199_254_740_991));
}

/// A ready index on `name` pushes an `$eq` filter through the indexed
/// shadow-column form and recommends a secondary index; `$ne` always falls
/// back to the `_jsonb` JSON-path scan and recommends none.
#[tokio::test]
async fn ready_index_changes_translation_for_eq_but_not_ne() {
    let backend = backend();
    let coll = backend.collection("db", "widgets");
    coll.create_indexes(vec![IndexInfo {
        name: "by_name".to_string(),
        sanitized_name: "by_name_idx".to_string(),
        key: vec![IndexKeyPair { field: "name".to_string(), descending: false }],
        unique: false,
        ready: true,
    }])
    .await
    .unwrap();

    let mut ready = false;
    let mut widgets = backend.collection_list("db").await.unwrap().into_iter().find(|c| c.name == "widgets").unwrap();
    for _ in 0..200 {
        widgets = backend.collection_list("db").await.unwrap().into_iter().find(|c| c.name == "widgets").unwrap();
        if widgets.indexes.iter().any(|i| i.name == "by_name" && i.ready) {
            ready = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(ready, "index back-fill never completed");
    assert_eq!(widgets.indexed_fields(), vec!["name".to_string()]);

    let eq_translation = query::translate(&doc! { "name": "a" }, &widgets.indexes);
    assert!(eq_translation.secondary_index.is_some());
    assert!(!eq_translation.where_clause.contains("JSON_EXISTS"));

    let ne_translation = query::translate(&doc! { "name": { "$ne": "a" } }, &widgets.indexes);
    assert!(ne_translation.secondary_index.is_none());
    assert!(ne_translation.where_clause.contains("JSON_EXISTS"));
    backend.shutdown().await;
}

/// A capped collection preserves insertion order via `_ferretdb_record_id`;
/// `{$natural: -1}` returns it reversed.
#[tokio::test]
async fn capped_collection_natural_sort_is_reverse_insertion_order() {
    let backend = backend();
    let coll = backend.collection("db", "events");
    coll.create(CollectionSettings { capped_size: 1 << 20, capped_documents: 0 }).await.unwrap();

    coll.insert_one(&doc! { "_id": 1 }).await.unwrap();
    coll.insert_one(&doc! { "_id": 2 }).await.unwrap();
    coll.insert_one(&doc! { "_id": 3 }).await.unwrap();

    let ids: Vec<i32> = coll
        .find(&doc! {}, Some(&doc! { "$natural": -1 }), None)
        .await
        .unwrap()
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|item| item.into_document().get_i32("_id").unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

/// Creating an index against an already-populated collection marks it
/// not-ready immediately, then ready once back-fill completes; the filter's
/// translated form tracks that transition.
#[tokio::test]
async fn index_backfill_flips_readiness_and_translation() {
    let backend = backend();
    let coll = backend.collection("db", "widgets");
    coll.insert_many(&[doc! { "_id": 1, "name": "a" }, doc! { "_id": 2, "name": "b" }]).await.unwrap();

    coll.create_indexes(vec![IndexInfo {
        name: "by_name".to_string(),
        sanitized_name: "by_name_idx".to_string(),
        key: vec![IndexKeyPair { field: "name".to_string(), descending: false }],
        unique: false,
        ready: false,
    }])
    .await
    .unwrap();

    let mut ready = false;
    for _ in 0..200 {
        let indexes = backend.collection_list("db").await.unwrap();
        let widgets = indexes.iter().find(|c| c.name == "widgets").unwrap();
        if widgets.indexes.iter().any(|i| i.name == "by_name" && i.ready) {
            ready = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(ready, "index back-fill never completed");

    let widgets = backend.collection_list("db").await.unwrap().into_iter().find(|c| c.name == "widgets").unwrap();
    let translation = query::translate(&doc! { "name": "a" }, &widgets.indexes);
    assert!(translation.secondary_index.is_some());
    backend.shutdown().await;
}

/// Renaming a collection and reloading the catalog from scratch (simulating
/// a process restart) keeps the table name and drops the old entry.
#[tokio::test]
async fn rename_survives_catalog_reload() {
    let storage = InMemoryStorageClient::new();
    let registry = std::sync::Arc::new(docbridge::registry::Registry::new(
        std::sync::Arc::new(storage),
        docbridge::config::DEFAULT_BACKFILL_PAGE_SIZE,
    ));

    registry.collection_create("db", "c", CollectionSettings::default(), vec![]).await.unwrap();
    let original = registry.collection_get("db", "c").await.unwrap().unwrap();
    registry.collection_rename("db", "c", "c2").await.unwrap();

    let reloaded = std::sync::Arc::new(docbridge::registry::Registry::new(
        registry.storage().clone(),
        docbridge::config::DEFAULT_BACKFILL_PAGE_SIZE,
    ));
    assert!(reloaded.collection_get("db", "c").await.unwrap().is_none());
    let renamed = reloaded.collection_get("db", "c2").await.unwrap().unwrap();
    assert_eq!(renamed.table_name, original.table_name);
}
