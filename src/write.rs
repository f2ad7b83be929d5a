//! Encodes documents into physical rows and batches the insert/update/delete
//! write path against a [`StorageClient`].

use bson::{Bson, Document};

use crate::codec;
use crate::error::{Error, Result};
use crate::idhash::id_hash;
use crate::schema::shadow_column_name;
use crate::storage::{Row, StorageClient, StorageValue};
use crate::types::{encode_ordered_double, BsonType, COLUMN_ORDER};

/// Encodes one indexable value into the shadow-column storage type for its
/// BSON type. Infallible: every [`BsonType`] has exactly one physical
/// representation.
pub fn encode_storage_value(bson_type: BsonType, value: &Bson) -> StorageValue {
    match (bson_type, value) {
        (BsonType::String, Bson::String(s)) => StorageValue::Utf8(s.clone()),
        (BsonType::ObjectId, Bson::ObjectId(oid)) => StorageValue::Utf8(oid.to_hex()),
        (BsonType::Bool, Bson::Boolean(b)) => StorageValue::Bool(*b),
        (BsonType::Date, Bson::DateTime(dt)) => StorageValue::Int64(dt.timestamp_millis()),
        (BsonType::Int, Bson::Int32(n)) => StorageValue::Int64(*n as i64),
        (BsonType::Long, Bson::Int64(n)) => StorageValue::Int64(*n),
        (BsonType::Double, Bson::Double(d)) => StorageValue::Int64(encode_ordered_double(*d) as i64),
        _ => unreachable!("encode_storage_value called with mismatched type tag and value"),
    }
}

/// Encodes `doc` into its physical row: `id_hash`, the five `_id_<alias>`
/// shadow columns (exactly one populated), `_jsonb`, a shadow-column set for
/// each of `indexed_fields`, and `_ferretdb_record_id` if `record_id` is
/// supplied (capped collections only).
pub fn encode_document(doc: &Document, indexed_fields: &[String], record_id: Option<i64>) -> Result<Row> {
    let id = doc.get("_id").ok_or_else(|| Error::missing_field("document has no `_id` field"))?;
    let id_type = BsonType::of(id)
        .ok_or_else(|| Error::unsupported_bson_type(format!("_id has unsupported BSON type {:?}", id.element_type())))?;

    let mut row = Row::new();
    row.insert("id_hash".to_string(), StorageValue::Int64(id_hash(id) as i64));
    encode_shadow_columns(&mut row, "_id", Some((id_type, id)));
    row.insert("_jsonb".to_string(), StorageValue::Json(codec::encode(doc)));

    for field in indexed_fields {
        let resolved = crate::storage::resolve_path(doc, field);
        let typed = resolved.as_deref().and_then(|v| BsonType::of(v).map(|t| (t, v)));
        encode_shadow_columns(&mut row, field, typed.map(|(t, v)| (t, v.clone())).as_ref().map(|(t, v)| (*t, v)));
    }

    if let Some(record_id) = record_id {
        row.insert("_ferretdb_record_id".to_string(), StorageValue::Int64(record_id));
    }

    Ok(row)
}

/// Populates all five shadow columns for `field`: the one matching `typed`'s
/// BSON type (if any) gets the encoded value, the other four get `NULL`.
fn encode_shadow_columns(row: &mut Row, field: &str, typed: Option<(BsonType, &Bson)>) {
    for alias in COLUMN_ORDER {
        let column = shadow_column_name(field, alias);
        match typed {
            Some((bson_type, value)) if bson_type.column_alias() == alias => {
                row.insert(column, encode_storage_value(bson_type, value));
            }
            _ => {
                row.insert(column, StorageValue::Null);
            }
        }
    }
}

/// Encodes and inserts `docs` in batches of at most `batch_size`, surfacing
/// the first [`Error::InsertDuplicateID`] a batch hits (the batches before it
/// have already been committed). `record_ids`, if given, must have the same
/// length as `docs` and supplies each row's `_ferretdb_record_id` (capped
/// collections only).
pub async fn insert_all<S: StorageClient>(
    storage: &S,
    db: &str,
    table: &str,
    docs: &[Document],
    indexed_fields: &[String],
    record_ids: Option<&[i64]>,
    batch_size: usize,
) -> Result<()> {
    let batch_size = batch_size.max(1);
    for (chunk_index, chunk) in docs.chunks(batch_size).enumerate() {
        let offset = chunk_index * batch_size;
        let rows = chunk
            .iter()
            .enumerate()
            .map(|(i, doc)| encode_document(doc, indexed_fields, record_ids.map(|ids| ids[offset + i])))
            .collect::<Result<Vec<_>>>()?;
        storage.insert_rows(db, table, rows).await?;
    }
    Ok(())
}

/// Encodes and upserts `docs` in batches, for replacement-style updates. See
/// [`insert_all`] for `record_ids`.
pub async fn update_all<S: StorageClient>(
    storage: &S,
    db: &str,
    table: &str,
    docs: &[Document],
    indexed_fields: &[String],
    record_ids: Option<&[i64]>,
    batch_size: usize,
) -> Result<()> {
    let batch_size = batch_size.max(1);
    for (chunk_index, chunk) in docs.chunks(batch_size).enumerate() {
        let offset = chunk_index * batch_size;
        let rows = chunk
            .iter()
            .enumerate()
            .map(|(i, doc)| encode_document(doc, indexed_fields, record_ids.map(|ids| ids[offset + i])))
            .collect::<Result<Vec<_>>>()?;
        storage.upsert_rows(db, table, rows).await?;
    }
    Ok(())
}

/// Deletes the documents whose `_id` is in `ids`, in batches, by their
/// `id_hash`. Returns the total number of rows removed.
pub async fn delete_all<S: StorageClient>(
    storage: &S,
    db: &str,
    table: &str,
    ids: &[Bson],
    batch_size: usize,
) -> Result<u64> {
    let mut total = 0;
    let hashes: Vec<u64> = ids.iter().map(id_hash).collect();
    for chunk in hashes.chunks(batch_size.max(1)) {
        total += storage.delete_by_id_hash(db, table, chunk).await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn encode_document_populates_matching_id_shadow_column_only() {
        let doc = doc! { "_id": "a", "name": "alice" };
        let row = encode_document(&doc, &[], None).unwrap();

        assert_eq!(row.get("_id_string"), Some(&StorageValue::Utf8("a".to_string())));
        assert_eq!(row.get("_id_objectId"), Some(&StorageValue::Null));
        assert_eq!(row.get("_id_scalar"), Some(&StorageValue::Null));
        assert_eq!(row.get("_id_date"), Some(&StorageValue::Null));
        assert_eq!(row.get("_id_bool"), Some(&StorageValue::Null));
        assert!(!row.contains_key("_ferretdb_record_id"));
    }

    #[test]
    fn encode_document_populates_indexed_field_shadow_columns() {
        let doc = doc! { "_id": "a", "name": "alice" };
        let row = encode_document(&doc, &["name".to_string()], None).unwrap();
        assert_eq!(row.get("name_string"), Some(&StorageValue::Utf8("alice".to_string())));
        assert_eq!(row.get("name_bool"), Some(&StorageValue::Null));
    }

    #[test]
    fn encode_document_leaves_shadow_columns_null_for_missing_field() {
        let doc = doc! { "_id": "a" };
        let row = encode_document(&doc, &["name".to_string()], None).unwrap();
        assert_eq!(row.get("name_string"), Some(&StorageValue::Null));
    }

    #[test]
    fn encode_document_rejects_missing_id() {
        let doc = doc! { "name": "alice" };
        let err = encode_document(&doc, &[], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingDocumentField);
    }

    #[test]
    fn encode_document_stamps_record_id() {
        let doc = doc! { "_id": "a" };
        let row = encode_document(&doc, &[], Some(7)).unwrap();
        assert_eq!(row.get("_ferretdb_record_id"), Some(&StorageValue::Int64(7)));
    }

    #[test]
    fn object_id_id_round_trips_through_jsonb() {
        let oid = ObjectId::new();
        let doc = doc! { "_id": oid };
        let row = encode_document(&doc, &[], None).unwrap();
        let Some(StorageValue::Json(jsonb)) = row.get("_jsonb") else { panic!("missing _jsonb") };
        assert_eq!(codec::decode(jsonb).unwrap(), doc);
    }

    #[tokio::test]
    async fn insert_all_batches_according_to_batch_size() {
        use crate::storage::InMemoryStorageClient;

        let storage = InMemoryStorageClient::new();
        storage.create_table("db", "t", &[]).await.unwrap();
        let docs: Vec<Document> = (0..5).map(|i| doc! { "_id": i, "v": i }).collect();
        insert_all(&storage, "db", "t", &docs, &[], None, 2).await.unwrap();

        let rows = storage.select("db", "t", &crate::storage::Predicate::True, &crate::storage::SelectOptions { limit: 100, ..Default::default() }).await.unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn delete_all_removes_matching_ids() {
        use crate::storage::InMemoryStorageClient;

        let storage = InMemoryStorageClient::new();
        storage.create_table("db", "t", &[]).await.unwrap();
        let docs: Vec<Document> = (0..3).map(|i| doc! { "_id": i }).collect();
        insert_all(&storage, "db", "t", &docs, &[], None, 10).await.unwrap();

        let removed = delete_all(&storage, "db", "t", &[Bson::Int32(0), Bson::Int32(1)], 10).await.unwrap();
        assert_eq!(removed, 2);
    }
}
