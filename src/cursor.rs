//! Streams documents out of a [`Collection::find`](crate::collection::Collection::find)
//! result set, grounded in the teacher crate's typed `Cursor` wrapper around
//! a driver cursor (here: a `Vec<Row>` already fetched by `select()`, since
//! the storage seam has no true server-side paging cursor of its own).

use bson::{Bson, Document};

use crate::error::{Error, Result};
use crate::storage::{Row, StorageValue};

/// What a [`Cursor`] yields per step.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorItem {
    /// A fully decoded document.
    Document(Document),
    /// Just the `_ferretdb_record_id`, wrapped in an otherwise-empty document
    /// under `"_ferretdb_record_id"` — used by
    /// [`Cursor::only_record_ids`] callers that only need ordering/dedup
    /// information and want to skip decoding `_jsonb` entirely.
    RecordId(i64),
}

/// A pull-based iterator over a finished `select()`'s rows.
///
/// Mirrors the teacher's `Next()`/`Close()` contract: once `advance()`
/// returns `None` or an error, the cursor is done and every subsequent call
/// also returns `None` (there is no retrying a failed fetch).
pub struct Cursor {
    rows: std::vec::IntoIter<Row>,
    only_record_ids: bool,
    done: bool,
}

impl Cursor {
    /// Wraps a batch of rows already fetched from storage.
    pub fn new(rows: Vec<Row>) -> Self {
        Cursor { rows: rows.into_iter(), only_record_ids: false, done: false }
    }

    /// Switches this cursor into record-id-only mode: `advance()` decodes
    /// only `_ferretdb_record_id` and skips `_jsonb` entirely.
    pub fn only_record_ids(mut self) -> Self {
        self.only_record_ids = true;
        self
    }

    /// Advances the cursor. Returns `Ok(None)` once exhausted. An error
    /// decoding one row ends the cursor for all subsequent calls, matching
    /// the teacher's "eagerly release on error" contract.
    pub fn advance(&mut self) -> Result<Option<CursorItem>> {
        if self.done {
            return Ok(None);
        }
        let Some(row) = self.rows.next() else {
            self.done = true;
            return Ok(None);
        };

        let item = if self.only_record_ids {
            decode_record_id(&row).map(CursorItem::RecordId)
        } else {
            decode_document(&row).map(CursorItem::Document)
        };

        match item {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Drains every remaining item eagerly. Equivalent to repeatedly calling
    /// [`Cursor::advance`]; provided for callers that don't need incremental
    /// streaming.
    pub fn collect_all(mut self) -> Result<Vec<CursorItem>> {
        let mut out = Vec::new();
        while let Some(item) = self.advance()? {
            out.push(item);
        }
        Ok(out)
    }
}

impl Iterator for Cursor {
    type Item = Result<CursorItem>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn decode_document(row: &Row) -> Result<Document> {
    match row.get("_jsonb") {
        Some(StorageValue::Json(s)) => crate::codec::decode(s),
        _ => Err(Error::invariant("row is missing a _jsonb column")),
    }
}

fn decode_record_id(row: &Row) -> Result<i64> {
    match row.get("_ferretdb_record_id") {
        Some(StorageValue::Int64(id)) => Ok(*id),
        _ => Err(Error::invariant("row is missing a _ferretdb_record_id column")),
    }
}

impl CursorItem {
    /// The document this item carries, or an empty document tagged with
    /// `_ferretdb_record_id` in [`CursorItem::RecordId`] mode.
    pub fn into_document(self) -> Document {
        match self {
            CursorItem::Document(doc) => doc,
            CursorItem::RecordId(id) => {
                let mut doc = Document::new();
                doc.insert("_ferretdb_record_id", Bson::Int64(id));
                doc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn row_with_doc(doc: &Document) -> Row {
        let mut row = Row::new();
        row.insert("_jsonb".to_string(), StorageValue::Json(crate::codec::encode(doc)));
        row
    }

    #[test]
    fn yields_documents_in_order_then_stops() {
        let a = doc! { "_id": 1 };
        let b = doc! { "_id": 2 };
        let mut cursor = Cursor::new(vec![row_with_doc(&a), row_with_doc(&b)]);

        assert_eq!(cursor.advance().unwrap(), Some(CursorItem::Document(a)));
        assert_eq!(cursor.advance().unwrap(), Some(CursorItem::Document(b)));
        assert_eq!(cursor.advance().unwrap(), None);
        assert_eq!(cursor.advance().unwrap(), None);
    }

    #[test]
    fn record_id_mode_skips_jsonb_decoding() {
        let mut row = Row::new();
        row.insert("_ferretdb_record_id".to_string(), StorageValue::Int64(42));
        let mut cursor = Cursor::new(vec![row]).only_record_ids();

        assert_eq!(cursor.advance().unwrap(), Some(CursorItem::RecordId(42)));
    }

    #[test]
    fn error_ends_the_cursor() {
        let mut cursor = Cursor::new(vec![Row::new()]);
        assert!(cursor.advance().is_err());
        assert_eq!(cursor.advance().unwrap(), None);
    }

    #[test]
    fn implements_std_iterator() {
        let a = doc! { "_id": 1 };
        let cursor = Cursor::new(vec![row_with_doc(&a)]);
        let collected: Vec<Document> = cursor.map(|r| r.unwrap().into_document()).collect();
        assert_eq!(collected, vec![a]);
    }
}
