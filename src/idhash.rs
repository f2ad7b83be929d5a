//! Deterministic hashing of a document's `_id` into the fixed-width prefix
//! used as the leading component of its physical primary key.

use bson::Bson;
use fnv::FnvHasher;
use std::hash::Hasher;

use crate::types::BsonType;

/// Computes the 64-bit FNV-1a hash of `canonical-JSON(id) || 0x00 ||
/// bsontype(id)`.
///
/// Hashing the BSON type tag alongside the value keeps `_id` values that are
/// equal as JSON but distinct as BSON (the string `"1"` versus the int `1`)
/// from colliding by construction; the type tag only disambiguates inputs
/// that canonical JSON alone cannot.
pub fn id_hash(id: &Bson) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(canonical_json(id).as_bytes());
    hasher.write_u8(0x00);
    hasher.write(bsontype_tag(id).as_bytes());
    hasher.finish()
}

/// The type tag hashed alongside a canonical-JSON `_id`. Falls back to the
/// BSON variant's own name for types outside [`BsonType`]'s indexable set
/// (documents may legally use e.g. a binary `_id`).
fn bsontype_tag(value: &Bson) -> std::borrow::Cow<'static, str> {
    match BsonType::of(value) {
        Some(t) => std::borrow::Cow::Borrowed(t.as_str()),
        None => std::borrow::Cow::Owned(format!("{:?}", value.element_type())),
    }
}

/// Renders `value` as canonical JSON: object keys sorted lexicographically
/// and no insignificant whitespace, so that two BSON documents which are
/// equal as trees always hash identically regardless of field order.
///
/// BSON-specific types (`ObjectId`, `DateTime`, ...) are rendered through
/// their `Display` or a stable textual form rather than MongoDB's
/// `$oid`/`$date` extended-JSON wrappers, since this is an internal hashing
/// format, not an interchange one.
pub fn canonical_json(value: &Bson) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Bson, out: &mut String) {
    match value {
        Bson::Null => out.push_str("null"),
        Bson::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Bson::Int32(n) => out.push_str(&n.to_string()),
        Bson::Int64(n) => out.push_str(&n.to_string()),
        Bson::Double(d) => out.push_str(&canonical_double(*d)),
        Bson::String(s) => write_json_string(s, out),
        Bson::ObjectId(oid) => write_json_string(&oid.to_hex(), out),
        Bson::DateTime(dt) => write_json_string(&dt.try_to_rfc3339_string().unwrap_or_default(), out),
        Bson::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Bson::Document(doc) => {
            let mut keys: Vec<&String> = doc.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(doc.get(key).expect("key from doc.keys()"), out);
            }
            out.push('}');
        }
        other => write_json_string(&other.to_string(), out),
    }
}

fn canonical_double(d: f64) -> String {
    if d == d.trunc() && d.is_finite() && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn hash_is_deterministic() {
        let id = Bson::String("widget-1".to_string());
        assert_eq!(id_hash(&id), id_hash(&id));
    }

    #[test]
    fn distinct_types_with_same_json_do_not_collide() {
        let as_string = Bson::String("1".to_string());
        let as_int = Bson::Int32(1);
        assert_ne!(id_hash(&as_string), id_hash(&as_int));
    }

    #[test]
    fn object_key_order_does_not_affect_hash() {
        let a = Bson::Document(doc! { "x": 1, "y": 2 });
        let b = Bson::Document(doc! { "y": 2, "x": 1 });
        assert_eq!(id_hash(&a), id_hash(&b));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = Bson::Document(doc! { "b": 1, "a": 2 });
        assert_eq!(canonical_json(&value), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn object_id_hashes_by_hex() {
        let oid = ObjectId::new();
        let a = Bson::ObjectId(oid);
        let b = Bson::ObjectId(oid);
        assert_eq!(id_hash(&a), id_hash(&b));
    }
}
