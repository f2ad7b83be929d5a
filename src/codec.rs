//! Extended-JSON-flavored encoding of BSON documents for the `_jsonb`
//! column, precise enough to round-trip every BSON type this adapter
//! supports byte-for-byte (a plain `serde_json::Value` round-trip would
//! lose the `ObjectId`/`DateTime`/`Int32` vs `Int64` distinction).

use bson::{oid::ObjectId, Bson, DateTime, Document};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Serializes `doc` to its `_jsonb` text form.
pub fn encode(doc: &Document) -> String {
    bson_to_json(&Bson::Document(doc.clone())).to_string()
}

/// Parses a `_jsonb` text form back into a `Document`.
pub fn decode(text: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::invariant(format!("_jsonb is not valid JSON: {e}")))?;
    match json_to_bson(&value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(Error::invariant(format!("_jsonb did not decode to a document: {other:?}"))),
    }
}

fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::Number((*n).into()),
        Bson::Int64(n) => tagged("$numberLong", Value::String(n.to_string())),
        Bson::Double(d) => tagged("$numberDouble", Value::String(d.to_string())),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => tagged("$oid", Value::String(oid.to_hex())),
        Bson::DateTime(dt) => tagged("$date", Value::String(dt.timestamp_millis().to_string())),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => {
            let mut map = Map::new();
            for (k, v) in doc {
                map.insert(k.clone(), bson_to_json(v));
            }
            Value::Object(map)
        }
        other => Value::String(other.to_string()),
    }
}

fn tagged(tag: &str, inner: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), inner);
    Value::Object(map)
}

fn json_to_bson(value: &Value) -> Result<Bson> {
    match value {
        Value::Null => Ok(Bson::Null),
        Value::Bool(b) => Ok(Bson::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(i32_val) = i32::try_from(i) {
                    return Ok(Bson::Int32(i32_val));
                }
                return Ok(Bson::Int64(i));
            }
            n.as_f64().map(Bson::Double).ok_or_else(|| Error::invariant("number is not representable"))
        }
        Value::String(s) => Ok(Bson::String(s.clone())),
        Value::Array(items) => items.iter().map(json_to_bson).collect::<Result<Vec<_>>>().map(Bson::Array),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(s)) = map.get("$oid") {
                    return ObjectId::parse_str(s)
                        .map(Bson::ObjectId)
                        .map_err(|e| Error::invariant(format!("invalid $oid: {e}")));
                }
                if let Some(Value::String(s)) = map.get("$numberLong") {
                    return s.parse::<i64>().map(Bson::Int64).map_err(|e| Error::invariant(format!("invalid $numberLong: {e}")));
                }
                if let Some(Value::String(s)) = map.get("$numberDouble") {
                    return s.parse::<f64>().map(Bson::Double).map_err(|e| Error::invariant(format!("invalid $numberDouble: {e}")));
                }
                if let Some(Value::String(s)) = map.get("$date") {
                    let millis: i64 = s.parse().map_err(|e| Error::invariant(format!("invalid $date: {e}")))?;
                    return Ok(Bson::DateTime(DateTime::from_millis(millis)));
                }
            }
            let mut doc = Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), json_to_bson(v)?);
            }
            Ok(Bson::Document(doc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn round_trips_heterogeneous_document() {
        let oid = ObjectId::new();
        let original = doc! {
            "_id": oid,
            "name": "alice",
            "age": 30i32,
            "big": 9_007_199_254_740_992i64,
            "score": 3.25,
            "active": true,
            "created": DateTime::now(),
            "tags": ["a", "b"],
            "nested": { "x": 1 },
            "missing": Bson::Null,
        };

        let text = encode(&original);
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn int32_stays_int32_after_round_trip() {
        let original = doc! { "v": 5i32 };
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded.get("v"), Some(&Bson::Int32(5)));
    }
}
