//! Translates a filter [`Document`] into a predicate tree plus the textual
//! WHERE clause, typed parameters, and index hint a real backend would need.

use bson::{Bson, Document};

use crate::idhash::id_hash;
use crate::registry::IndexInfo;
use crate::schema::shadow_column_name;
use crate::storage::{Op, Predicate};
use crate::types::{BsonType, COLUMN_ORDER, MAX_SAFE_DOUBLE};

/// Mints the placeholder names a rendered WHERE clause binds parameters to.
/// `allocate()` yields `$f1, $f2, …`; `named(x)` yields `$f_<x>` and never
/// collides with an `allocate()` output, since `allocate()` never emits an
/// underscore-prefixed index.
#[derive(Debug, Default)]
pub struct PlaceholderAllocator {
    next: u32,
}

impl PlaceholderAllocator {
    /// A fresh allocator starting at `$f1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next sequential placeholder.
    pub fn allocate(&mut self) -> String {
        self.next += 1;
        format!("$f{}", self.next)
    }

    /// Mints a named placeholder, e.g. for a caller-supplied value that
    /// should be self-documenting in logs.
    pub fn named(&self, name: &str) -> String {
        format!("$f_{name}")
    }
}

/// One bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// The placeholder this value is bound to.
    pub placeholder: String,
    /// The value, already converted to its storage-native form.
    pub value: Bson,
}

/// The result of translating a filter document.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// The rendered `WHERE` clause (empty string means "match everything").
    pub where_clause: String,
    /// Parameters bound to the clause's placeholders, in emission order.
    pub params: Vec<Param>,
    /// The secondary index the translator recommends pushing through, if any.
    pub secondary_index: Option<String>,
    /// The executable predicate tree equivalent to `where_clause`.
    pub predicate: Predicate,
}

/// Translates `filter` against a collection's indexes (only the key list and
/// readiness flag are consulted). `$`-prefixed top-level keys (sort hints
/// and similar) are ignored here; see [`natural_sort`].
pub fn translate(filter: &Document, indexes: &[IndexInfo]) -> Translation {
    let mut alloc = PlaceholderAllocator::new();
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut predicates = Vec::new();
    let mut secondary_index = None;

    for (root_key, raw_val) in filter {
        if root_key.starts_with('$') {
            continue;
        }

        for (op, value) in extract_conditions(raw_val) {
            let Some(bson_type) = BsonType::of(&value) else { continue };

            if root_key == "_id" && op == Op::Eq {
                render_primary_key(&value, bson_type, &mut alloc, &mut clauses, &mut params);
                predicates.push(Predicate::Field { path: root_key.clone(), op, value });
                continue;
            }

            if op == Op::Eq {
                if let Some(index) = indexes.iter().find(|idx| {
                    idx.ready && idx.key.iter().any(|kp| kp.field == *root_key)
                }) {
                    render_indexed_scalar(root_key, &value, bson_type, &mut alloc, &mut clauses, &mut params);
                    secondary_index = Some(index.sanitized_name.clone());
                    predicates.push(Predicate::Field { path: root_key.clone(), op, value });
                    continue;
                }
            }

            render_json_path(root_key, op.clone(), &value, bson_type, &mut alloc, &mut clauses, &mut params);
            predicates.push(Predicate::Field { path: root_key.clone(), op, value });
        }
    }

    Translation {
        where_clause: clauses.join(" AND "),
        params,
        secondary_index,
        predicate: if predicates.is_empty() { Predicate::True } else { Predicate::And(predicates) },
    }
}

/// Extracts `(op, value)` pairs from one filter entry's right-hand side:
/// a bare scalar is `$eq`; a document is scanned for `$eq`/`$ne` keys.
fn extract_conditions(raw_val: &Bson) -> Vec<(Op, Bson)> {
    match raw_val {
        Bson::Document(inner) => inner
            .iter()
            .filter_map(|(k, v)| match k.as_str() {
                "$eq" => Some((Op::Eq, v.clone())),
                "$ne" => Some((Op::Ne, v.clone())),
                _ => None,
            })
            .collect(),
        scalar => vec![(Op::Eq, scalar.clone())],
    }
}

fn render_primary_key(
    value: &Bson,
    bson_type: BsonType,
    alloc: &mut PlaceholderAllocator,
    clauses: &mut Vec<String>,
    params: &mut Vec<Param>,
) {
    let hash_placeholder = alloc.allocate();
    params.push(Param { placeholder: hash_placeholder.clone(), value: Bson::Int64(id_hash(value) as i64) });

    let value_placeholder = alloc.allocate();
    params.push(Param { placeholder: value_placeholder.clone(), value: value.clone() });

    let matching = shadow_column_name("_id", bson_type.column_alias());
    let mut guards = vec![format!("id_hash = {hash_placeholder}"), format!("{matching} = {value_placeholder}")];
    for alias in COLUMN_ORDER {
        if alias != bson_type.column_alias() {
            guards.push(format!("{} IS NULL", shadow_column_name("_id", alias)));
        }
    }
    clauses.push(format!("({})", guards.join(" AND ")));
}

fn render_indexed_scalar(
    field: &str,
    value: &Bson,
    bson_type: BsonType,
    alloc: &mut PlaceholderAllocator,
    clauses: &mut Vec<String>,
    params: &mut Vec<Param>,
) {
    let placeholder = alloc.allocate();
    params.push(Param { placeholder: placeholder.clone(), value: value.clone() });

    let mut guards = Vec::with_capacity(COLUMN_ORDER.len());
    for alias in COLUMN_ORDER {
        let column = shadow_column_name(field, alias);
        if alias == bson_type.column_alias() {
            guards.push(format!("{column} = {placeholder}"));
        } else {
            guards.push(format!("{column} IS NULL"));
        }
    }
    clauses.push(format!("({})", guards.join(" AND ")));
}

fn render_json_path(
    field: &str,
    op: Op,
    value: &Bson,
    bson_type: BsonType,
    alloc: &mut PlaceholderAllocator,
    clauses: &mut Vec<String>,
    params: &mut Vec<Param>,
) {
    let path = dot_to_json_path(field);
    let (clamped, sql_op) = clamp_for_safe_range(value, bson_type, &op);
    let placeholder = alloc.allocate();
    params.push(Param { placeholder: placeholder.clone(), value: clamped });

    match op {
        Op::Eq => {
            clauses.push(format!(
                r#"JSON_EXISTS(_jsonb, '{path} ? (@ {sql_op} {placeholder})' PASSING {placeholder} AS "param")"#
            ));
        }
        Op::Ne => {
            clauses.push(format!(
                r#"NOT JSON_EXISTS(_jsonb, '$ ? (exists(@.{field}) && @.{field} {sql_op} {placeholder} && @."$s".p.{field}.t == "{tag}")' PASSING {placeholder} AS "param")"#,
                tag = bson_type.as_str(),
            ));
        }
    }
}

/// Converts `a.b.0.c` to `a.b[0].c`.
fn dot_to_json_path(field: &str) -> String {
    field
        .split('.')
        .map(|segment| if segment.chars().all(|c| c.is_ascii_digit()) && !segment.is_empty() {
            format!("[{segment}]")
        } else {
            format!(".{segment}")
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Clamps an out-of-safe-range int/long `$eq` to the nearest safe boundary
/// and rewrites the comparison operator accordingly; leaves every other
/// type/op pair untouched.
fn clamp_for_safe_range(value: &Bson, bson_type: BsonType, op: &Op) -> (Bson, &'static str) {
    if !matches!(op, Op::Eq) {
        return (value.clone(), "==");
    }
    let as_i64 = match (bson_type, value) {
        (BsonType::Int, Bson::Int32(n)) => Some(*n as i64),
        (BsonType::Long, Bson::Int64(n)) => Some(*n),
        _ => None,
    };
    match as_i64 {
        Some(n) if n > MAX_SAFE_DOUBLE => (Bson::Int64(MAX_SAFE_DOUBLE), ">"),
        Some(n) if n < -MAX_SAFE_DOUBLE => (Bson::Int64(-MAX_SAFE_DOUBLE), "<"),
        _ => (value.clone(), "=="),
    }
}

/// Reads a `{$natural: 1 | -1}` sort specification, mapping to ascending or
/// descending `_ferretdb_record_id` order. Any other (or absent) sort
/// collapses to `None`, meaning "unordered, sort upstream".
pub fn natural_sort(sort: Option<&Document>) -> Option<bool> {
    match sort?.get("$natural")? {
        Bson::Int32(1) => Some(true),
        Bson::Int32(-1) => Some(false),
        Bson::Int64(1) => Some(true),
        Bson::Int64(-1) => Some(false),
        _ => None,
    }
}

/// Sanitizes a caller-supplied SQL comment by neutralizing comment
/// delimiters, preventing comment-injection into the rendered statement.
pub fn sanitize_comment(comment: &str) -> String {
    comment.replace("/*", " / * ").replace("*/", " * / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::IndexKeyPair;
    use bson::doc;

    #[test]
    fn placeholder_allocator_increments() {
        let mut alloc = PlaceholderAllocator::new();
        assert_eq!(alloc.allocate(), "$f1");
        assert_eq!(alloc.allocate(), "$f2");
        assert_eq!(alloc.named("x"), "$f_x");
    }

    #[test]
    fn id_eq_uses_primary_key_pushdown() {
        let filter = doc! { "_id": "abc" };
        let translation = translate(&filter, &[]);
        assert!(translation.where_clause.contains("id_hash ="));
        assert!(translation.where_clause.contains("_id_string ="));
        assert!(translation.where_clause.contains("_id_objectId IS NULL"));
        assert_eq!(translation.secondary_index, None);
    }

    #[test]
    fn eq_on_ready_index_uses_indexed_columns() {
        let filter = doc! { "name": "a" };
        let indexes = vec![IndexInfo {
            name: "by_name".into(),
            sanitized_name: "by_name_idx".into(),
            key: vec![IndexKeyPair { field: "name".into(), descending: false }],
            unique: false,
            ready: true,
        }];
        let translation = translate(&filter, &indexes);
        assert!(translation.where_clause.contains("name_string ="));
        assert_eq!(translation.secondary_index.as_deref(), Some("by_name_idx"));
    }

    #[test]
    fn eq_on_not_ready_index_falls_back_to_json_path() {
        let filter = doc! { "name": "a" };
        let indexes = vec![IndexInfo {
            name: "by_name".into(),
            sanitized_name: "by_name_idx".into(),
            key: vec![IndexKeyPair { field: "name".into(), descending: false }],
            unique: false,
            ready: false,
        }];
        let translation = translate(&filter, &indexes);
        assert!(translation.where_clause.contains("JSON_EXISTS"));
        assert_eq!(translation.secondary_index, None);
    }

    #[test]
    fn ne_always_uses_json_path_and_no_index_hint() {
        let filter = doc! { "name": { "$ne": "a" } };
        let indexes = vec![IndexInfo {
            name: "by_name".into(),
            sanitized_name: "by_name_idx".into(),
            key: vec![IndexKeyPair { field: "name".into(), descending: false }],
            unique: false,
            ready: true,
        }];
        let translation = translate(&filter, &indexes);
        assert!(translation.where_clause.contains("NOT JSON_EXISTS"));
        assert!(translation.where_clause.contains(r#"$s".p.name.t == "string""#));
        assert_eq!(translation.secondary_index, None);
    }

    #[test]
    fn safe_range_clamping_rewrites_operator() {
        let filter = doc! { "v": 9_007_199_254_740_992i64 };
        let translation = translate(&filter, &[]);
        assert!(translation.where_clause.contains('>'));
        assert_eq!(translation.params[0].value, Bson::Int64(MAX_SAFE_DOUBLE));
    }

    #[test]
    fn dotted_path_converts_digit_segments_to_brackets() {
        assert_eq!(dot_to_json_path("a.b.0.c"), "a.b[0].c");
    }

    #[test]
    fn natural_sort_reads_direction() {
        assert_eq!(natural_sort(Some(&doc! { "$natural": 1 })), Some(true));
        assert_eq!(natural_sort(Some(&doc! { "$natural": -1 })), Some(false));
        assert_eq!(natural_sort(None), None);
    }

    #[test]
    fn comment_sanitization_breaks_delimiters() {
        assert_eq!(sanitize_comment("*/ DROP TABLE /*"), " * /  DROP TABLE  / * ");
    }
}
