//! Physical naming: table names, index names, and the shadow-column layout
//! for an indexed field.

use crate::types::COLUMN_ORDER;

/// Longest physical table/index name the backend accepts.
const MAX_NAME_LEN: usize = 255;

/// Bytes reserved for the `_<hex8>` suffix appended to a sanitized table name.
const TABLE_SUFFIX_LEN: usize = 9;

/// Replaces every byte outside `[a-zA-Z0-9_.-]` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// 32-bit FNV-1a, used for physical name suffixes (the name-collision space
/// only needs to be small and cheap to recompute on retry, unlike `id_hash`).
pub fn fnv32a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| (hash ^ b as u32).wrapping_mul(PRIME))
}

/// Computes `GenerateUniqueTableName`: sanitizes `collection`, truncates to
/// leave room for an 8-hex-digit FNV32a suffix, and retries with an
/// incremented seed until `exists` reports no collision.
///
/// `exists` is given the candidate table name and must return `true` iff it
/// is already taken within the owning database.
pub fn generate_unique_table_name(collection: &str, mut exists: impl FnMut(&str) -> bool) -> String {
    let sanitized = sanitize(collection);
    let truncated = truncate_bytes(&sanitized, MAX_NAME_LEN - TABLE_SUFFIX_LEN);

    let mut seed = collection.as_bytes().to_vec();
    loop {
        let suffix = fnv32a(&seed);
        let candidate = format!("{truncated}_{suffix:08x}");
        if !exists(&candidate) {
            return candidate;
        }
        seed.push(0x00);
    }
}

/// Computes the physical index name: `<sanitized>_<fnv32a(name) hex8>_idx`.
pub fn index_physical_name(name: &str) -> String {
    let sanitized = sanitize(name);
    let suffix = fnv32a(name.as_bytes());
    let truncated = truncate_bytes(&sanitized, MAX_NAME_LEN - TABLE_SUFFIX_LEN - 4);
    format!("{truncated}_{suffix:08x}_idx")
}

/// Truncates `s` to at most `max_bytes` bytes without splitting a UTF-8
/// character.
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The physical column name for `field`'s shadow column of storage category
/// `alias`, e.g. `sanitize("name")` + `_string` -> `name_string`.
pub fn shadow_column_name(field: &str, alias: crate::types::ColumnAlias) -> String {
    format!("{}_{}", sanitize(field), alias.suffix())
}

/// All five shadow column names for `field`, in [`COLUMN_ORDER`].
pub fn shadow_columns(field: &str) -> [String; 5] {
    COLUMN_ORDER.map(|alias| shadow_column_name(field, alias))
}
