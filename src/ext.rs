//! Small extension traits and conversion helpers, in the style of the
//! teacher crate's `DatabaseExt`/`utils::int_to_usize_with_msg`: narrow,
//! single-purpose additions over a handful of foreign or std types.

use bson::{Bson, Document};

use crate::error::{Error, Result};

/// Convenience accessors for a document's `_id` field.
pub trait DocumentExt {
    /// The `_id` field, if present.
    fn id(&self) -> Option<&Bson>;

    /// The `_id` field, or an error naming the missing field.
    fn require_id(&self) -> Result<&Bson>;
}

impl DocumentExt for Document {
    fn id(&self) -> Option<&Bson> {
        self.get("_id")
    }

    fn require_id(&self) -> Result<&Bson> {
        self.id().ok_or_else(|| Error::missing_field("document has no `_id` field"))
    }
}

/// Converts a `usize` count to `u32`, for call sites (like
/// [`crate::storage::SelectOptions::limit`]) that model row caps as `u32`.
/// Clamps rather than errors, since an oversized count is a caller mistake
/// the adapter should tolerate, not a validation failure worth surfacing.
pub fn usize_to_u32_clamped(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
