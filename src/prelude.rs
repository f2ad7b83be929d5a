//! Re-exports of the types most call sites need, including the `bson`
//! re-exports, in the style of the teacher crate's own prelude.

pub use crate::backend::{Backend, Database};
pub use crate::collection::Collection;
pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::ext::DocumentExt;
pub use crate::registry::{CollectionSettings, IndexInfo, IndexKeyPair};
pub use crate::storage::{InMemoryStorageClient, StorageClient};
pub use bson::{doc, oid::ObjectId, Bson, Document};
