//! `Error` and `Result` types arising out of adapter operations.

use std::borrow::Cow;
use std::result;

/// Type alias for a `Result` containing a `docbridge` [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// A structured, "machine-readable" error kind, mirrored by a matching
/// [`Error`] variant. Kept separate from `Error` itself so callers can
/// match on it without pattern-matching through `#[source]` chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested database has no entry in the registry.
    DatabaseDoesNotExist,
    /// The requested collection has no entry in the registry.
    CollectionDoesNotExist,
    /// An insert violated the implicit uniqueness of `_id`.
    InsertDuplicateID,
    /// A document field was missing where one was required (e.g. `_id`).
    MissingDocumentField,
    /// A document field had a BSON type that cannot be indexed or pushed down.
    UnsupportedBsonType,
    /// The connection string or another piece of configuration was malformed.
    InvalidConfig,
    /// The underlying storage client reported a failure.
    StorageError,
    /// An invariant that should be guaranteed by the caller was violated.
    InvariantViolation,
}

impl ErrorKind {
    /// A short, human-readable description of this kind.
    pub fn as_str(self) -> &'static str {
        use ErrorKind::*;

        match self {
            DatabaseDoesNotExist => "database does not exist",
            CollectionDoesNotExist => "collection does not exist",
            InsertDuplicateID => "duplicate _id on insert",
            MissingDocumentField => "document field not found",
            UnsupportedBsonType => "unsupported BSON type for this operation",
            InvalidConfig => "invalid configuration",
            StorageError => "storage client error",
            InvariantViolation => "internal invariant violated",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The central error type for `docbridge`.
///
/// Every variant carries a message describing the call site, and most carry
/// a `#[source]` error from the layer below, so `Display`-ing an `Error`
/// reads as a chain from the outermost context down to the original cause —
/// the same shape the teacher crate produced with its hand-rolled `chain()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// See [`ErrorKind::DatabaseDoesNotExist`].
    #[error("database does not exist: {0}")]
    DatabaseDoesNotExist(String),

    /// See [`ErrorKind::CollectionDoesNotExist`].
    #[error("collection does not exist: {db}.{collection}")]
    CollectionDoesNotExist {
        /// Database the caller looked in.
        db: String,
        /// Collection name that was not found.
        collection: String,
    },

    /// See [`ErrorKind::InsertDuplicateID`].
    #[error("duplicate _id on insert into {collection}")]
    InsertDuplicateID {
        /// Collection the conflicting insert targeted.
        collection: String,
    },

    /// See [`ErrorKind::MissingDocumentField`].
    #[error("{message}")]
    MissingDocumentField {
        /// What was missing and where.
        message: Cow<'static, str>,
    },

    /// See [`ErrorKind::UnsupportedBsonType`].
    #[error("{message}")]
    UnsupportedBsonType {
        /// What was unsupported and why.
        message: Cow<'static, str>,
    },

    /// See [`ErrorKind::InvalidConfig`].
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the malformed value.
        message: Cow<'static, str>,
    },

    /// Wraps a failure reported by a [`crate::storage::StorageClient`].
    #[error("{message}")]
    Storage {
        /// Context describing which operation failed.
        message: Cow<'static, str>,
        /// The underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// See [`ErrorKind::InvariantViolation`]. Reserved for conditions that
    /// indicate a programming error rather than a runtime condition; callers
    /// should generally let these propagate rather than handle them.
    #[error("invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated.
        message: Cow<'static, str>,
    },
}

impl Error {
    /// The structured kind of this error, for callers that want to branch
    /// on category without matching the full variant (and its payload).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DatabaseDoesNotExist(_) => ErrorKind::DatabaseDoesNotExist,
            Error::CollectionDoesNotExist { .. } => ErrorKind::CollectionDoesNotExist,
            Error::InsertDuplicateID { .. } => ErrorKind::InsertDuplicateID,
            Error::MissingDocumentField { .. } => ErrorKind::MissingDocumentField,
            Error::UnsupportedBsonType { .. } => ErrorKind::UnsupportedBsonType,
            Error::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Error::Storage { .. } => ErrorKind::StorageError,
            Error::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    /// Constructs a [`Error::MissingDocumentField`].
    pub fn missing_field<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Error::MissingDocumentField { message: message.into() }
    }

    /// Constructs a [`Error::UnsupportedBsonType`].
    pub fn unsupported_bson_type<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Error::UnsupportedBsonType { message: message.into() }
    }

    /// Constructs a [`Error::InvalidConfig`].
    pub fn invalid_config<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Error::InvalidConfig { message: message.into() }
    }

    /// Constructs a [`Error::InvariantViolation`].
    pub fn invariant<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Error::InvariantViolation { message: message.into() }
    }

    /// Wraps an arbitrary storage-layer error with call-site context.
    pub fn storage<S, E>(message: S, source: E) -> Self
        where S: Into<Cow<'static, str>>,
              E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage { message: message.into(), source: Box::new(source) }
    }
}

/// A trait for conveniently attaching call-site context while propagating
/// errors up the stack, in the style of the teacher crate's `ResultExt`.
pub trait ResultExt<T> {
    /// If this `Result` is an `Err` coming from the storage layer, wraps it
    /// with `message` as additional context describing the failed operation.
    fn chain_storage<M: Into<Cow<'static, str>>>(self, message: M) -> Result<T>;
}

impl<T, E> ResultExt<T> for result::Result<T, E>
    where E: std::error::Error + Send + Sync + 'static
{
    fn chain_storage<M: Into<Cow<'static, str>>>(self, message: M) -> Result<T> {
        self.map_err(|cause| Error::storage(message, cause))
    }
}
