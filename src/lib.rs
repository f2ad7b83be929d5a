//! # docbridge
//!
//! `docbridge` gives MongoDB-shaped client code (collections of schemaless
//! BSON documents, dot-notation filters, `_id`-keyed CRUD) a home on top of a
//! typed SQL table store. A [`Collection`](collection::Collection) keeps
//! every document's full BSON body in a single `_jsonb` column and
//! additionally projects indexed fields into typed "shadow" columns so that
//! equality and range predicates on those fields can be pushed down into the
//! backing store's query planner instead of being evaluated document by
//! document.
//!
//! ### The Prelude
//!
//! The types needed for most call sites — [`Error`](error::Error),
//! [`Backend`](backend::Backend), [`Collection`](collection::Collection), and
//! the `bson` re-exports — are available from [`prelude`]:
//!
//! ```
//! use docbridge::prelude::*;
//! ```
//!
//! ### Layout
//!
//! * [`types`] — the closed BSON type/column-alias vocabulary.
//! * [`idhash`] — deterministic hashing of `_id` values.
//! * [`codec`] — the `_jsonb` text encoding of a document.
//! * [`schema`] — table and column naming, shadow-column layout.
//! * [`storage`] — the [`StorageClient`](storage::StorageClient) seam this
//!   crate is built against, plus an in-memory fake for tests.
//! * [`query`] — filter-document to WHERE-clause translation.
//! * [`write`] — document encoding and the insert/update/delete write path.
//! * [`index`] — secondary index lifecycle, including background back-fill.
//! * [`registry`] — the catalog of known databases and collections.
//! * [`collection`] / [`cursor`] — the public CRUD surface.
//! * [`backend`] — the crate's single entry point.
//! * [`config`] — connection-string parsing and tunables.
//! * [`metrics`] — the Prometheus gauges this crate exposes.
//! * [`error`] — the crate's `Error`/`Result` types.

#![deny(unused_must_use)]

pub mod backend;
pub mod codec;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ext;
pub mod idhash;
pub mod index;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod types;
pub mod write;

pub mod prelude;
