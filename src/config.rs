//! Connection-string parsing and the tunables that sit outside it.

use std::collections::BTreeMap;

use url::Url;

use crate::error::{Error, Result};

/// Default row cap for a `find()` call that doesn't specify one.
pub const DEFAULT_LIMIT: u32 = 1000;

/// Default page size for index back-fill (see [`crate::index::backfill`]).
pub const DEFAULT_BACKFILL_PAGE_SIZE: usize = 100;

/// Default insert/update/delete batch size (see [`crate::write`]).
const DEFAULT_BATCH_SIZE: usize = 100;

/// A write-batch size with a floor of 1, enforced at construction so the
/// write path never has to special-case a zero-size chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(usize);

impl BatchSize {
    /// Clamps `size` up to at least 1.
    pub fn new(size: usize) -> Self {
        BatchSize(size.max(1))
    }

    /// The effective batch size.
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize::new(DEFAULT_BATCH_SIZE)
    }
}

/// Parsed connection configuration: `grpc[s]://<host>:<port>/<database-root>?<opt=val>&...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `grpc` or `grpcs`.
    pub scheme: String,
    /// Backend host.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Path component identifying the tenant directory every FerretDB
    /// database becomes a sub-directory of.
    pub database_root: String,
    /// Query parameters from the connection string.
    options: BTreeMap<String, String>,
    /// Row cap applied when a caller doesn't supply one.
    pub default_limit: u32,
    /// Page size for index back-fill.
    pub backfill_page_size: usize,
    /// Insert/update/delete batch size.
    pub batch_size: BatchSize,
}

impl Config {
    /// Parses a connection string. Fails with [`Error::InvalidConfig`] if the
    /// scheme isn't `grpc`/`grpcs`, or the URL has no host.
    pub fn parse(connection_string: &str) -> Result<Config> {
        let url = Url::parse(connection_string)
            .map_err(|e| Error::invalid_config(format!("malformed connection string: {e}")))?;

        let scheme = url.scheme().to_string();
        if scheme != "grpc" && scheme != "grpcs" {
            return Err(Error::invalid_config(format!("unsupported scheme `{scheme}`, expected `grpc` or `grpcs`")));
        }

        let host = url.host_str().ok_or_else(|| Error::invalid_config("connection string has no host"))?.to_string();
        let port = url.port().ok_or_else(|| Error::invalid_config("connection string has no port"))?;
        let database_root = url.path().trim_start_matches('/').to_string();
        if database_root.is_empty() {
            return Err(Error::invalid_config("connection string has no database-root path component"));
        }

        let options = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        Ok(Config {
            scheme,
            host,
            port,
            database_root,
            options,
            default_limit: DEFAULT_LIMIT,
            backfill_page_size: DEFAULT_BACKFILL_PAGE_SIZE,
            batch_size: BatchSize::default(),
        })
    }

    /// Looks up a query-string option by key.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
