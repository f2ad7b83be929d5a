//! The crate's single entry point: owns the registry and configuration, and
//! hands out [`Collection`] handles — the intended embedding surface for a
//! wire-protocol layer sitting on top of this crate.

use std::sync::Arc;

use crate::collection::Collection;
use crate::config::Config;
use crate::error::Result;
use crate::registry::{self, Registry};
use crate::storage::StorageClient;

/// Owns one [`Registry`] and the [`Config`] it was constructed with.
/// Cheap to clone: cloning shares the same underlying registry.
pub struct Backend<S: StorageClient> {
    registry: Arc<Registry<S>>,
    config: Config,
}

impl<S: StorageClient + 'static> Backend<S> {
    /// Builds a backend over `storage`, configured by `config`.
    pub fn new(config: Config, storage: S) -> Self {
        let registry = Arc::new(Registry::new(Arc::new(storage), config.backfill_page_size));
        Backend { registry, config }
    }

    /// The configuration this backend was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle to one database.
    pub fn database(&self, name: &str) -> Database<'_, S> {
        Database { backend: self, name: name.to_string() }
    }

    /// A handle to one collection, without going through [`Backend::database`].
    pub fn collection(&self, db: &str, name: &str) -> Collection<S> {
        Collection::new(
            Arc::clone(&self.registry),
            db.to_string(),
            name.to_string(),
            self.config.default_limit,
            self.config.batch_size.get(),
        )
    }

    /// Sorted list of known database names.
    pub async fn database_list(&self) -> Vec<String> {
        self.registry.database_list().await
    }

    /// Drops a database and everything in it. Returns whether it existed.
    pub async fn database_drop(&self, db: &str) -> Result<bool> {
        self.registry.database_drop(db).await
    }

    /// Sorted snapshots of every collection in `db`.
    pub async fn collection_list(&self, db: &str) -> Result<Vec<registry::Collection>> {
        self.registry.collection_list(db).await
    }

    /// Aborts every outstanding index back-fill task. Call before dropping a
    /// `Backend` that still has in-flight back-fills, since they are spawned
    /// detached and otherwise outlive it.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await
    }
}

/// A handle to one database, scoping [`Database::collection`] calls to it.
pub struct Database<'a, S: StorageClient> {
    backend: &'a Backend<S>,
    name: String,
}

impl<'a, S: StorageClient + 'static> Database<'a, S> {
    /// This database's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to a collection within this database.
    pub fn collection(&self, name: &str) -> Collection<S> {
        self.backend.collection(&self.name, name)
    }

    /// Sorted snapshots of every collection in this database.
    pub async fn collection_list(&self) -> Result<Vec<registry::Collection>> {
        self.backend.collection_list(&self.name).await
    }

    /// Drops this database and everything in it. Returns whether it existed.
    pub async fn drop(&self) -> Result<bool> {
        self.backend.database_drop(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageClient;
    use bson::doc;

    fn backend() -> Backend<InMemoryStorageClient> {
        let config = Config::parse("grpc://localhost:2136/root").unwrap();
        Backend::new(config, InMemoryStorageClient::new())
    }

    #[tokio::test]
    async fn collection_handle_round_trips_a_document() {
        let backend = backend();
        let coll = backend.collection("db", "widgets");
        coll.insert_one(&doc! { "_id": 1, "v": "a" }).await.unwrap();

        assert_eq!(coll.count(&doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn database_handle_scopes_collections() {
        let backend = backend();
        let db = backend.database("db");
        db.collection("widgets").insert_one(&doc! { "_id": 1 }).await.unwrap();

        let names: Vec<String> = db.collection_list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["widgets".to_string()]);
    }

    #[tokio::test]
    async fn database_drop_removes_its_collections() {
        let backend = backend();
        backend.collection("db", "widgets").insert_one(&doc! { "_id": 1 }).await.unwrap();
        assert!(backend.database_drop("db").await.unwrap());
        assert!(backend.collection_list("db").await.unwrap().is_empty());
    }
}
