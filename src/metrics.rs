//! The two Prometheus gauges this adapter exposes against the global
//! [`prometheus::default_registry`], so an embedding process's own metrics
//! exporter picks them up without this crate owning an HTTP endpoint.

use once_cell::sync::Lazy;
use prometheus::{IntGauge, IntGaugeVec, Opts};

/// Number of databases currently known to the registry.
pub static METADATA_DATABASES: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("ferretdb_ydb_metadata_databases", "Number of databases in the metadata registry")
        .expect("static gauge opts are always valid");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("gauge is only ever registered once");
    gauge
});

/// Number of collections known to the registry, labeled by database.
pub static METADATA_COLLECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let opts = Opts::new("ferretdb_ydb_metadata_collections", "Number of collections in the metadata registry");
    let gauge = IntGaugeVec::new(opts, &["db"]).expect("static gauge opts are always valid");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("gauge is only ever registered once");
    gauge
});

/// Sets `ferretdb_ydb_metadata_databases` to `count`.
pub fn set_database_count(count: usize) {
    METADATA_DATABASES.set(count as i64);
}

/// Sets `ferretdb_ydb_metadata_collections{db}` to `count`.
pub fn set_collection_count(db: &str, count: usize) {
    METADATA_COLLECTIONS.with_label_values(&[db]).set(count as i64);
}
