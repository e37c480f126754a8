//! Results catalog wiring.
//!
//! The catalog is one JSON document per run at `<root>/results/results.json`
//! with `figures`, `tables`, and `artifacts` arrays. `model` holds the typed
//! document, `schema` validates stored bytes against the shipped JSON Schema,
//! and `publisher` performs the conditional read-modify-write.

pub mod model;
pub mod publisher;
pub(crate) mod schema;

pub use model::{CatalogDocument, CatalogRecord, Category, RESERVED_FIELDS, RecordDraft};
pub use publisher::{CATALOG_FILE, CatalogPublisher, utc_timestamp};
