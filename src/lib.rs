//! Results catalog publisher for analysis runs.
//!
//! A run writes outputs (figures, tables, artifacts) under its request root and
//! registers each one in `results/results.json`. Registration is a conditional
//! read-modify-write against an [`ObjectStore`], so concurrent writers either
//! land distinct records or one of them gets [`Error::ConcurrentModification`];
//! records are never silently lost. Inputs are located with [`PathResolver`],
//! which falls back to a basename search under the run's `data/` tree.
//!
//! [`RunSession`] bundles the pieces for one run. Binaries under `src/bin`
//! expose publishing and resolution to shell pipelines.

pub mod catalog;
pub mod config;
pub mod error;
pub mod extra_fields;
pub mod observability;
pub mod resolver;
pub mod session;
pub mod store;

pub use catalog::{
    CATALOG_FILE, CatalogDocument, CatalogPublisher, CatalogRecord, Category, RESERVED_FIELDS,
    RecordDraft,
};
pub use config::{PublisherConfig, RunContext, offline_requested_by_env};
pub use error::{Error, Result};
pub use extra_fields::ExtraFields;
pub use observability::{LogFormat, init_logging};
pub use resolver::{PathResolver, ResolvedPath};
pub use session::{Output, RunSession};
pub use store::{
    Generation, LocalStore, MemoryStore, ObjectStore, StoredObject, WriteOutcome,
    WritePrecondition,
};
