//! Optimistic read-modify-write publisher for the results catalog.
//!
//! Each publish reads `<logical-root>/results/results.json` with its
//! generation, appends one record, and writes the whole document back with a
//! generation precondition (`DoesNotExist` when creating). A lost race is
//! reported as [`Error::ConcurrentModification`]; the publisher never merges
//! two writers' documents.
//!
//! By default a conflict is surfaced after one attempt. `with_conflict_retries`
//! opts into a bounded number of full re-read-and-append retries.

use crate::catalog::model::{CatalogDocument, CatalogRecord, Category, RecordDraft};
use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::observability::publish_span;
use crate::store::{MemoryStore, ObjectStore, WriteOutcome, WritePrecondition, join_key};
use chrono::Utc;
use std::sync::Arc;

/// Catalog location relative to the logical root.
pub const CATALOG_FILE: &str = "results/results.json";

const DEFAULT_MAX_ATTEMPTS: u32 = 1;

enum Backend {
    Remote(Arc<dyn ObjectStore>),
    /// Private scratch store; writes are logged and never leave the process.
    Offline(MemoryStore),
}

pub struct CatalogPublisher {
    backend: Backend,
    store_root: String,
    logical_root: String,
    catalog_key: String,
    max_attempts: u32,
}

impl CatalogPublisher {
    /// Build a publisher over `store`. When `config.offline` is set the store is
    /// not used and the publisher behaves like [`CatalogPublisher::offline`].
    pub fn new(config: PublisherConfig, store: Arc<dyn ObjectStore>) -> Self {
        if config.offline {
            return Self::offline(config);
        }
        Self::with_backend(config, Backend::Remote(store))
    }

    /// Dry-run publisher: starts from an empty in-memory catalog and never
    /// touches a remote store. Offline publishes accumulate within one publisher,
    /// so later records see the ids of earlier ones.
    pub fn offline(config: PublisherConfig) -> Self {
        Self::with_backend(config, Backend::Offline(MemoryStore::new()))
    }

    fn with_backend(config: PublisherConfig, backend: Backend) -> Self {
        let logical_root = config.logical_root.trim_end_matches('/').to_string();
        let catalog_key = join_key(&logical_root, CATALOG_FILE);
        Self {
            backend,
            store_root: config.store_root.trim_end_matches('/').to_string(),
            logical_root,
            catalog_key,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Retry up to `retries` more times after a conflict before giving up.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.backend, Backend::Offline(_))
    }

    pub fn catalog_key(&self) -> &str {
        &self.catalog_key
    }

    /// Fully-qualified location recorded in `path` for a relative result path.
    pub fn record_path(&self, relative_path: &str) -> String {
        let relative = relative_path.trim_start_matches('/');
        join_key(&join_key(&self.store_root, &self.logical_root), relative)
    }

    /// Current catalog as stored, or `None` before the first publish.
    pub fn read_document(&self) -> Result<Option<CatalogDocument>> {
        match self.store().get(&self.catalog_key)? {
            Some(obj) => CatalogDocument::from_slice(&self.catalog_key, &obj.data).map(Some),
            None => Ok(None),
        }
    }

    /// The document offline mode would have written, `None` when online.
    pub fn offline_document(&self) -> Result<Option<CatalogDocument>> {
        match self.backend {
            Backend::Offline(_) => self.read_document(),
            Backend::Remote(_) => Ok(None),
        }
    }

    /// Append one record to `category` and return it as written.
    pub fn publish(
        &self,
        category: Category,
        relative_path: &str,
        draft: RecordDraft,
    ) -> Result<CatalogRecord> {
        let relative = relative_path.trim_start_matches('/');
        if relative.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "relative path must not be empty (got '{relative_path}')"
            )));
        }
        draft.check_reserved()?;

        let span = publish_span(category.as_str(), &self.catalog_key);
        let _guard = span.enter();

        let mut attempt = 1;
        loop {
            match self.publish_once(category, relative, &draft) {
                Err(err @ Error::ConcurrentModification { .. }) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(attempt, "catalog conflict, giving up: {err}");
                        return Err(err);
                    }
                    tracing::warn!(attempt, "catalog conflict, re-reading: {err}");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn publish_once(
        &self,
        category: Category,
        relative: &str,
        draft: &RecordDraft,
    ) -> Result<CatalogRecord> {
        let store = self.store();
        let key = self.catalog_key.as_str();

        let (mut doc, precondition) = match store.get(key)? {
            Some(obj) => {
                tracing::debug!(generation = obj.generation.0, "read catalog");
                (
                    CatalogDocument::from_slice(key, &obj.data)?,
                    WritePrecondition::MatchesGeneration(obj.generation),
                )
            }
            None => {
                tracing::debug!("catalog absent, creating");
                (CatalogDocument::default(), WritePrecondition::DoesNotExist)
            }
        };

        let record = CatalogRecord {
            id: doc.next_id(),
            path: self.record_path(relative),
            title: draft.title.clone(),
            description: draft.description.clone(),
            created_at: utc_timestamp(),
            extra: draft.extra.clone(),
        };
        doc.records_mut(category).push(record.clone());
        let payload = doc.to_pretty_bytes()?;

        match store.put(key, payload.clone(), precondition.clone())? {
            WriteOutcome::Written { generation } => {
                if self.is_offline() {
                    tracing::info!(
                        id = record.id,
                        "offline mode, results.json would become:\n{}",
                        String::from_utf8_lossy(&payload)
                    );
                } else {
                    tracing::info!(id = record.id, generation = generation.0, "published record");
                }
                Ok(record)
            }
            WriteOutcome::PreconditionFailed { current } => {
                tracing::debug!(current = ?current, "catalog precondition failed");
                Err(Error::ConcurrentModification {
                    key: key.to_string(),
                    expected: precondition.to_string(),
                })
            }
        }
    }

    fn store(&self) -> &dyn ObjectStore {
        match &self.backend {
            Backend::Remote(store) => store.as_ref(),
            Backend::Offline(scratch) => scratch,
        }
    }
}

/// Current UTC time as ISO-8601 with microseconds and a trailing `Z`.
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublisherConfig {
        PublisherConfig::new("bucket", "requests/REQ-1/")
    }

    #[test]
    fn record_path_strips_slashes() {
        let publisher = CatalogPublisher::offline(config());
        assert_eq!(publisher.catalog_key(), "requests/REQ-1/results/results.json");
        assert_eq!(
            publisher.record_path("//results/figures/a.png"),
            "bucket/requests/REQ-1/results/figures/a.png"
        );
    }

    #[test]
    fn timestamp_is_utc_with_microseconds() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        let (_, fraction) = ts.trim_end_matches('Z').rsplit_once('.').unwrap();
        assert_eq!(fraction.len(), 6);
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn rejects_invalid_arguments_before_io() {
        let publisher = CatalogPublisher::offline(config());
        for path in ["", "/", "   "] {
            assert!(matches!(
                publisher.publish(Category::Figures, path, RecordDraft::new()),
                Err(Error::InvalidArgument(_))
            ));
        }
        let draft = RecordDraft::new().field("created_at", "yesterday");
        assert!(matches!(
            publisher.publish(Category::Tables, "results/tables/t.csv", draft),
            Err(Error::InvalidArgument(_))
        ));
        assert!(publisher.offline_document().unwrap().is_none());
    }

    #[test]
    fn offline_publishes_accumulate_in_memory() {
        let publisher = CatalogPublisher::new(
            config().offline(true),
            Arc::new(MemoryStore::new()) as Arc<dyn ObjectStore>,
        );
        assert!(publisher.is_offline());
        let first = publisher
            .publish(Category::Figures, "results/figures/a.png", RecordDraft::new())
            .unwrap();
        let second = publisher
            .publish(Category::Artifacts, "results/artifacts/b.bin", RecordDraft::new())
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        let doc = publisher.offline_document().unwrap().unwrap();
        assert_eq!(doc.len(), 2);
    }
}
