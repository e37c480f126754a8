//! Per-run handle tying a [`RunContext`] to a store, resolver, and publisher.
//!
//! Construct one explicitly per run; there is no process-wide instance.
//! Offline sessions still read inputs and upload rendered outputs through the
//! store (usually a [`LocalStore`] over the mount), but catalog updates stay in
//! memory.

use crate::catalog::{CatalogDocument, CatalogPublisher, CatalogRecord, Category, RecordDraft};
use crate::config::RunContext;
use crate::error::{Error, Result};
use crate::resolver::{DATA_DIR, PathResolver, ResolvedPath};
use crate::store::{LocalStore, ObjectStore, WriteOutcome, WritePrecondition, base_name, join_key};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

/// What the caller is publishing.
#[derive(Clone, Debug)]
pub enum Output {
    /// A file that already exists; only its path is registered.
    Path(String),
    /// Bytes to upload under the category's results directory first.
    Rendered { filename: String, bytes: Bytes },
}

pub struct RunSession {
    context: RunContext,
    store: Arc<dyn ObjectStore>,
    resolver: PathResolver,
    publisher: CatalogPublisher,
}

impl RunSession {
    pub fn new(context: RunContext, store: Arc<dyn ObjectStore>, offline: bool) -> Self {
        let publisher = CatalogPublisher::new(context.publisher_config(offline), store.clone());
        Self {
            resolver: PathResolver::new(store.clone()),
            context,
            store,
            publisher,
        }
    }

    /// Session over the context's mounted bucket directory.
    pub fn mounted(context: RunContext, offline: bool) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(context.mount_path.clone()));
        Self::new(context, store, offline)
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.publisher = self.publisher.with_conflict_retries(retries);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn publisher(&self) -> &CatalogPublisher {
        &self.publisher
    }

    pub fn request_key(&self, relative: &str) -> String {
        join_key(&self.context.request_root, relative)
    }

    pub fn data_key(&self, relative: &str) -> String {
        self.request_key(&join_key(DATA_DIR, relative))
    }

    pub fn results_key(&self, relative: &str) -> String {
        self.request_key(&join_key("results", relative))
    }

    pub fn figures_key(&self, filename: &str) -> String {
        join_key(&self.context.figures_root(), filename)
    }

    pub fn tables_key(&self, filename: &str) -> String {
        join_key(&self.context.tables_root(), filename)
    }

    pub fn artifacts_key(&self, filename: &str) -> String {
        join_key(&self.context.artifacts_root(), filename)
    }

    /// Path of `key` under the bucket mount.
    pub fn local_path(&self, key: &str) -> PathBuf {
        let mut path = self.context.mount_path.clone();
        for segment in key.trim_start_matches('/').split('/') {
            path.push(segment);
        }
        path
    }

    pub fn resolve_input(&self, relative: &str) -> Result<ResolvedPath> {
        self.resolver.resolve(&self.context.request_root, relative)
    }

    pub fn read_bytes(&self, relative: &str) -> Result<Bytes> {
        let resolved = self.resolve_input(relative)?;
        match self.store.get(&resolved.key)? {
            Some(obj) => Ok(obj.data),
            None => Err(Error::storage(format!(
                "{} disappeared after resolution",
                resolved.location
            ))),
        }
    }

    pub fn read_text(&self, relative: &str) -> Result<String> {
        let data = self.read_bytes(relative)?;
        String::from_utf8(data.to_vec())
            .map_err(|_| Error::InvalidArgument(format!("input '{relative}' is not valid UTF-8")))
    }

    /// Register `output` in the catalog, uploading it first when rendered.
    pub fn publish(
        &self,
        category: Category,
        output: Output,
        draft: RecordDraft,
    ) -> Result<CatalogRecord> {
        let relative = match output {
            Output::Rendered { filename, bytes } => self.upload(category, &filename, bytes)?,
            Output::Path(path) => self.registered_path(category, &path),
        };
        self.publisher.publish(category, &relative, draft)
    }

    pub fn publish_figure(&self, output: Output, draft: RecordDraft) -> Result<CatalogRecord> {
        self.publish(Category::Figures, output, draft)
    }

    pub fn publish_table(&self, relative: &str, draft: RecordDraft) -> Result<CatalogRecord> {
        self.publish(Category::Tables, Output::Path(relative.to_string()), draft)
    }

    pub fn publish_artifact(&self, relative: &str, draft: RecordDraft) -> Result<CatalogRecord> {
        self.publish(Category::Artifacts, Output::Path(relative.to_string()), draft)
    }

    /// Catalog as the publisher currently sees it (the scratch copy offline).
    pub fn catalog(&self) -> Result<Option<CatalogDocument>> {
        self.publisher.read_document()
    }

    fn category_root(&self, category: Category) -> String {
        match category {
            Category::Figures => self.context.figures_root(),
            Category::Tables => self.context.tables_root(),
            Category::Artifacts => self.context.artifacts_root(),
        }
    }

    fn upload(&self, category: Category, filename: &str, bytes: Bytes) -> Result<String> {
        if filename.trim().is_empty() || filename.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "rendered output needs a plain file name, got '{filename}'"
            )));
        }
        let key = join_key(&self.category_root(category), filename);
        match self.store.put(&key, bytes, WritePrecondition::Unconditional)? {
            WriteOutcome::Written { .. } => {
                tracing::debug!(key = %key, "uploaded rendered output");
            }
            WriteOutcome::PreconditionFailed { .. } => {
                return Err(Error::Internal {
                    message: format!("unconditional write to {key} was rejected"),
                });
            }
        }
        Ok(format!("results/{}/{filename}", category.as_str()))
    }

    /// Request-relative path recorded for an existing output.
    fn registered_path(&self, category: Category, path: &str) -> String {
        match category {
            Category::Figures => {
                let marker = format!("{}/", self.context.request_root);
                match path.split_once(marker.as_str()) {
                    Some((_, rest)) => rest.to_string(),
                    None => path.to_string(),
                }
            }
            Category::Tables | Category::Artifacts => {
                if path.starts_with("results/") {
                    path.to_string()
                } else {
                    format!("results/{}/{}", category.as_str(), base_name(path))
                }
            }
        }
    }
}
