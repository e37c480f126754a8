//! Explicit configuration for sessions and publishers.
//!
//! [`RunContext`] mirrors the run-context JSON a script runner hands to a job
//! (normally through `CONDUCTOR_CONTEXT`). Nothing here is read implicitly:
//! binaries call [`RunContext::from_env`] and [`offline_requested_by_env`]
//! themselves and pass the results down.

use crate::error::{Error, Result};
use crate::store::join_key;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONTEXT_ENV: &str = "CONDUCTOR_CONTEXT";
pub const DRY_RUN_ENV: &str = "CONDUCTOR_DRY_RUN";
pub const LOCAL_ENV: &str = "CONDUCTOR_LOCAL";

const DEFAULT_MOUNT_PATH: &str = "/mnt/gcs";

/// Settings consumed by [`crate::CatalogPublisher`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublisherConfig {
    /// Replace store reads and writes with an in-memory scratch catalog.
    pub offline: bool,
    /// Store identifier prefixed to every record path (the bucket name).
    pub store_root: String,
    /// Run namespace; the catalog lives at `<logical_root>/results/results.json`.
    pub logical_root: String,
}

impl PublisherConfig {
    pub fn new(store_root: impl Into<String>, logical_root: impl Into<String>) -> Self {
        Self {
            offline: false,
            store_root: store_root.into(),
            logical_root: logical_root.into(),
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }
}

/// Optional overrides for the standard result locations.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContextPaths {
    #[serde(default)]
    pub results: Option<String>,
    #[serde(default)]
    pub figures: Option<String>,
    #[serde(default)]
    pub tables: Option<String>,
    #[serde(default)]
    pub artifacts: Option<String>,
}

/// Per-run context: where the run's data and results live.
#[derive(Clone, Debug, Deserialize)]
pub struct RunContext {
    pub bucket: String,
    #[serde(default = "default_mount_path")]
    pub mount_path: PathBuf,
    pub request_root: String,
    #[serde(default)]
    pub paths: ContextPaths,
    /// Opaque input catalog supplied by the scheduler.
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

fn default_mount_path() -> PathBuf {
    PathBuf::from(DEFAULT_MOUNT_PATH)
}

impl RunContext {
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut ctx: RunContext = serde_json::from_str(raw)
            .map_err(|err| Error::invalid_context(format!("parsing context JSON: {err}")))?;
        ctx.bucket = ctx.bucket.trim().to_string();
        ctx.request_root = ctx.request_root.trim().trim_end_matches('/').to_string();
        if ctx.bucket.is_empty() {
            return Err(Error::invalid_context("bucket must not be empty"));
        }
        if ctx.request_root.is_empty() {
            return Err(Error::invalid_context("request_root must not be empty"));
        }
        Ok(ctx)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            Error::invalid_context(format!("reading context {}: {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse the context from `CONDUCTOR_CONTEXT`.
    pub fn from_env() -> Result<Self> {
        let raw = env::var(CONTEXT_ENV)
            .map_err(|_| Error::invalid_context(format!("missing {CONTEXT_ENV}")))?;
        Self::from_json(&raw)
    }

    pub fn results_root(&self) -> String {
        self.paths
            .results
            .clone()
            .unwrap_or_else(|| join_key(&self.request_root, "results"))
    }

    pub fn figures_root(&self) -> String {
        self.paths
            .figures
            .clone()
            .unwrap_or_else(|| join_key(&self.results_root(), "figures"))
    }

    pub fn tables_root(&self) -> String {
        self.paths
            .tables
            .clone()
            .unwrap_or_else(|| join_key(&self.results_root(), "tables"))
    }

    pub fn artifacts_root(&self) -> String {
        self.paths
            .artifacts
            .clone()
            .unwrap_or_else(|| join_key(&self.results_root(), "artifacts"))
    }

    pub fn publisher_config(&self, offline: bool) -> PublisherConfig {
        PublisherConfig::new(self.bucket.clone(), self.request_root.clone()).offline(offline)
    }
}

/// True when `CONDUCTOR_DRY_RUN=1` or `CONDUCTOR_LOCAL=1`.
pub fn offline_requested_by_env() -> bool {
    [DRY_RUN_ENV, LOCAL_ENV]
        .iter()
        .any(|name| env::var(name).map(|v| v == "1").unwrap_or(false))
}
