#![allow(dead_code)]

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use conductor_results::{
    Error, MemoryStore, ObjectStore, StoredObject, WriteOutcome, WritePrecondition,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

pub const BUCKET: &str = "lab-bucket";
pub const REQUEST_ROOT: &str = "requests/REQ-1234";
pub const CATALOG_KEY: &str = "requests/REQ-1234/results/results.json";

pub fn helper_binary(name: &str) -> PathBuf {
    let path = match name {
        "publish-result" => env!("CARGO_BIN_EXE_publish-result"),
        "resolve-input" => env!("CARGO_BIN_EXE_resolve-input"),
        other => panic!("unknown helper binary {other}"),
    };
    PathBuf::from(path)
}

pub fn run_command(mut cmd: Command) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run command: {:?}", cmd))?;
    if output.status.success() {
        Ok(output)
    } else {
        bail!(
            "command {:?} failed: status {:?}\nstdout: {}\nstderr: {}",
            cmd,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    }
}

pub fn stdout_json(output: &Output) -> Result<Value> {
    serde_json::from_slice(&output.stdout).context("stdout was not JSON")
}

/// Write a run-context file pointing at `mount`.
pub fn write_context(dir: &Path, mount: &Path) -> Result<PathBuf> {
    let path = dir.join("context.json");
    let ctx = json!({
        "bucket": BUCKET,
        "mount_path": mount,
        "request_root": REQUEST_ROOT,
    });
    fs::write(&path, serde_json::to_vec_pretty(&ctx)?)?;
    Ok(path)
}

pub fn write_file(root: &Path, key: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = root.join(key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

/// Serves one stale snapshot on its first `get`, then passes through.
///
/// Models a second process that read the catalog before another writer
/// committed.
pub struct StaleReadStore {
    inner: MemoryStore,
    stale: Mutex<Option<Option<StoredObject>>>,
}

impl StaleReadStore {
    pub fn new(inner: MemoryStore, snapshot: Option<StoredObject>) -> Self {
        Self {
            inner,
            stale: Mutex::new(Some(snapshot)),
        }
    }
}

impl ObjectStore for StaleReadStore {
    fn get(&self, key: &str) -> conductor_results::Result<Option<StoredObject>> {
        let snapshot = self
            .stale
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        match snapshot {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.get(key),
        }
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> conductor_results::Result<WriteOutcome> {
        self.inner.put(key, data, precondition)
    }

    fn list(&self, prefix: &str) -> conductor_results::Result<Vec<String>> {
        self.inner.list(prefix)
    }
}

/// Every call fails as if the backend were unreachable.
pub struct UnreachableStore;

impl ObjectStore for UnreachableStore {
    fn get(&self, key: &str) -> conductor_results::Result<Option<StoredObject>> {
        Err(Error::storage(format!("connection refused reading {key}")))
    }

    fn put(
        &self,
        key: &str,
        _data: Bytes,
        _precondition: WritePrecondition,
    ) -> conductor_results::Result<WriteOutcome> {
        Err(Error::storage(format!("connection refused writing {key}")))
    }

    fn list(&self, prefix: &str) -> conductor_results::Result<Vec<String>> {
        Err(Error::storage(format!("connection refused listing {prefix}")))
    }
}
