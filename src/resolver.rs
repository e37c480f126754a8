//! Input file resolution by exact path, then by basename under `data/`.
//!
//! Users usually name inputs by file name (`data/plate.csv`) while the actual
//! file sits somewhere deeper in the run's `data/` tree. Resolution tries the
//! exact key first; otherwise every key under `<root>/data/` whose final
//! segment equals the requested base name is a candidate, and the
//! lexicographically smallest full key wins. Newer or more specific files do
//! not take precedence.
//!
//! Local directories and remote buckets behave identically because both are
//! reached through [`ObjectStore::exists`] and [`ObjectStore::list`].

use crate::error::{Error, Result};
use crate::store::{ObjectStore, base_name, join_key};
use std::sync::Arc;

/// Directory searched by basename, relative to the logical root.
pub const DATA_DIR: &str = "data";

/// A resolved input: the store key plus where it physically lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPath {
    pub key: String,
    pub location: String,
}

#[derive(Clone)]
pub struct PathResolver {
    store: Arc<dyn ObjectStore>,
}

impl PathResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, logical_root: &str, relative_path: &str) -> Result<ResolvedPath> {
        let relative = normalize_relative(relative_path)?;
        let relative = relative.as_str();
        let target = base_name(relative);

        let direct = join_key(logical_root, relative);
        if self.store.exists(&direct)? {
            tracing::debug!(key = %direct, "resolved input by exact path");
            return Ok(self.resolved(direct));
        }

        let prefix = format!("{}/", join_key(logical_root, DATA_DIR));
        let candidates = self.store.list(&prefix)?;
        match select_basename_match(candidates, target) {
            Some(key) => {
                tracing::debug!(key = %key, requested = relative, "resolved input by basename");
                Ok(self.resolved(key))
            }
            None => Err(Error::NotFound {
                requested: relative.to_string(),
                direct: self.store.locate(&direct),
                search: format!("{}**/{target}", self.store.locate(&prefix)),
            }),
        }
    }

    fn resolved(&self, key: String) -> ResolvedPath {
        ResolvedPath {
            location: self.store.locate(&key),
            key,
        }
    }
}

/// Drop empty and `.` segments so every backend sees the same key.
///
/// `..` is rejected rather than resolved; inputs never leave the logical root.
pub fn normalize_relative(relative_path: &str) -> Result<String> {
    if relative_path.trim().is_empty() || relative_path.ends_with('/') {
        return Err(Error::InvalidArgument(format!(
            "cannot resolve '{relative_path}': no file name"
        )));
    }
    let mut segments = Vec::new();
    for segment in relative_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(Error::InvalidArgument(format!(
                    "cannot resolve '{relative_path}': '..' segments are not allowed"
                )));
            }
            other => segments.push(other),
        }
    }
    match segments.last() {
        Some(last) if !last.trim().is_empty() => Ok(segments.join("/")),
        _ => Err(Error::InvalidArgument(format!(
            "cannot resolve '{relative_path}': no file name"
        ))),
    }
}

/// Pick the smallest (code-point order) candidate whose final segment is `target`.
pub fn select_basename_match<I>(candidates: I, target: &str) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    candidates
        .into_iter()
        .filter(|candidate| base_name(candidate) == target)
        .min()
}
