//! Conditional object-store adapter.
//!
//! The publisher only needs three primitives from a store: read an object
//! together with its generation, write it back only if the generation still
//! matches, and list keys under a prefix. Backends implement [`ObjectStore`]
//! and are shared behind `Arc<dyn ObjectStore>`.
//!
//! Keys are `/`-separated relative strings (`requests/REQ-1/results/results.json`).

pub mod local;
pub mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

/// Store-assigned version counter used as the optimistic-concurrency token.
///
/// Generations start at 1 for a freshly created object and increase by one on
/// every successful write.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation {}", self.0)
    }
}

/// Object bytes paired with the generation observed at read time.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Bytes,
    pub generation: Generation,
}

/// Precondition attached to a write.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WritePrecondition {
    /// Succeed only if the object does not exist yet.
    DoesNotExist,
    /// Succeed only if the current generation equals the given one.
    MatchesGeneration(Generation),
    /// Write regardless of current state. Used for rendered outputs, never for
    /// the catalog document.
    Unconditional,
}

impl fmt::Display for WritePrecondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePrecondition::DoesNotExist => f.write_str("must-not-exist"),
            WritePrecondition::MatchesGeneration(generation) => write!(f, "{generation}"),
            WritePrecondition::Unconditional => f.write_str("unconditional"),
        }
    }
}

/// Outcome of a conditional write.
///
/// A failed precondition is a normal result, not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Written { generation: Generation },
    PreconditionFailed { current: Option<Generation> },
}

pub trait ObjectStore: Send + Sync {
    /// Read an object and its generation. `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Write an object subject to `precondition`.
    fn put(&self, key: &str, data: Bytes, precondition: WritePrecondition)
    -> Result<WriteOutcome>;

    /// List every key starting with `prefix`, in no particular order.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Human-readable location for a key (filesystem path, URL, ...).
    fn locate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Evaluate a precondition against the current generation of an object.
pub(crate) fn precondition_holds(
    precondition: &WritePrecondition,
    current: Option<Generation>,
) -> bool {
    match precondition {
        WritePrecondition::DoesNotExist => current.is_none(),
        WritePrecondition::MatchesGeneration(expected) => current == Some(*expected),
        WritePrecondition::Unconditional => true,
    }
}

/// Reject keys that are empty, absolute, or climb out of the store root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidArgument("store key must not be empty".into()));
    }
    if key.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "store key must be relative, got '{key}'"
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::InvalidArgument(format!(
            "store key '{key}' contains an empty, '.' or '..' segment"
        )));
    }
    Ok(())
}

/// Join a logical root and a relative path into a store key.
///
/// Trailing slashes on the root and leading slashes on the relative part are
/// stripped; an empty root yields the relative part unchanged.
pub fn join_key(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if root.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{relative}")
    }
}

/// Final `/`-separated segment of a key or path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
