//! In-process object store.
//!
//! Thread-safe via `RwLock`; clones share the same object map, so several
//! publishers built from clones of one `MemoryStore` contend exactly like
//! independent processes against a remote bucket. Also backs offline mode.

use super::{
    Generation, ObjectStore, StoredObject, WriteOutcome, WritePrecondition, precondition_holds,
};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held.
    pub fn len(&self) -> Result<usize> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn poisoned() -> Error {
    Error::Internal {
        message: "memory store lock poisoned".into(),
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.get(key).cloned())
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let current = objects.get(key).map(|obj| obj.generation);
        if !precondition_holds(&precondition, current) {
            return Ok(WriteOutcome::PreconditionFailed { current });
        }

        let generation = Generation(current.map_or(1, |g| g.0 + 1));
        objects.insert(key.to_string(), StoredObject { data, generation });
        Ok(WriteOutcome::Written { generation })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn locate(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_conditional_update() {
        let store = MemoryStore::new();
        let first = store
            .put("k", Bytes::from("v1"), WritePrecondition::DoesNotExist)
            .unwrap();
        assert_eq!(
            first,
            WriteOutcome::Written {
                generation: Generation(1)
            }
        );

        let again = store
            .put("k", Bytes::from("v1b"), WritePrecondition::DoesNotExist)
            .unwrap();
        assert_eq!(
            again,
            WriteOutcome::PreconditionFailed {
                current: Some(Generation(1))
            }
        );

        let second = store
            .put(
                "k",
                Bytes::from("v2"),
                WritePrecondition::MatchesGeneration(Generation(1)),
            )
            .unwrap();
        assert_eq!(
            second,
            WriteOutcome::Written {
                generation: Generation(2)
            }
        );

        let stale = store
            .put(
                "k",
                Bytes::from("v3"),
                WritePrecondition::MatchesGeneration(Generation(1)),
            )
            .unwrap();
        assert!(matches!(stale, WriteOutcome::PreconditionFailed { .. }));

        let obj = store.get("k").unwrap().expect("object present");
        assert_eq!(obj.data, Bytes::from("v2"));
        assert_eq!(obj.generation, Generation(2));
    }

    #[test]
    fn matching_generation_on_missing_object_fails() {
        let store = MemoryStore::new();
        let outcome = store
            .put(
                "missing",
                Bytes::from("x"),
                WritePrecondition::MatchesGeneration(Generation(1)),
            )
            .unwrap();
        assert_eq!(outcome, WriteOutcome::PreconditionFailed { current: None });
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn clones_share_objects_and_list_by_prefix() {
        let store = MemoryStore::new();
        let other = store.clone();
        for key in ["r/data/a.csv", "r/data/b/a.csv", "r/results/results.json"] {
            other
                .put(key, Bytes::from("x"), WritePrecondition::Unconditional)
                .unwrap();
        }
        let mut data = store.list("r/data/").unwrap();
        data.sort();
        assert_eq!(data, vec!["r/data/a.csv", "r/data/b/a.csv"]);
        assert!(store.exists("r/results/results.json").unwrap());
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn poisoned_lock_is_an_internal_error() {
        let store = MemoryStore::new();
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.objects.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(Error::Internal { .. })));
        assert!(matches!(store.is_empty(), Err(Error::Internal { .. })));
        assert!(matches!(store.get("k"), Err(Error::Internal { .. })));
    }
}
