//! Directory-backed object store, e.g. a bucket mounted under `/mnt/gcs`.
//!
//! Objects live at `<root>/<key>`. Generations are tracked in sidecar files
//! under `<root>/.generations/<key>.gen`; an object without a sidecar (written
//! by some other tool) reports generation 1. Conditional writes hold an
//! exclusive `flock` on `<root>/.generations/<key>.lock` for the duration of
//! one check-and-write, so independent processes on one host cannot both win
//! the same generation.
//!
//! Writers stage the object and its sidecar as synced temp files, then rename
//! the object into place before the sidecar. Readers load the sidecar before
//! the object, so a reader may pair new bytes with an older generation (its
//! write then fails) but never old bytes with a newer generation. Only a failed
//! sidecar rename, after the object rename succeeded, can leave new bytes under
//! the old generation.

use super::{
    Generation, ObjectStore, StoredObject, WriteOutcome, WritePrecondition, precondition_holds,
    validate_key,
};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const META_DIR: &str = ".generations";
const TEMP_PREFIX: &str = ".tmp";

#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing `key`. The key is not validated.
    pub fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    fn sidecar_path(&self, key: &str, suffix: &str) -> PathBuf {
        let mut path = self.root.join(META_DIR);
        for segment in key.split('/') {
            path.push(segment);
        }
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        path.set_file_name(name);
        path
    }

    fn check_key(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        if key.split('/').next() == Some(META_DIR) {
            return Err(Error::InvalidArgument(format!(
                "store key '{key}' collides with the {META_DIR} directory"
            )));
        }
        Ok(())
    }

    fn current_generation(&self, key: &str) -> Result<Option<Generation>> {
        let recorded = read_generation(&self.sidecar_path(key, ".gen"))?;
        if !self.object_path(key).is_file() {
            return Ok(None);
        }
        Ok(Some(recorded.unwrap_or(Generation(1))))
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        self.check_key(key)?;
        let recorded = read_generation(&self.sidecar_path(key, ".gen"))?;
        let path = self.object_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::storage_with_source(
                    format!("reading {}", path.display()),
                    err,
                ));
            }
        };
        Ok(Some(StoredObject {
            data: Bytes::from(data),
            generation: recorded.unwrap_or(Generation(1)),
        }))
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome> {
        self.check_key(key)?;
        let object_path = self.object_path(key);
        let gen_path = self.sidecar_path(key, ".gen");
        let lock_path = self.sidecar_path(key, ".lock");

        let _lock = ObjectLock::acquire(&lock_path)?;

        let current = self.current_generation(key)?;
        if !precondition_holds(&precondition, current) {
            return Ok(WriteOutcome::PreconditionFailed { current });
        }
        let next = Generation(current.map_or(1, |g| g.0 + 1));

        // Stage both files before either rename so a failed sidecar write
        // leaves the previous bytes and generation in place.
        let staged_object = stage_file(&object_path, &data)?;
        let staged_gen = stage_file(&gen_path, next.0.to_string().as_bytes())?;
        commit_file(staged_object, &object_path)?;
        commit_file(staged_gen, &gen_path)?;
        Ok(WriteOutcome::Written { generation: next })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the deepest directory the prefix names.
        let dir_part = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            validate_key(dir_part)?;
            self.object_path(dir_part)
        };

        let mut keys = Vec::new();
        collect_keys(&start, &self.root, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        Ok(keys)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.check_key(key)?;
        Ok(self.object_path(key).is_file())
    }

    fn locate(&self, key: &str) -> String {
        self.object_path(key).display().to_string()
    }
}

fn collect_keys(dir: &Path, root: &Path, acc: &mut Vec<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(dir)
        .map_err(|err| Error::storage_with_source(format!("listing {}", dir.display()), err))?;
    for entry in entries {
        let entry = entry
            .map_err(|err| Error::storage_with_source(format!("listing {}", dir.display()), err))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::debug!(path = %path.display(), "skipping non-unicode entry");
            continue;
        };
        if name.starts_with(TEMP_PREFIX) {
            continue;
        }
        if path.is_dir() {
            if dir == root && name == META_DIR {
                continue;
            }
            collect_keys(&path, root, acc)?;
        } else if let Some(key) = key_for(&path, root) {
            acc.push(key);
        }
    }
    Ok(())
}

fn key_for(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|seg| seg.to_str()).collect();
    Some(segments?.join("/"))
}

fn read_generation(path: &Path) -> Result<Option<Generation>> {
    match fs::read_to_string(path) {
        Ok(raw) => raw.trim().parse::<u64>().map(|n| Some(Generation(n))).map_err(|_| {
            Error::storage(format!(
                "generation sidecar {} holds '{}'",
                path.display(),
                raw.trim()
            ))
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::storage_with_source(
            format!("reading {}", path.display()),
            err,
        )),
    }
}

/// Write `data` to a synced temp file next to `path`.
fn stage_file(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::storage(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|err| Error::storage_with_source(format!("creating {}", parent.display()), err))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent)
        .map_err(|err| Error::storage_with_source(format!("staging {}", path.display()), err))?;
    write_all(&mut tmp, data)
        .map_err(|err| Error::storage_with_source(format!("writing {}", path.display()), err))?;
    Ok(tmp)
}

/// Rename a staged file over `path`.
fn commit_file(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path)
        .map_err(|err| Error::storage_with_source(format!("renaming {}", path.display()), err.error))?;
    Ok(())
}

fn write_all(tmp: &mut NamedTempFile, data: &[u8]) -> io::Result<()> {
    tmp.write_all(data)?;
    tmp.as_file().sync_all()
}

/// Exclusive advisory lock on a per-object lock file, released on drop.
struct ObjectLock {
    _file: File,
}

impl ObjectLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::storage_with_source(format!("creating {}", parent.display()), err)
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|err| Error::storage_with_source(format!("opening {}", path.display()), err))?;
        lock_exclusive(&file)
            .map_err(|err| Error::storage_with_source(format!("locking {}", path.display()), err))?;
        Ok(Self { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // The lock is tied to this open file description and dropped with it.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

// No advisory locking off unix: conditional writes are only safe within one process.
#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn conditional_writes_across_handles() {
        let dir = TempDir::new().unwrap();
        let a = LocalStore::new(dir.path());
        let b = LocalStore::new(dir.path());

        let created = a
            .put(
                "r/results/results.json",
                Bytes::from("{}"),
                WritePrecondition::DoesNotExist,
            )
            .unwrap();
        assert_eq!(
            created,
            WriteOutcome::Written {
                generation: Generation(1)
            }
        );

        let lost = b
            .put(
                "r/results/results.json",
                Bytes::from("{\"x\":1}"),
                WritePrecondition::DoesNotExist,
            )
            .unwrap();
        assert_eq!(
            lost,
            WriteOutcome::PreconditionFailed {
                current: Some(Generation(1))
            }
        );

        let obj = b.get("r/results/results.json").unwrap().unwrap();
        assert_eq!(obj.generation, Generation(1));
        let updated = b
            .put(
                "r/results/results.json",
                Bytes::from("{\"x\":2}"),
                WritePrecondition::MatchesGeneration(obj.generation),
            )
            .unwrap();
        assert_eq!(
            updated,
            WriteOutcome::Written {
                generation: Generation(2)
            }
        );

        let stale = a
            .put(
                "r/results/results.json",
                Bytes::from("{\"x\":3}"),
                WritePrecondition::MatchesGeneration(Generation(1)),
            )
            .unwrap();
        assert!(matches!(stale, WriteOutcome::PreconditionFailed { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("r/results/results.json")).unwrap(),
            "{\"x\":2}"
        );
    }

    #[test]
    fn externally_written_files_report_generation_one() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("r/data")).unwrap();
        fs::write(dir.path().join("r/data/plate.csv"), "a,b\n").unwrap();

        let store = LocalStore::new(dir.path());
        let obj = store.get("r/data/plate.csv").unwrap().unwrap();
        assert_eq!(obj.generation, Generation(1));
        assert_eq!(obj.data, Bytes::from("a,b\n"));
        assert!(store.get("r/data/missing.csv").unwrap().is_none());
    }

    #[test]
    fn list_skips_generation_sidecars() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        for key in ["r/data/a/x.csv", "r/data/b/x.csv", "r/results/results.json"] {
            store
                .put(key, Bytes::from("1"), WritePrecondition::Unconditional)
                .unwrap();
        }
        let mut all = store.list("").unwrap();
        all.sort();
        assert_eq!(
            all,
            vec!["r/data/a/x.csv", "r/data/b/x.csv", "r/results/results.json"]
        );

        let mut data = store.list("r/data/").unwrap();
        data.sort();
        assert_eq!(data, vec!["r/data/a/x.csv", "r/data/b/x.csv"]);
        assert!(store.list("nowhere/").unwrap().is_empty());
    }

    #[test]
    fn staged_writes_stay_invisible_until_committed() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let key = "r/results/results.json";
        store
            .put(key, Bytes::from("old"), WritePrecondition::DoesNotExist)
            .unwrap();

        let object = stage_file(&store.object_path(key), b"new").unwrap();
        let generation = stage_file(&store.sidecar_path(key, ".gen"), b"2").unwrap();
        drop(object);
        drop(generation);

        let obj = store.get(key).unwrap().unwrap();
        assert_eq!(obj.data, Bytes::from("old"));
        assert_eq!(obj.generation, Generation(1));
        assert_eq!(store.list("r/").unwrap(), vec![key.to_string()]);
        let sidecars: Vec<_> = fs::read_dir(dir.path().join(".generations/r/results"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect();
        assert!(sidecars.is_empty(), "{sidecars:?}");

        let updated = store
            .put(
                key,
                Bytes::from("newer"),
                WritePrecondition::MatchesGeneration(Generation(1)),
            )
            .unwrap();
        assert_eq!(
            updated,
            WriteOutcome::Written {
                generation: Generation(2)
            }
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(".generations/r/results/results.json.gen"))
                .unwrap(),
            "2"
        );
    }

    #[test]
    fn rejects_escaping_and_reserved_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.get("../outside"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.put(
                ".generations/x",
                Bytes::from("1"),
                WritePrecondition::Unconditional
            ),
            Err(Error::InvalidArgument(_))
        ));
    }
}
