//! Single-file JSON documents with locked read-modify-write and atomic replace.
//!
//! Every mutation goes through [`JsonDocument::locked`], which holds an
//! in-process mutex plus an exclusive advisory lock on `<file>.lock` for the
//! whole read-modify-write. Writes land in a temp file in the same directory
//! and are renamed over the target, so readers see either the old or the new
//! document and never a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{LabError, Result};

const LOCK_SUFFIX: &str = ".lock";

pub struct JsonDocument<T> {
    path: PathBuf,
    guard: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

/// Handle passed to [`JsonDocument::locked`] closures; reads and writes happen under the lock.
pub struct LockedDocument<'a, T> {
    doc: &'a JsonDocument<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the document without taking the lock. `Ok(None)` when the file is absent.
    pub fn read(&self) -> Result<Option<T>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LabError::DataCorruption {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the whole document.
    pub fn write(&self, value: &T) -> Result<()> {
        self.locked(|doc| doc.write(value))
    }

    /// Run `f` with exclusive access to the document.
    pub fn locked<R>(&self, f: impl FnOnce(&LockedDocument<'_, T>) -> Result<R>) -> Result<R> {
        let _in_process = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock_file = self.acquire_file_lock()?;
        let out = f(&LockedDocument { doc: self });
        if let Err(err) = FileExt::unlock(&lock_file) {
            tracing::warn!("releasing lock on {} failed: {err}", self.path.display());
        }
        out
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(LOCK_SUFFIX);
        self.path.with_file_name(name)
    }

    fn acquire_file_lock(&self) -> Result<File> {
        ensure_parent(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn persist(&self, value: &T) -> Result<()> {
        let parent = ensure_parent(&self.path)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        let mut body = serde_json::to_vec_pretty(value)?;
        body.push(b'\n');
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        tracing::debug!("persisted {}", self.path.display());
        Ok(())
    }
}

impl<T> LockedDocument<'_, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn read(&self) -> Result<Option<T>> {
        self.doc.read()
    }

    pub fn write(&self, value: &T) -> Result<()> {
        self.doc.persist(value)
    }
}

fn ensure_parent(path: &Path) -> Result<&Path> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    Ok(parent)
}
