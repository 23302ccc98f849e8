//! Directory Store
//!
//! Thin wrapper over the handful of filesystem operations that are atomic on
//! local disks and on the network filesystems ddmq is deployed on:
//!
//! - exclusive create (a file appears fully written under its final name, or not at all)
//! - rename (one winner when several processes move the same source)
//! - delete
//! - directory listing
//!
//! Nothing here takes a lock. Every race in the queue is settled by which
//! process gets its rename or exclusive create in first.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Prefix of in-progress files. Listings used for message discovery skip them.
pub const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Path already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::AlreadyExists => StoreError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Returns true for dotfiles (temp files, sequence counters, hidden bookkeeping)
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Stateless handle onto the filesystem primitives used by the queue engine
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryStore;

impl DirectoryStore {
    pub fn new() -> Self {
        Self
    }

    /// Create `path` with `bytes`, failing with `AlreadyExists` if it is already there.
    ///
    /// The content is written and synced to a temp file in the same directory
    /// first and then hard-linked into place, so no reader ever sees a partial
    /// body and the link itself is the exclusivity check. Filesystems without
    /// hard links fall back to `O_EXCL` create followed by the write.
    pub fn create_exclusive(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let dir = parent_of(path);
        let tmp = self.write_temp(dir, bytes)?;

        let result = match fs::hard_link(&tmp, path) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
                log::debug!(
                    "Hard links unavailable in {} ({}), using exclusive create",
                    dir.display(),
                    e
                );
                self.create_new(path, bytes)
            }
            Err(e) => Err(StoreError::from_io(path, e)),
        };

        if let Err(e) = fs::remove_file(&tmp) {
            log::debug!("Could not remove temp file {}: {}", tmp.display(), e);
        }
        result
    }

    /// Give the existing file `src` a second name `dst`, failing if `dst` exists.
    ///
    /// `NotFound` means `src` is gone, `AlreadyExists` that another process
    /// created `dst` first. Without hard link support the check on `src` and
    /// the exclusive create of `dst` are two separate steps.
    pub fn link_exclusive(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        match fs::hard_link(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
                let bytes = self.read(src)?;
                self.create_new(dst, &bytes)
            }
            // Linux reports a missing source as NotFound, but the error path is
            // ambiguous between the two names
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                path: src.to_path_buf(),
            }),
            Err(e) => Err(StoreError::from_io(dst, e)),
        }
    }

    /// Atomically replace the content of `path` (temp file + rename over).
    ///
    /// Readers observe either the old or the new content. Unlike
    /// [`create_exclusive`](Self::create_exclusive) this recreates `path` if
    /// it vanished in the meantime.
    pub fn replace(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let tmp = self.write_temp(parent_of(path), bytes)?;
        self.rename(&tmp, path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }

    /// Write `bytes` to a fresh hidden temp file inside `dir` and return its path.
    pub fn write_temp(&self, dir: &Path, bytes: &[u8]) -> StoreResult<PathBuf> {
        let tmp = dir.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()));
        self.create_new(&tmp, bytes)?;
        Ok(tmp)
    }

    /// Atomic move. `NotFound` means another process moved or removed `src` first.
    pub fn rename(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        fs::rename(src, dst).map_err(|e| StoreError::from_io(src, e))
    }

    /// Remove a file. Callers decide whether `NotFound` counts as success.
    pub fn delete(&self, path: &Path) -> StoreResult<()> {
        fs::remove_file(path).map_err(|e| StoreError::from_io(path, e))
    }

    pub fn read(&self, path: &Path) -> StoreResult<Vec<u8>> {
        fs::read(path).map_err(|e| StoreError::from_io(path, e))
    }

    /// Names of the regular files in `dir`, in whatever order the filesystem returns them.
    pub fn list(&self, dir: &Path) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::from_io(dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(dir, e))?;
            // An entry removed between readdir and stat is simply skipped
            let is_file = match entry.file_type() {
                Ok(file_type) => file_type.is_file(),
                Err(_) => continue,
            };
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::warn!("Skipping non UTF-8 file name in {}: {:?}", dir.display(), raw),
            }
        }
        Ok(names)
    }

    /// Names of the subdirectories of `dir`
    pub fn list_dirs(&self, dir: &Path) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::from_io(dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(dir, e))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Names of every entry in `dir`, whatever its type
    pub fn list_entries(&self, dir: &Path) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::from_io(dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::from_io(dir, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Last modification time of `path`
    pub fn modified(&self, path: &Path) -> StoreResult<SystemTime> {
        fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| StoreError::from_io(path, e))
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    /// Create a single directory; `AlreadyExists` if it is there.
    pub fn create_dir(&self, path: &Path) -> StoreResult<()> {
        fs::create_dir(path).map_err(|e| StoreError::from_io(path, e))
    }

    /// Create a directory and any missing parents, tolerating existing ones.
    pub fn create_dir_all(&self, path: &Path) -> StoreResult<()> {
        fs::create_dir_all(path).map_err(|e| StoreError::from_io(path, e))
    }

    /// Remove an empty directory.
    pub fn remove_dir(&self, path: &Path) -> StoreResult<()> {
        fs::remove_dir(path).map_err(|e| StoreError::from_io(path, e))
    }

    /// Remove a directory tree (queue deletion only; never used on the message path)
    pub fn remove_dir_all(&self, path: &Path) -> StoreResult<()> {
        fs::remove_dir_all(path).map_err(|e| StoreError::from_io(path, e))
    }

    fn create_new(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| StoreError::from_io(path, e))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::from_io(path, e))
    }
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}
