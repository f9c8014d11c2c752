//! Single-writer locking of an index directory.
//!
//! Writers hold an exclusive OS advisory lock on `write.lock`; readers take a shared
//! lock on it while loading. The OS drops the lock when the holding process exits,
//! however it exits, so the file itself may linger and carries no meaning on its own.

use crate::error::{Error, Result};
use crate::persist::IndexPaths;
use fs2::FileExt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io;
use std::path::PathBuf;

fn is_contended(e: &io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Exclusive lock held for the lifetime of a build or a direct persist.
pub(crate) struct WriteLock {
    file: File,
    path: PathBuf,
}

impl WriteLock {
    pub(crate) fn acquire(paths: &IndexPaths) -> Result<Self> {
        create_dir_all(&paths.root).map_err(|e| Error::io("create directory", &paths.root, e))?;
        let path = paths.write_lock();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io("open lock", &path, e))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if is_contended(&e) => Err(Error::IndexLocked { path: paths.root.clone() }),
            Err(e) => Err(Error::io("lock", path, e)),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release write lock");
        }
    }
}

/// Shared lock held while an index is read. A directory without a lock file
/// has never been written through a session and is read unguarded.
pub(crate) struct ReadLock {
    file: Option<File>,
}

impl ReadLock {
    pub(crate) fn acquire(paths: &IndexPaths) -> Result<Self> {
        let path = paths.write_lock();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self { file: None }),
            Err(e) => return Err(Error::io("open lock", path, e)),
        };
        match FileExt::try_lock_shared(&file) {
            Ok(()) => Ok(Self { file: Some(file) }),
            Err(e) if is_contended(&e) => Err(Error::IndexLocked { path: paths.root.clone() }),
            Err(e) => Err(Error::io("lock", path, e)),
        }
    }
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.unlock();
        }
    }
}
