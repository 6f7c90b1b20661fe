//! Lock backends

use std::collections::HashSet;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tusk_core::*;

/// Process-local locker
#[derive(Clone, Default)]
pub struct MemoryLocker {
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Locker for MemoryLocker {
    fn new_lock(&self, id: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(MemoryLock {
            id: id.to_string(),
            held: self.held.clone(),
            acquired: false,
        }))
    }
}

struct MemoryLock {
    id: String,
    held: Arc<Mutex<HashSet<String>>>,
    acquired: bool,
}

impl Lock for MemoryLock {
    fn lock(&mut self) -> Result<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| TusError::Internal("lock table poisoned".to_string()))?;

        if !held.insert(self.id.clone()) {
            return Err(TusError::AlreadyLocked);
        }
        self.acquired = true;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.acquired {
            return Ok(());
        }
        self.held
            .lock()
            .map_err(|_| TusError::Internal("lock table poisoned".to_string()))?
            .remove(&self.id);
        self.acquired = false;
        Ok(())
    }
}

/// Locker holding an exclusive advisory lock on one `<id>.lock` file per
/// upload inside a directory, so that several processes sharing the
/// directory exclude each other. The OS drops the lock when its holder
/// exits, so a crashed process never leaves an upload locked.
#[derive(Debug, Clone)]
pub struct FileLocker {
    dir: PathBuf,
}

impl FileLocker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileLocker { dir: dir.into() }
    }
}

impl Locker for FileLocker {
    fn new_lock(&self, id: &str) -> Result<Box<dyn Lock>> {
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(TusError::NotFound);
        }
        Ok(Box::new(FileLock {
            path: self.dir.join(format!("{}.lock", id)),
            file: None,
        }))
    }
}

struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl Lock for FileLock {
    fn lock(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Err(TusError::AlreadyLocked);
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.file = Some(file);
                Ok(())
            }
            Err(e) if is_contended(&e) => Err(TusError::AlreadyLocked),
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&mut self) -> Result<()> {
        // Lock files stay on disk
        match self.file.take() {
            Some(file) => Ok(FileExt::unlock(&file)?),
            None => Ok(()),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
