use super::{Storage, StorageEntry};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory [`Storage`] with fault injection, for tests.
///
/// Clones share state, so a test can keep a handle while the pipeline owns another.
/// Renames happen under one lock and are therefore atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    fail_writes: bool,
    failing_writes_left: usize,
    fail_rename_from: HashSet<PathBuf>,
    fail_renames_to: HashSet<PathBuf>,
    unreadable: HashSet<PathBuf>,
    denied: HashSet<PathBuf>,
}

impl MemoryState {
    fn dir_exists(&self, path: &Path) -> bool {
        path.parent().is_none() || path.as_os_str().is_empty() || self.dirs.contains(path)
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) => self.dir_exists(parent),
            None => true,
        }
    }

    fn is_denied(&self, path: &Path) -> bool {
        path.ancestors().any(|a| self.denied.contains(a))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{}: permission denied", path.display()),
    )
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> io::Result<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory storage lock poisoned"))
    }

    /// Place a file, creating its parent directories.
    pub fn insert_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = path.as_ref();
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = path.parent() {
            for ancestor in parent.ancestors() {
                if !ancestor.as_os_str().is_empty() {
                    state.dirs.insert(ancestor.to_path_buf());
                }
            }
        }
        state
            .files
            .insert(path.to_path_buf(), contents.as_ref().to_vec());
    }

    /// Content of `path`, if it is a file.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.files.get(path.as_ref()).cloned())
    }

    /// Sorted names of the files directly inside `dir`.
    pub fn files_in(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let dir = dir.as_ref();
        let Ok(state) = self.inner.lock() else {
            return Vec::new();
        };
        state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }

    /// Make every subsequent `write` persist half its content and then fail.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_writes = fail;
        }
    }

    /// Make only the next `count` writes fail, like [`MemoryStorage::set_fail_writes`].
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing_writes_left = count;
        }
    }

    /// Make renames whose source is `path` fail.
    pub fn fail_rename_from(&self, path: impl AsRef<Path>) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_rename_from.insert(path.as_ref().to_path_buf());
        }
    }

    /// Make renames whose destination lies directly in `dir` fail.
    pub fn fail_renames_to(&self, dir: impl AsRef<Path>) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_renames_to.insert(dir.as_ref().to_path_buf());
        }
    }

    pub fn set_unreadable(&self, path: impl AsRef<Path>) {
        if let Ok(mut state) = self.inner.lock() {
            state.unreadable.insert(path.as_ref().to_path_buf());
        }
    }

    /// Deny every operation on `path` and anything beneath it.
    pub fn deny_access(&self, path: impl AsRef<Path>) {
        if let Ok(mut state) = self.inner.lock() {
            state.denied.insert(path.as_ref().to_path_buf());
        }
    }

    /// Lift every injected fault.
    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_writes = false;
            state.failing_writes_left = 0;
            state.fail_rename_from.clear();
            state.fail_renames_to.clear();
            state.unreadable.clear();
            state.denied.clear();
        }
    }
}

impl Storage for MemoryStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state()?;
        if state.is_denied(path) {
            return Err(denied(path));
        }
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            if state.files.contains_key(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}: is a file", ancestor.display()),
                ));
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<StorageEntry>> {
        let state = self.state()?;
        if state.is_denied(path) {
            return Err(denied(path));
        }
        if !state.dir_exists(path) {
            return Err(not_found(path));
        }
        let file_entries = state
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .map(|p| (p, true));
        let dir_entries = state
            .dirs
            .iter()
            .filter(|p| p.parent() == Some(path))
            .map(|p| (p, false));
        Ok(file_entries
            .chain(dir_entries)
            .filter_map(|(p, is_file)| {
                p.file_name().map(|n| StorageEntry {
                    name: n.to_string_lossy().to_string(),
                    is_file,
                })
            })
            .collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.state()?;
        if state.is_denied(path) || state.unreadable.contains(path) {
            return Err(denied(path));
        }
        state.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.state()?;
        if state.is_denied(path) {
            return Err(denied(path));
        }
        if !state.parent_exists(path) {
            return Err(not_found(path));
        }
        if state.fail_writes || state.failing_writes_left > 0 {
            state.failing_writes_left = state.failing_writes_left.saturating_sub(1);
            let partial = contents[..contents.len() / 2].to_vec();
            state.files.insert(path.to_path_buf(), partial);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: injected write failure", path.display()),
            ));
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state()?;
        if state.is_denied(from) || state.is_denied(to) {
            return Err(denied(from));
        }
        let into_failing_dir = to
            .parent()
            .map(|p| state.fail_renames_to.contains(p))
            .unwrap_or(false);
        if state.fail_rename_from.contains(from) || into_failing_dir {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} -> {}: injected rename failure",
                    from.display(),
                    to.display()
                ),
            ));
        }
        if !state.parent_exists(to) {
            return Err(not_found(to));
        }
        let contents = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state()?;
        if state.is_denied(path) {
            return Err(denied(path));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        let state = self.state()?;
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }
}
