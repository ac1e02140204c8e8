use super::{Storage, StorageEntry};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// [`Storage`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<StorageEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(dir = %path.display(), name = ?raw, "Skipping non UTF-8 entry");
                    continue;
                }
            };
            // Follow symlinks so a linked claim file is listed like a regular one.
            let is_file = match fs::metadata(entry.path()) {
                Ok(meta) => meta.is_file(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(dir = %path.display(), name = %name, "Skipping dangling symlink");
                    continue;
                }
                Err(e) => return Err(e),
            };
            entries.push(StorageEntry { name, is_file });
        }
        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }
}
