//! Candidate discovery in the watch directory

use crate::error::{is_not_found, IngestError, Result};
use crate::storage::Storage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only snapshot of the claim files waiting in the watch directory.
pub struct FileCatalog {
    storage: Arc<dyn Storage>,
    watch_dir: PathBuf,
    suffix: String,
}

impl FileCatalog {
    pub fn new(storage: Arc<dyn Storage>, watch_dir: PathBuf, suffix: impl Into<String>) -> Self {
        Self {
            storage,
            watch_dir,
            suffix: suffix.into(),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// File names carrying the configured suffix, sorted lexicographically.
    ///
    /// Hidden entries are skipped: producers stage partial uploads under a
    /// leading dot, the same way batch artifacts are staged. A missing watch
    /// directory is created and reported as empty.
    pub fn list_candidates(&self) -> Result<Vec<String>> {
        let entries = match self.storage.list_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(e) if is_not_found(&e) => {
                info!(dir = %self.watch_dir.display(), "Watch directory missing, creating it");
                self.storage
                    .create_dir_all(&self.watch_dir)
                    .map_err(|source| IngestError::List {
                        path: self.watch_dir.clone(),
                        source,
                    })?;
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(IngestError::List {
                    path: self.watch_dir.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|e| e.is_file)
            .map(|e| e.name)
            .filter(|name| !name.starts_with('.') && name.ends_with(&self.suffix))
            .collect();
        names.sort();

        debug!(dir = %self.watch_dir.display(), candidates = names.len(), "Listed watch directory");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn catalog(storage: &MemoryStorage) -> FileCatalog {
        FileCatalog::new(Arc::new(storage.clone()), PathBuf::from("/in"), ".csv")
    }

    #[test]
    fn test_filters_by_suffix_and_sorts() {
        let storage = MemoryStorage::new();
        storage.insert_file("/in/claims_b.csv", "id\n");
        storage.insert_file("/in/claims_a.csv", "id\n");
        storage.insert_file("/in/readme.txt", "hello");
        storage.insert_file("/in/.claims_c.csv", "id\n");
        storage.insert_file("/in/archive.csv/inner.csv", "id\n");

        let names = catalog(&storage).list_candidates().unwrap();
        assert_eq!(names, vec!["claims_a.csv", "claims_b.csv"]);
    }

    #[test]
    fn test_empty_dir_is_empty() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/in")).unwrap();
        assert!(catalog(&storage).list_candidates().unwrap().is_empty());
    }

    #[test]
    fn test_missing_dir_is_created() {
        let storage = MemoryStorage::new();
        assert!(catalog(&storage).list_candidates().unwrap().is_empty());
        assert!(storage.exists(Path::new("/in")).unwrap());
    }

    #[test]
    fn test_inaccessible_dir_is_list_failure() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/in")).unwrap();
        storage.deny_access("/in");

        let err = catalog(&storage).list_candidates().unwrap_err();
        assert!(matches!(err, IngestError::List { .. }));
    }
}
