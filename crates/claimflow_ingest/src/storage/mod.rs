//! Storage abstraction for the watch, archive and consumer directories.
//!
//! Every pipeline stage goes through [`Storage`] instead of `std::fs`, so the
//! whole cycle can run against [`MemoryStorage`] in tests.
//!
//! # Example
//!
//! ```rust
//! use claimflow_ingest::{MemoryStorage, Storage};
//! use std::path::Path;
//!
//! let storage = MemoryStorage::new();
//! storage.insert_file("/watch/a.csv", "id\n1\n");
//! storage.create_dir_all(Path::new("/processed")).unwrap();
//! storage
//!     .rename(Path::new("/watch/a.csv"), Path::new("/processed/a.csv"))
//!     .unwrap();
//! assert!(storage.exists(Path::new("/processed/a.csv")).unwrap());
//! ```

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

use std::io;
use std::path::Path;

/// A directory entry as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub is_file: bool,
}

/// List/read/write/rename capability over a directory tree.
///
/// `rename` must be atomic: after it returns, the destination holds the full
/// content and the source is gone, with no observable intermediate state.
/// Local POSIX filesystems give this within a single mount. Network
/// filesystems may not, in which case retirement and artifact publication
/// only get the guarantee the filesystem provides.
pub trait Storage: Send + Sync {
    /// Create `path` and all missing ancestors.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Entries directly inside `path`. Fails with `NotFound` if `path` does not exist.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<StorageEntry>>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents` durably.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> io::Result<bool>;
}
