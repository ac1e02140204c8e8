//! Moving consumed files out of the watch directory.

use crate::error::{ParseFailure, RetireFailure};
use crate::storage::Storage;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of moving a set of files out of the watch directory.
#[derive(Debug, Default)]
pub struct RetirementReport {
    /// `(source name, archived name)` for each file moved
    pub moved: Vec<(String, String)>,
    pub failures: Vec<RetireFailure>,
}

impl RetirementReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

pub struct RetirementManager {
    storage: Arc<dyn Storage>,
    watch_dir: PathBuf,
    processed_dir: PathBuf,
    failed_dir: Option<PathBuf>,
}

impl RetirementManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        watch_dir: PathBuf,
        processed_dir: PathBuf,
        failed_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            storage,
            watch_dir,
            processed_dir,
            failed_dir,
        }
    }

    /// Move batched source files into the processed archive.
    ///
    /// Call only once the batch artifact holding their rows is published. A file
    /// that fails to move is reported and stays in the watch directory; it will
    /// be batched again on the next cycle.
    pub fn retire(&self, file_names: &[String]) -> RetirementReport {
        let report = self.relocate_all(file_names, &self.processed_dir);
        if !report.moved.is_empty() {
            info!(
                moved = report.moved_count(),
                failed = report.failures.len(),
                dir = %self.processed_dir.display(),
                "Retired source files"
            );
        }
        report
    }

    /// Move unparseable files into the failed archive, if one is configured.
    pub fn quarantine(&self, failures: &[ParseFailure]) -> RetirementReport {
        let Some(failed_dir) = &self.failed_dir else {
            return RetirementReport::default();
        };
        let names: Vec<String> = failures.iter().map(|f| f.file_name.clone()).collect();
        let report = self.relocate_all(&names, failed_dir);
        if !report.moved.is_empty() {
            warn!(
                moved = report.moved_count(),
                dir = %failed_dir.display(),
                "Quarantined unparseable claim files"
            );
        }
        report
    }

    fn relocate_all(&self, file_names: &[String], dest_dir: &Path) -> RetirementReport {
        let mut report = RetirementReport::default();
        for file_name in file_names {
            match self.relocate(file_name, dest_dir) {
                Ok(archived) => report.moved.push((file_name.clone(), archived)),
                Err(source) => {
                    let failure = RetireFailure {
                        file_name: file_name.clone(),
                        destination: dest_dir.to_path_buf(),
                        source,
                    };
                    warn!(error = %failure, "Source file stays in watch directory");
                    report.failures.push(failure);
                }
            }
        }
        report
    }

    /// Rename one file into `dest_dir`, never replacing an archived file.
    fn relocate(&self, file_name: &str, dest_dir: &Path) -> io::Result<String> {
        let archived = self.archive_name(file_name, dest_dir)?;
        self.storage
            .rename(&self.watch_dir.join(file_name), &dest_dir.join(&archived))?;
        Ok(archived)
    }

    fn archive_name(&self, file_name: &str, dest_dir: &Path) -> io::Result<String> {
        if !self.storage.exists(&dest_dir.join(file_name))? {
            return Ok(file_name.to_string());
        }
        let (stem, ext) = match file_name.rfind('.') {
            Some(idx) if idx > 0 => file_name.split_at(idx),
            _ => (file_name, ""),
        };
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}{}", stem, n, ext);
            if !self.storage.exists(&dest_dir.join(&candidate))? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}
