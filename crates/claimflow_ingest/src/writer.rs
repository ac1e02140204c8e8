//! Publication of batch artifacts to the consumer directory.
//!
//! The artifact is written under a hidden temporary name (`.{name}.tmp`) and
//! renamed into place once complete. Consumers that ignore hidden files never
//! see a partial artifact.

use crate::error::{is_not_found, IngestError, Result};
use crate::storage::Storage;
use crate::types::{ArtifactFormat, Batch, BatchArtifact};
use arrow::array::{ArrayRef, StringArray};
use arrow::record_batch::RecordBatch;
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const TEMP_SUFFIX: &str = ".tmp";

pub struct BatchWriter {
    storage: Arc<dyn Storage>,
    consumer_dir: PathBuf,
    prefix: String,
    format: ArtifactFormat,
}

impl BatchWriter {
    pub fn new(
        storage: Arc<dyn Storage>,
        consumer_dir: PathBuf,
        prefix: impl Into<String>,
        format: ArtifactFormat,
    ) -> Self {
        Self {
            storage,
            consumer_dir,
            prefix: prefix.into(),
            format,
        }
    }

    pub fn consumer_dir(&self) -> &Path {
        &self.consumer_dir
    }

    /// Publish `batch` under a name derived from the current local time.
    pub fn write(&self, batch: &Batch) -> Result<BatchArtifact> {
        self.write_at(batch, Local::now())
    }

    /// Publish `batch` under a name derived from `now`.
    pub fn write_at(&self, batch: &Batch, now: DateTime<Local>) -> Result<BatchArtifact> {
        let stem = format!("{}_{}", self.prefix, now.format("%Y%m%d_%H%M%S_%6f"));
        let name = self.unique_name(&stem).map_err(|source| IngestError::Write {
            artifact: stem.clone(),
            source,
        })?;
        let write_err = |source: io::Error| IngestError::Write {
            artifact: name.clone(),
            source,
        };

        let contents = encode_batch(batch, self.format).map_err(write_err)?;

        let final_path = self.consumer_dir.join(&name);
        let temp_path = self.consumer_dir.join(temp_name(&name));

        if let Err(e) = self.storage.write(&temp_path, &contents) {
            self.discard_temp(&temp_path);
            return Err(write_err(e));
        }
        if let Err(e) = self.storage.rename(&temp_path, &final_path) {
            self.discard_temp(&temp_path);
            return Err(write_err(e));
        }

        info!(
            artifact = %name,
            rows = batch.num_rows(),
            files = batch.source_files().len(),
            bytes = contents.len(),
            "Published batch artifact"
        );
        Ok(BatchArtifact {
            name,
            path: final_path,
            rows: batch.num_rows(),
            format: self.format,
        })
    }

    /// Remove temporary artifacts left behind by an interrupted run.
    ///
    /// Only hidden files carrying this writer's prefix and the temp suffix are touched.
    pub fn sweep_stale_temps(&self) -> io::Result<usize> {
        let marker = format!(".{}_", self.prefix);
        let mut removed = 0;
        for entry in self.storage.list_dir(&self.consumer_dir)? {
            if !entry.is_file || !entry.name.starts_with(&marker) || !entry.name.ends_with(TEMP_SUFFIX)
            {
                continue;
            }
            let path = self.consumer_dir.join(&entry.name);
            match self.storage.remove_file(&path) {
                Ok(()) => {
                    warn!(path = %path.display(), "Removed stale temporary artifact");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale temporary artifact"),
            }
        }
        Ok(removed)
    }

    /// `{stem}.{ext}`, or `{stem}_{n}.{ext}` if that name is already taken.
    fn unique_name(&self, stem: &str) -> io::Result<String> {
        let ext = self.format.extension();
        let mut candidate = format!("{}.{}", stem, ext);
        let mut n = 1u32;
        while self.storage.exists(&self.consumer_dir.join(&candidate))?
            || self
                .storage
                .exists(&self.consumer_dir.join(temp_name(&candidate)))?
        {
            candidate = format!("{}_{}.{}", stem, n, ext);
            n += 1;
        }
        Ok(candidate)
    }

    fn discard_temp(&self, temp_path: &Path) {
        match self.storage.remove_file(temp_path) {
            Ok(()) => warn!(path = %temp_path.display(), "Discarded temporary artifact"),
            Err(e) if is_not_found(&e) => {}
            Err(e) => warn!(path = %temp_path.display(), error = %e, "Failed to discard temporary artifact"),
        }
    }
}

fn temp_name(name: &str) -> String {
    format!(".{}{}", name, TEMP_SUFFIX)
}

fn encode_batch(batch: &Batch, format: ArtifactFormat) -> io::Result<Vec<u8>> {
    match format {
        ArtifactFormat::Csv => encode_csv(batch),
        ArtifactFormat::Parquet => encode_parquet(batch),
    }
}

fn encode_csv(batch: &Batch) -> io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(batch.columns())?;
    for record in batch.records() {
        writer.write_record(&record.values)?;
    }
    writer
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

/// Every column is written as non-null UTF-8; typing is left to the consumer.
fn encode_parquet(batch: &Batch) -> io::Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(
        batch
            .columns()
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = (0..batch.columns().len())
        .map(|idx| {
            Arc::new(StringArray::from_iter_values(
                batch.records().iter().map(|r| r.values[idx].as_str()),
            )) as ArrayRef
        })
        .collect();
    let record_batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let props = parquet::file::properties::WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer =
        parquet::arrow::arrow_writer::ArrowWriter::try_new(&mut buffer, schema, Some(props))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writer
        .write(&record_batch)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writer
        .close()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    fn sample_batch() -> Batch {
        let mut batch = Batch::new(vec!["policy_number".into(), "incident_city".into()]);
        batch.extend_from_file(
            "a.csv",
            vec![
                vec!["1".into(), "Columbus".into()],
                vec!["2".into(), "Riverwood, North".into()],
            ],
        );
        batch
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 8, 1, 19, 19, 38).unwrap()
    }

    fn writer(storage: &MemoryStorage, format: ArtifactFormat) -> BatchWriter {
        storage.create_dir_all(Path::new("/out")).unwrap();
        BatchWriter::new(Arc::new(storage.clone()), PathBuf::from("/out"), "claims_batch", format)
    }

    #[test]
    fn test_csv_artifact_is_published() {
        let storage = MemoryStorage::new();
        let artifact = writer(&storage, ArtifactFormat::Csv)
            .write_at(&sample_batch(), fixed_time())
            .unwrap();

        assert_eq!(artifact.name, "claims_batch_20250801_191938_000000.csv");
        assert_eq!(artifact.rows, 2);
        let content = String::from_utf8(storage.file(&artifact.path).unwrap()).unwrap();
        assert_eq!(
            content,
            "policy_number,incident_city\n1,Columbus\n2,\"Riverwood, North\"\n"
        );
        assert_eq!(storage.files_in("/out"), vec![artifact.name]);
    }

    #[test]
    fn test_same_timestamp_gets_suffix() {
        let storage = MemoryStorage::new();
        let writer = writer(&storage, ArtifactFormat::Csv);

        let first = writer.write_at(&sample_batch(), fixed_time()).unwrap();
        let second = writer.write_at(&sample_batch(), fixed_time()).unwrap();

        assert_ne!(first.name, second.name);
        assert_eq!(second.name, "claims_batch_20250801_191938_000000_1.csv");
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let storage = MemoryStorage::new();
        let writer = writer(&storage, ArtifactFormat::Csv);
        storage.set_fail_writes(true);

        let err = writer.write_at(&sample_batch(), fixed_time()).unwrap_err();
        assert!(matches!(err, IngestError::Write { .. }));
        assert!(storage.files_in("/out").is_empty());
    }

    #[test]
    fn test_failed_rename_discards_temp() {
        let storage = MemoryStorage::new();
        let writer = writer(&storage, ArtifactFormat::Csv);
        storage.fail_renames_to("/out");

        assert!(writer.write_at(&sample_batch(), fixed_time()).is_err());
        assert!(storage.files_in("/out").is_empty());
    }

    #[test]
    fn test_parquet_artifact_has_magic() {
        let storage = MemoryStorage::new();
        let artifact = writer(&storage, ArtifactFormat::Parquet)
            .write_at(&sample_batch(), fixed_time())
            .unwrap();

        assert!(artifact.name.ends_with(".parquet"));
        let bytes = storage.file(&artifact.path).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
    }

    #[test]
    fn test_sweep_only_touches_own_temps() {
        let storage = MemoryStorage::new();
        let writer = writer(&storage, ArtifactFormat::Csv);
        storage.insert_file("/out/.claims_batch_20250801_191938_000000.csv.tmp", "half");
        storage.insert_file("/out/.other_tool.tmp", "x");
        storage.insert_file("/out/claims_batch_20250801_100000_000000.csv", "id\n");

        assert_eq!(writer.sweep_stale_temps().unwrap(), 1);
        assert_eq!(
            storage.files_in("/out"),
            vec![".other_tool.tmp", "claims_batch_20250801_100000_000000.csv"]
        );
    }
}
