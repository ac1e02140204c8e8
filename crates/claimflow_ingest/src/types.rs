//! Batch data model shared by the pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One row of a claim file.
///
/// Values are stored in the column order of the [`Batch`] that owns the record;
/// use [`Batch::value`] to look a value up by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Name of the source file this row came from
    pub source_file: Arc<str>,
    pub values: Vec<String>,
}

/// The rows assembled from every file read in one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    columns: Vec<String>,
    records: Vec<Record>,
    source_files: Vec<String>,
}

impl Batch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
            source_files: Vec::new(),
        }
    }

    /// Append the rows of one source file. Values must already follow
    /// [`Batch::columns`] order.
    pub(crate) fn extend_from_file(&mut self, file_name: &str, rows: Vec<Vec<String>>) {
        let source: Arc<str> = Arc::from(file_name);
        self.records.extend(rows.into_iter().map(|values| Record {
            source_file: Arc::clone(&source),
            values,
        }));
        self.source_files.push(file_name.to_string());
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Source files in the order their rows appear.
    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    pub fn num_rows(&self) -> usize {
        self.records.len()
    }

    /// A batch with no constituent files. Nothing gets written for it.
    pub fn is_empty(&self) -> bool {
        self.source_files.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.records
            .get(row)
            .and_then(|record| record.values.get(idx))
            .map(String::as_str)
    }

    pub fn rows_from(&self, file_name: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.source_file.as_ref() == file_name)
            .count()
    }
}

/// On-disk encoding of batch artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Csv,
    Parquet,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ArtifactFormat::Csv),
            "parquet" => Ok(ArtifactFormat::Parquet),
            other => Err(format!("unknown artifact format '{}'", other)),
        }
    }
}

/// A batch that has been made visible in the consumer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchArtifact {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub format: ArtifactFormat,
}

/// One file-level problem, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub file: String,
    pub reason: String,
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub candidates: usize,
    pub files_batched: usize,
    pub rows: usize,
    pub artifact: Option<String>,
    pub retired: usize,
    pub quarantined: usize,
    pub parse_failures: Vec<FailureSummary>,
    pub retire_failures: Vec<FailureSummary>,
    pub duration_ms: u64,
}

impl CycleReport {
    /// True when the cycle found nothing to do.
    pub fn is_idle(&self) -> bool {
        self.candidates == 0
    }
}
