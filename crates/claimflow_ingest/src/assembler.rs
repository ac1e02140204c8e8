//! Batch assembly: parse every candidate file and concatenate their rows.
//!
//! Assembly is a pure function of the candidate list and the file contents,
//! so re-running it after a failed write yields the same batch.

use crate::error::{ParseFailure, ParseFailureKind};
use crate::storage::Storage;
use crate::types::Batch;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of assembling one cycle's candidates.
#[derive(Debug, Default)]
pub struct AssembleOutcome {
    pub batch: Batch,
    /// Files kept out of the batch, in listing order
    pub failures: Vec<ParseFailure>,
}

/// A claim file that parsed cleanly.
#[derive(Debug)]
struct ParsedFile {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

pub struct BatchAssembler {
    storage: Arc<dyn Storage>,
    watch_dir: PathBuf,
    required_columns: Vec<String>,
}

impl BatchAssembler {
    pub fn new(storage: Arc<dyn Storage>, watch_dir: PathBuf, required_columns: Vec<String>) -> Self {
        Self {
            storage,
            watch_dir,
            required_columns,
        }
    }

    /// Build one batch out of `file_names`.
    ///
    /// The first file that parses fixes the batch header. Later files must carry
    /// the same set of columns; their values are reordered to the batch header.
    pub fn assemble(&self, file_names: &[String]) -> AssembleOutcome {
        let mut batch: Option<Batch> = None;
        let mut failures = Vec::new();

        for file_name in file_names {
            let result = self
                .read_file(file_name)
                .and_then(|parsed| self.check_required(parsed))
                .and_then(|parsed| match batch.as_mut() {
                    Some(batch) => append_aligned(batch, file_name, parsed),
                    None => {
                        let mut first = Batch::new(parsed.header);
                        first.extend_from_file(file_name, parsed.rows);
                        batch = Some(first);
                        Ok(())
                    }
                });

            match result {
                Ok(()) => debug!(file = %file_name, "Read claim file"),
                Err(kind) => {
                    warn!(file = %file_name, error = %kind, "Excluding claim file from batch");
                    failures.push(ParseFailure {
                        file_name: file_name.clone(),
                        kind,
                    });
                }
            }
        }

        AssembleOutcome {
            batch: batch.unwrap_or_default(),
            failures,
        }
    }

    fn read_file(&self, file_name: &str) -> Result<ParsedFile, ParseFailureKind> {
        let bytes = self
            .storage
            .read(&self.watch_dir.join(file_name))
            .map_err(ParseFailureKind::Unreadable)?;
        parse_claim_csv(&bytes)
    }

    fn check_required(&self, parsed: ParsedFile) -> Result<ParsedFile, ParseFailureKind> {
        let missing: Vec<String> = self
            .required_columns
            .iter()
            .filter(|column| !parsed.header.contains(column))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(parsed)
        } else {
            Err(ParseFailureKind::MissingColumns(missing))
        }
    }
}

/// Append `parsed` to `batch` if it has the same column set.
fn append_aligned(
    batch: &mut Batch,
    file_name: &str,
    parsed: ParsedFile,
) -> Result<(), ParseFailureKind> {
    let same_set = parsed.header.len() == batch.columns().len()
        && parsed
            .header
            .iter()
            .all(|column| batch.column_index(column).is_some());
    if !same_set {
        return Err(ParseFailureKind::HeaderMismatch {
            expected: batch.columns().to_vec(),
            found: parsed.header,
        });
    }

    if parsed.header.as_slice() == batch.columns() {
        batch.extend_from_file(file_name, parsed.rows);
        return Ok(());
    }

    // Position in the file of each batch column.
    let order: Vec<usize> = batch
        .columns()
        .iter()
        .filter_map(|column| parsed.header.iter().position(|h| h == column))
        .collect();
    let rows = parsed
        .rows
        .into_iter()
        .map(|mut row| {
            order
                .iter()
                .map(|&idx| std::mem::take(&mut row[idx]))
                .collect()
        })
        .collect();
    batch.extend_from_file(file_name, rows);
    Ok(())
}

/// Parse a claim file with a header row.
///
/// Blank lines are skipped. Every record must have as many fields as the header.
fn parse_claim_csv(bytes: &[u8]) -> Result<ParsedFile, ParseFailureKind> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseFailureKind::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(ParseFailureKind::Empty);
    }
    let mut seen = HashSet::with_capacity(header.len());
    for column in &header {
        if !seen.insert(column.as_str()) {
            return Err(ParseFailureKind::DuplicateColumn(column.clone()));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(ParsedFile { header, rows })
}
