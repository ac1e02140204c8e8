//! One poll cycle: list, assemble, write, retire.

use crate::assembler::BatchAssembler;
use crate::catalog::FileCatalog;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::retirement::{RetirementManager, RetirementReport};
use crate::storage::{LocalStorage, Storage};
use crate::types::{CycleReport, FailureSummary};
use crate::writer::BatchWriter;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the pipeline is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Polling,
    Assembling,
    Writing,
    Retiring,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Polling => "polling",
            PipelineState::Assembling => "assembling",
            PipelineState::Writing => "writing",
            PipelineState::Retiring => "retiring",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

pub struct IngestPipeline {
    config: IngestConfig,
    storage: Arc<dyn Storage>,
    catalog: FileCatalog,
    assembler: BatchAssembler,
    writer: BatchWriter,
    retirement: RetirementManager,
    state: PipelineState,
    cycles: u64,
}

impl IngestPipeline {
    /// Build a pipeline over `storage`. The config is validated first.
    pub fn new(config: IngestConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;
        let catalog = FileCatalog::new(
            Arc::clone(&storage),
            config.watch_dir.clone(),
            config.file_suffix.clone(),
        );
        let assembler = BatchAssembler::new(
            Arc::clone(&storage),
            config.watch_dir.clone(),
            config.required_columns.clone(),
        );
        let writer = BatchWriter::new(
            Arc::clone(&storage),
            config.consumer_dir.clone(),
            config.artifact_prefix.clone(),
            config.artifact_format,
        );
        let retirement = RetirementManager::new(
            Arc::clone(&storage),
            config.watch_dir.clone(),
            config.processed_dir.clone(),
            config.failed_dir.clone(),
        );
        Ok(Self {
            config,
            storage,
            catalog,
            assembler,
            writer,
            retirement,
            state: PipelineState::Idle,
            cycles: 0,
        })
    }

    /// Pipeline over the local filesystem.
    pub fn local(config: IngestConfig) -> Result<Self> {
        Self::new(config, Arc::new(LocalStorage::new()))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.set_state(PipelineState::Stopped);
    }

    /// Create every directory the pipeline owns and clear leftovers of a crashed run.
    ///
    /// Failing to create one of the directories is fatal: the pipeline cannot run.
    pub fn prepare(&self) -> Result<()> {
        let mut dirs: Vec<&PathBuf> = vec![
            &self.config.watch_dir,
            &self.config.processed_dir,
            &self.config.consumer_dir,
        ];
        if let Some(failed) = &self.config.failed_dir {
            dirs.push(failed);
        }
        for dir in dirs {
            self.storage
                .create_dir_all(dir)
                .map_err(|source| IngestError::Prepare {
                    path: dir.clone(),
                    source,
                })?;
        }

        let swept = self
            .writer
            .sweep_stale_temps()
            .map_err(|source| IngestError::Prepare {
                path: self.config.consumer_dir.clone(),
                source,
            })?;
        info!(
            watch = %self.config.watch_dir.display(),
            processed = %self.config.processed_dir.display(),
            consumer = %self.config.consumer_dir.display(),
            stale_temps = swept,
            "Ingest pipeline ready"
        );
        Ok(())
    }

    /// Files that the next cycle would pick up.
    pub fn pending(&self) -> Result<Vec<String>> {
        self.catalog.list_candidates()
    }

    /// Run one full cycle.
    ///
    /// `Err` means the cycle was aborted (listing or writing failed) and no
    /// source file was retired. Per-file problems are reported in the
    /// [`CycleReport`] instead.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let start = Instant::now();
        let result = self.cycle_inner(self.cycles);
        self.set_state(PipelineState::Idle);

        let mut report = result?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        if !report.is_idle() {
            info!(
                cycle = report.cycle,
                candidates = report.candidates,
                files = report.files_batched,
                rows = report.rows,
                artifact = report.artifact.as_deref().unwrap_or("-"),
                retired = report.retired,
                parse_failures = report.parse_failures.len(),
                retire_failures = report.retire_failures.len(),
                duration_ms = report.duration_ms,
                "Cycle complete"
            );
        }
        Ok(report)
    }

    fn cycle_inner(&mut self, cycle: u64) -> Result<CycleReport> {
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };

        self.set_state(PipelineState::Polling);
        let candidates = self.catalog.list_candidates()?;
        report.candidates = candidates.len();
        if candidates.is_empty() {
            debug!(cycle, "No new claim files");
            return Ok(report);
        }
        info!(cycle, count = candidates.len(), "Found new claim files");

        self.set_state(PipelineState::Assembling);
        let outcome = self.assembler.assemble(&candidates);
        report.parse_failures = outcome
            .failures
            .iter()
            .map(|f| FailureSummary {
                file: f.file_name.clone(),
                reason: f.kind.to_string(),
            })
            .collect();
        let quarantined = self.retirement.quarantine(&outcome.failures);
        report.quarantined = quarantined.moved_count();
        report.retire_failures = summarize_retire_failures(&quarantined);

        let batch = outcome.batch;
        if batch.is_empty() {
            warn!(cycle, failed = report.parse_failures.len(), "No valid claim files to batch");
            return Ok(report);
        }
        report.files_batched = batch.source_files().len();
        report.rows = batch.num_rows();

        self.set_state(PipelineState::Writing);
        let artifact = self.writer.write(&batch)?;
        report.artifact = Some(artifact.name);

        self.set_state(PipelineState::Retiring);
        let retired = self.retirement.retire(batch.source_files());
        report.retired = retired.moved_count();
        report
            .retire_failures
            .extend(summarize_retire_failures(&retired));

        Ok(report)
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Pipeline state");
            self.state = state;
        }
    }
}

fn summarize_retire_failures(report: &RetirementReport) -> Vec<FailureSummary> {
    report
        .failures
        .iter()
        .map(|f| FailureSummary {
            file: f.file_name.clone(),
            reason: f.to_string(),
        })
        .collect()
}
