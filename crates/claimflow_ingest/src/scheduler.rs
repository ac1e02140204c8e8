//! Fixed-interval driver for the ingest pipeline.
//!
//! Cycles run back to back on a single thread with a fixed pause between
//! them, so two cycles never touch the watch directory at once. The pause is
//! a `recv_timeout` on the stop channel: a stop request ends it immediately.
//! A stop request that arrives mid-cycle is seen once that cycle finishes.

use crate::error::{IngestError, Result};
use crate::pipeline::{IngestPipeline, PipelineState};
use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Totals over the lifetime of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub artifacts: u64,
    pub rows: u64,
    pub files_retired: u64,
}

pub struct PollScheduler {
    pipeline: IngestPipeline,
    interval: Duration,
    summary: SchedulerSummary,
}

impl PollScheduler {
    /// Scheduler using the pipeline's configured poll interval.
    pub fn new(pipeline: IngestPipeline) -> Self {
        let interval = pipeline.config().poll_interval();
        Self::with_interval(pipeline, interval)
    }

    pub fn with_interval(pipeline: IngestPipeline, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            summary: SchedulerSummary::default(),
        }
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Run cycles until `stop_rx` receives a message or its sender is dropped.
    ///
    /// Startup preparation errors are returned; errors inside a cycle are
    /// logged and the next cycle runs as scheduled.
    pub fn run_with_shutdown(&mut self, stop_rx: mpsc::Receiver<()>) -> Result<SchedulerSummary> {
        self.pipeline.prepare()?;
        info!(interval_ms = self.interval.as_millis() as u64, "Poll scheduler started");

        loop {
            match stop_rx.try_recv() {
                Ok(()) => {
                    info!("Poll scheduler received stop signal");
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    info!("Poll scheduler stop channel closed");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            self.run_one();

            match stop_rx.recv_timeout(self.interval) {
                Ok(()) => {
                    info!("Poll scheduler received stop signal");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Poll scheduler stop channel closed");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        self.pipeline.mark_stopped();
        info!(
            cycles = self.summary.cycles,
            failed = self.summary.failed_cycles,
            artifacts = self.summary.artifacts,
            rows = self.summary.rows,
            "Poll scheduler stopped"
        );
        Ok(self.summary.clone())
    }

    /// Run the scheduler on its own thread.
    pub fn spawn(mut self) -> std::io::Result<SchedulerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let join_handle = std::thread::Builder::new()
            .name("claimflow-poll".to_string())
            .spawn(move || self.run_with_shutdown(stop_rx))?;
        Ok(SchedulerHandle {
            stop_tx,
            join_handle,
        })
    }

    fn run_one(&mut self) {
        self.summary.cycles += 1;
        match self.pipeline.run_cycle() {
            Ok(report) => {
                if report.artifact.is_some() {
                    self.summary.artifacts += 1;
                }
                self.summary.rows += report.rows as u64;
                self.summary.files_retired += report.retired as u64;
            }
            Err(e) => {
                self.summary.failed_cycles += 1;
                error!(error = %e, "Cycle aborted, source files left for the next poll");
            }
        }
    }
}

/// Handle for a scheduler running on a background thread.
pub struct SchedulerHandle {
    stop_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<Result<SchedulerSummary>>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop and wait for the in-flight cycle to finish.
    pub fn stop(self) -> Result<SchedulerSummary> {
        let _ = self.stop_tx.send(());
        match self.join_handle.join() {
            Ok(result) => result,
            Err(_) => {
                warn!("Poll scheduler thread panicked");
                Err(IngestError::SchedulerPanicked)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}
