//! Claimflow Ingest - Claim File Micro-Batching
//!
//! Watches an inbound directory for claim files, folds every file found in one
//! poll cycle into a single batch, hands the batch to the downstream consumer
//! directory and retires the source files so they are never read twice.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Catalog   │     │  Assembler  │     │   Writer    │     │ Retirement  │
//! │ (list watch │────▶│ (parse CSV, │────▶│ (tmp write, │────▶│ (rename to  │
//! │  directory) │     │  concat)    │     │   rename)   │     │  processed) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                                           │
//!        └──────────────────── PollScheduler ◀──────────────────────┘
//! ```
//!
//! # Delivery
//!
//! - Artifacts only appear in the consumer directory through a single rename.
//! - Source files are retired only after their batch artifact is visible.
//! - A failed write leaves every source file in place for the next cycle,
//!   so delivery is at-least-once.
//!
//! Only one pipeline instance may watch a given directory. Two instances would
//! both pick up the same files and deliver them twice.

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retirement;
pub mod scheduler;
pub mod storage;
pub mod types;
pub mod writer;

// Re-exports for convenience
pub use assembler::{AssembleOutcome, BatchAssembler};
pub use catalog::FileCatalog;
pub use config::IngestConfig;
pub use error::{IngestError, ParseFailure, ParseFailureKind, Result, RetireFailure};
pub use pipeline::{IngestPipeline, PipelineState};
pub use retirement::{RetirementManager, RetirementReport};
pub use scheduler::{PollScheduler, SchedulerHandle, SchedulerSummary};
pub use storage::{LocalStorage, MemoryStorage, Storage, StorageEntry};
pub use types::{ArtifactFormat, Batch, BatchArtifact, CycleReport, FailureSummary, Record};
pub use writer::BatchWriter;
