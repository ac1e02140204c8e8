//! Command implementations for the `claimflow` binary.

pub mod report;
pub mod run;
pub mod settings;
