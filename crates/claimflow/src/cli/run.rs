//! `claimflow run`: the long-lived polling service.

use anyhow::{Context, Result};
use claimflow_ingest::{IngestConfig, IngestPipeline, PollScheduler};
use std::sync::mpsc;
use tracing::info;

pub fn run(config: IngestConfig) -> Result<()> {
    info!(
        watch = %config.watch_dir.display(),
        consumer = %config.consumer_dir.display(),
        interval_secs = config.poll_interval_secs,
        format = %config.artifact_format,
        "Starting claimflow"
    );

    let pipeline = IngestPipeline::local(config).context("Failed to build ingest pipeline")?;
    let mut scheduler = PollScheduler::new(pipeline);

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    install_signal_handlers(stop_tx)?;

    let summary = scheduler
        .run_with_shutdown(stop_rx)
        .context("Ingest pipeline failed to start")?;

    info!(
        cycles = summary.cycles,
        failed_cycles = summary.failed_cycles,
        artifacts = summary.artifacts,
        rows = summary.rows,
        files_retired = summary.files_retired,
        "Claimflow stopped"
    );
    Ok(())
}

/// Forward the first SIGINT/SIGTERM (Ctrl+C on Windows) to the scheduler.
///
/// The scheduler finishes its in-flight cycle before stopping.
fn install_signal_handlers(stop_tx: mpsc::Sender<()>) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        std::thread::Builder::new()
            .name("claimflow-signals".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, shutting down...", sig);
                    let _ = stop_tx.send(());
                }
            })
            .context("Failed to spawn signal thread")?;
    }

    #[cfg(windows)]
    {
        let stop_tx = std::sync::Mutex::new(stop_tx);
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, shutting down...");
            if let Ok(tx) = stop_tx.lock() {
                let _ = tx.send(());
            }
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
