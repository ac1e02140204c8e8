//! One-shot commands: `once` and `pending`.

use anyhow::{Context, Result};
use claimflow_ingest::{CycleReport, FailureSummary, IngestConfig, IngestPipeline};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

#[derive(Serialize)]
struct PendingOutput<'a> {
    watch_dir: String,
    files: &'a [String],
}

pub fn once(config: IngestConfig, json: bool) -> Result<()> {
    let mut pipeline = IngestPipeline::local(config).context("Failed to build ingest pipeline")?;
    pipeline.prepare().context("Failed to prepare pipeline directories")?;
    let report = pipeline.run_cycle().context("Cycle aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_cycle(&report);
    }
    Ok(())
}

pub fn pending(config: IngestConfig, json: bool) -> Result<()> {
    let watch_dir = config.watch_dir.display().to_string();
    let pipeline = IngestPipeline::local(config).context("Failed to build ingest pipeline")?;
    let files = pipeline.pending().context("Failed to list watch directory")?;

    if json {
        let output = PendingOutput {
            watch_dir,
            files: &files,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No claim files waiting in {}", watch_dir);
        return Ok(());
    }
    let mut table = new_table(&["#", "File"]);
    for (idx, file) in files.iter().enumerate() {
        table.add_row(vec![(idx + 1).to_string(), file.clone()]);
    }
    println!("{}", table);
    println!("{} file(s) waiting in {}", files.len(), watch_dir);
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    if report.is_idle() {
        println!("No claim files to process");
        return;
    }

    let mut table = new_table(&["Field", "Value"]);
    table.add_row(vec!["Candidates".to_string(), report.candidates.to_string()]);
    table.add_row(vec!["Files batched".to_string(), report.files_batched.to_string()]);
    table.add_row(vec!["Rows".to_string(), report.rows.to_string()]);
    table.add_row(vec![
        "Artifact".to_string(),
        report.artifact.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec!["Retired".to_string(), report.retired.to_string()]);
    table.add_row(vec!["Quarantined".to_string(), report.quarantined.to_string()]);
    table.add_row(vec!["Duration".to_string(), format!("{} ms", report.duration_ms)]);
    println!("{}", table);

    print_failures("Parse failures", &report.parse_failures);
    print_failures("Retirement failures", &report.retire_failures);
}

fn print_failures(title: &str, failures: &[FailureSummary]) {
    if failures.is_empty() {
        return;
    }
    println!("\n{}:", title);
    let mut table = new_table(&["File", "Reason"]);
    for failure in failures {
        table.add_row(vec![
            Cell::new(&failure.file).fg(Color::Red),
            Cell::new(&failure.reason),
        ]);
    }
    println!("{}", table);
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}
