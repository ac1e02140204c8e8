//! End-to-end tests for the ingest pipeline on a real filesystem.

use claimflow_ingest::{ArtifactFormat, IngestConfig, IngestPipeline, PollScheduler};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const HEADER: &str = "months_as_customer,age,policy_number,incident_type,total_claim_amount";

/// Create a test environment with temp directories
struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    pub watch_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub consumer_dir: PathBuf,
    pub failed_dir: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().to_path_buf();
        Self {
            watch_dir: root.join("data/raw/new_claims"),
            processed_dir: root.join("data/raw/processed_claims"),
            consumer_dir: root.join("data/source"),
            failed_dir: root.join("data/raw/failed_claims"),
            _temp: temp,
        }
    }

    fn config(&self) -> IngestConfig {
        IngestConfig {
            watch_dir: self.watch_dir.clone(),
            processed_dir: self.processed_dir.clone(),
            consumer_dir: self.consumer_dir.clone(),
            poll_interval_secs: 0.05,
            ..IngestConfig::default()
        }
    }

    fn write_claims(&self, name: &str, rows: usize, first_policy: usize) -> PathBuf {
        let mut content = format!("{}\n", HEADER);
        for i in 0..rows {
            content.push_str(&format!(
                "{},{},{},Single Vehicle Collision,{}\n",
                100 + i,
                30 + i,
                first_policy + i,
                5000 + i
            ));
        }
        self.write_raw(name, content.as_bytes())
    }

    fn write_raw(&self, name: &str, content: &[u8]) -> PathBuf {
        fs::create_dir_all(&self.watch_dir).expect("Failed to create watch dir");
        let path = self.watch_dir.join(name);
        fs::write(&path, content).expect("Failed to write file");
        path
    }
}

fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

fn read_artifact(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

// ============================================================================
// Cycle scenarios
// ============================================================================

#[test]
fn test_two_files_become_one_artifact() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 5, 1000);
    env.write_claims("b.csv", 3, 2000);

    let mut pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();
    let report = pipeline.run_cycle().unwrap();

    assert_eq!(report.rows, 8);
    assert_eq!(report.retired, 2);
    assert!(report.parse_failures.is_empty());

    let artifacts = list(&env.consumer_dir);
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].starts_with("claims_batch_"));
    assert!(artifacts[0].ends_with(".csv"));

    let (header, rows) = read_artifact(&env.consumer_dir.join(&artifacts[0]));
    assert_eq!(header.join(","), HEADER);
    assert_eq!(rows.len(), 8);
    let policies: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(
        policies,
        vec!["1000", "1001", "1002", "1003", "1004", "2000", "2001", "2002"]
    );

    assert!(list(&env.watch_dir).is_empty());
    assert_eq!(list(&env.processed_dir), vec!["a.csv", "b.csv"]);
}

#[test]
fn test_corrupt_file_stays_in_watch_dir() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 5, 1000);
    env.write_raw("corrupt.csv", b"\xff\xfe\x00garbage\n1,2\n");

    let mut pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();
    let report = pipeline.run_cycle().unwrap();

    assert_eq!(report.rows, 5);
    assert_eq!(report.parse_failures.len(), 1);
    assert_eq!(report.parse_failures[0].file, "corrupt.csv");

    let artifacts = list(&env.consumer_dir);
    assert_eq!(artifacts.len(), 1);
    let (_, rows) = read_artifact(&env.consumer_dir.join(&artifacts[0]));
    assert_eq!(rows.len(), 5);

    assert_eq!(list(&env.processed_dir), vec!["a.csv"]);
    assert_eq!(list(&env.watch_dir), vec!["corrupt.csv"]);
}

#[test]
fn test_corrupt_file_moves_to_failed_archive() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 2, 1000);
    env.write_raw("corrupt.csv", b"policy_number,age\n1\n");

    let config = IngestConfig {
        failed_dir: Some(env.failed_dir.clone()),
        ..env.config()
    };
    let mut pipeline = IngestPipeline::local(config).unwrap();
    pipeline.prepare().unwrap();
    let report = pipeline.run_cycle().unwrap();

    assert_eq!(report.quarantined, 1);
    assert!(list(&env.watch_dir).is_empty());
    assert_eq!(list(&env.failed_dir), vec!["corrupt.csv"]);
    assert_eq!(list(&env.processed_dir), vec!["a.csv"]);
}

#[test]
fn test_divergent_header_is_not_merged() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 2, 1000);
    env.write_raw("b.csv", b"policy_number,fraud_reported\n1,Y\n");

    let mut pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();
    let report = pipeline.run_cycle().unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(report.parse_failures.len(), 1);
    assert_eq!(list(&env.watch_dir), vec!["b.csv"]);
}

#[test]
fn test_consumer_parent_created_at_startup() {
    let env = TestEnv::new();
    let nested_consumer = env.consumer_dir.join("dbt").join("raw");
    assert!(!env.consumer_dir.exists());
    env.write_claims("a.csv", 1, 1);

    let config = IngestConfig {
        consumer_dir: nested_consumer.clone(),
        ..env.config()
    };
    let mut pipeline = IngestPipeline::local(config).unwrap();
    pipeline.prepare().unwrap();
    assert!(nested_consumer.is_dir());

    let report = pipeline.run_cycle().unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(list(&nested_consumer).len(), 1);
}

#[test]
fn test_missing_watch_dir_is_created() {
    let env = TestEnv::new();
    let mut pipeline = IngestPipeline::local(env.config()).unwrap();

    let report = pipeline.run_cycle().unwrap();
    assert!(report.is_idle());
    assert!(env.watch_dir.is_dir());
}

#[test]
fn test_non_matching_and_hidden_files_ignored() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 1, 1);
    env.write_raw("notes.txt", b"not a claim");
    env.write_raw(".upload_in_progress.csv", b"half");

    let mut pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();
    assert_eq!(pipeline.pending().unwrap(), vec!["a.csv"]);

    pipeline.run_cycle().unwrap();
    assert_eq!(
        list(&env.watch_dir),
        vec![".upload_in_progress.csv", "notes.txt"]
    );
}

#[test]
fn test_stale_temp_artifact_swept_on_prepare() {
    let env = TestEnv::new();
    fs::create_dir_all(&env.consumer_dir).unwrap();
    let stale = env
        .consumer_dir
        .join(".claims_batch_20250801_191938_000001.csv.tmp");
    fs::write(&stale, "months_as_customer,age\n1").unwrap();

    let pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();

    assert!(!stale.exists());
}

#[test]
fn test_parquet_artifact() {
    let env = TestEnv::new();
    env.write_claims("a.csv", 3, 1);

    let config = IngestConfig {
        artifact_format: ArtifactFormat::Parquet,
        ..env.config()
    };
    let mut pipeline = IngestPipeline::local(config).unwrap();
    pipeline.prepare().unwrap();
    let report = pipeline.run_cycle().unwrap();

    let name = report.artifact.unwrap();
    assert!(name.ends_with(".parquet"));
    let bytes = fs::read(env.consumer_dir.join(name)).unwrap();
    assert!(bytes.starts_with(b"PAR1"));
}

#[test]
fn test_successive_cycles_write_distinct_artifacts() {
    let env = TestEnv::new();
    let mut pipeline = IngestPipeline::local(env.config()).unwrap();
    pipeline.prepare().unwrap();

    for i in 0..3 {
        env.write_claims(&format!("claims_{}.csv", i), 2, i * 10);
        let report = pipeline.run_cycle().unwrap();
        assert_eq!(report.rows, 2);
    }

    assert_eq!(list(&env.consumer_dir).len(), 3);
    assert_eq!(list(&env.processed_dir).len(), 3);
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn test_scheduler_picks_up_late_arrivals() {
    let env = TestEnv::new();
    let scheduler = PollScheduler::new(IngestPipeline::local(env.config()).unwrap());
    let handle = scheduler.spawn().unwrap();

    // Producers stage under a hidden name so a half-written file is never listed.
    let staged = env.write_claims(".late.csv", 4, 1);
    fs::rename(&staged, env.watch_dir.join("late.csv")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while list(&env.processed_dir).is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    let summary = handle.stop().unwrap();
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.files_retired, 1);
    assert_eq!(list(&env.consumer_dir).len(), 1);
}

#[test]
fn test_cancellation_during_wait_exits_within_interval() {
    let env = TestEnv::new();
    let config = IngestConfig {
        poll_interval_secs: 2.0,
        ..env.config()
    };
    let mut scheduler = PollScheduler::new(IngestPipeline::local(config).unwrap());

    let (stop_tx, stop_rx) = mpsc::channel();
    let signaller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        let sent_at = Instant::now();
        stop_tx.send(()).unwrap();
        sent_at
    });

    let summary = scheduler.run_with_shutdown(stop_rx).unwrap();
    let stopped_at = Instant::now();
    let sent_at = signaller.join().unwrap();

    assert_eq!(summary.cycles, 1);
    assert!(stopped_at.duration_since(sent_at) < Duration::from_secs(2));
}
