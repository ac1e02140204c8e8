//! Configuration for the ingest pipeline

use crate::error::{IngestError, Result};
use crate::types::ArtifactFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the ingest pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory upstream producers drop claim files into
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Where successfully batched source files are moved
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    /// Downstream directory batch artifacts are published to
    #[serde(default = "default_consumer_dir")]
    pub consumer_dir: PathBuf,

    /// Where unparseable files are moved. Left in the watch directory when unset.
    #[serde(default)]
    pub failed_dir: Option<PathBuf>,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Only files ending in this suffix are picked up
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,

    /// Artifact names are `{artifact_prefix}_{timestamp}.{ext}`
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    #[serde(default)]
    pub artifact_format: ArtifactFormat,

    /// Columns every claim file must carry
    #[serde(default)]
    pub required_columns: Vec<String>,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("data/raw/new_claims")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/raw/processed_claims")
}

fn default_consumer_dir() -> PathBuf {
    PathBuf::from("data/source")
}

/// Shortest wait between cycles; anything below would spin the scheduler.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn default_poll_interval() -> f64 {
    5.0
}

fn default_file_suffix() -> String {
    ".csv".to_string()
}

fn default_artifact_prefix() -> String {
    "claims_batch".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            processed_dir: default_processed_dir(),
            consumer_dir: default_consumer_dir(),
            failed_dir: None,
            poll_interval_secs: default_poll_interval(),
            file_suffix: default_file_suffix(),
            artifact_prefix: default_artifact_prefix(),
            artifact_format: ArtifactFormat::default(),
            required_columns: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IngestConfig =
            toml::from_str(&content).map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| IngestError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let interval_ok = matches!(
            Duration::try_from_secs_f64(self.poll_interval_secs),
            Ok(interval) if interval >= MIN_POLL_INTERVAL
        );
        if !interval_ok {
            return Err(IngestError::Config(format!(
                "poll_interval_secs must be at least 0.001, got {}",
                self.poll_interval_secs
            )));
        }
        if self.file_suffix.is_empty() {
            return Err(IngestError::Config("file_suffix must not be empty".into()));
        }
        if self.artifact_prefix.is_empty()
            || self.artifact_prefix.contains(['/', '\\'])
            || self.artifact_prefix.starts_with('.')
        {
            return Err(IngestError::Config(format!(
                "artifact_prefix '{}' must be a plain, non-hidden file name",
                self.artifact_prefix
            )));
        }

        let mut others = vec![
            ("processed_dir", &self.processed_dir),
            ("consumer_dir", &self.consumer_dir),
        ];
        if let Some(failed) = &self.failed_dir {
            others.push(("failed_dir", failed));
        }
        for (name, dir) in others {
            if dir == &self.watch_dir {
                return Err(IngestError::Config(format!(
                    "{} must differ from watch_dir ({})",
                    name,
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.watch_dir, PathBuf::from("data/raw/new_claims"));
        assert_eq!(config.consumer_dir, PathBuf::from("data/source"));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.file_suffix, ".csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            watch_dir = "/srv/claims/inbox"
            poll_interval_secs = 0.5
            artifact_format = "parquet"
            "#,
        )
        .unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/srv/claims/inbox"));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.artifact_format, ArtifactFormat::Parquet);
        assert_eq!(config.processed_dir, default_processed_dir());
        assert!(config.failed_dir.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("claimflow.toml");
        let config = IngestConfig {
            failed_dir: Some(PathBuf::from("data/raw/failed_claims")),
            required_columns: vec!["policy_number".into()],
            ..IngestConfig::default()
        };

        config.save(&path).unwrap();
        let loaded = IngestConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        for interval in [0.0, -1.0, 1e-12, 0.0005, f64::NAN, f64::INFINITY] {
            let config = IngestConfig {
                poll_interval_secs: interval,
                ..IngestConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(IngestError::Config(_))),
                "interval {} should be rejected",
                interval
            );
        }

        let shortest = IngestConfig {
            poll_interval_secs: 0.001,
            ..IngestConfig::default()
        };
        assert!(shortest.validate().is_ok());
        assert_eq!(shortest.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_rejects_watch_dir_reuse() {
        let config = IngestConfig {
            processed_dir: default_watch_dir(),
            ..IngestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("processed_dir"));
    }

    #[test]
    fn test_rejects_prefix_with_separator() {
        let config = IngestConfig {
            artifact_prefix: "batches/claims".into(),
            ..IngestConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
