//! Config resolution: TOML file first, then command-line and environment overrides.

use anyhow::{bail, Context, Result};
use clap::Args;
use claimflow_ingest::{ArtifactFormat, IngestConfig};
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Default, Clone)]
pub struct PathOverrides {
    /// Directory producers drop new claim files into
    #[arg(long, global = true, env = "CLAIMFLOW_WATCH_DIR")]
    pub watch_dir: Option<PathBuf>,

    /// Archive for source files whose rows were delivered
    #[arg(long, global = true, env = "CLAIMFLOW_PROCESSED_DIR")]
    pub processed_dir: Option<PathBuf>,

    /// Directory the warehouse reads batch artifacts from
    #[arg(long, global = true, env = "CLAIMFLOW_CONSUMER_DIR")]
    pub consumer_dir: Option<PathBuf>,

    /// Archive for files that could not be parsed
    #[arg(long, global = true, env = "CLAIMFLOW_FAILED_DIR")]
    pub failed_dir: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(long, global = true, env = "CLAIMFLOW_INTERVAL")]
    pub interval: Option<f64>,

    /// Artifact format: csv or parquet
    #[arg(long, global = true, env = "CLAIMFLOW_FORMAT")]
    pub format: Option<ArtifactFormat>,
}

impl PathOverrides {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(dir) = &self.watch_dir {
            config.watch_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(dir) = &self.consumer_dir {
            config.consumer_dir = dir.clone();
        }
        if let Some(dir) = &self.failed_dir {
            config.failed_dir = Some(dir.clone());
        }
        if let Some(secs) = self.interval {
            config.poll_interval_secs = secs;
        }
        if let Some(format) = self.format {
            config.artifact_format = format;
        }
    }
}

/// Build the effective config and validate it.
pub fn resolve(config_path: Option<&Path>, overrides: &PathOverrides) -> Result<IngestConfig> {
    let mut config = match config_path {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => IngestConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    IngestConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("claimflow.toml");
        fs::write(
            &path,
            "watch_dir = \"/srv/claims/in\"\npoll_interval_secs = 30.0\n",
        )
        .unwrap();

        let overrides = PathOverrides {
            interval: Some(2.5),
            consumer_dir: Some(PathBuf::from("/srv/dbt/source")),
            ..PathOverrides::default()
        };
        let config = resolve(Some(&path), &overrides).unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/srv/claims/in"));
        assert_eq!(config.consumer_dir, PathBuf::from("/srv/dbt/source"));
        assert_eq!(config.poll_interval_secs, 2.5);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = PathOverrides {
            interval: Some(-1.0),
            ..PathOverrides::default()
        };
        assert!(resolve(None, &overrides).is_err());
    }

    #[test]
    fn test_init_config_refuses_to_clobber() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("claimflow.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();

        let config = resolve(Some(&path), &PathOverrides::default()).unwrap();
        assert_eq!(config, IngestConfig::default());
    }
}
