//! Size-capped log file with numbered backups.
//!
//! The active file is `{app}.log`. When a write would push it past the size
//! cap, it becomes `{app}.log.1`, older backups shift up by one and the
//! oldest is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RotationPolicy {
    /// Size at which the active file is rolled
    pub max_bytes: u64,
    /// Files kept on disk, the active one included
    pub keep: usize,
}

pub(crate) struct RollingFile {
    dir: PathBuf,
    stem: String,
    policy: RotationPolicy,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    pub(crate) fn open(dir: &Path, app_name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut rolling = Self {
            dir: dir.to_path_buf(),
            stem: file_stem(app_name),
            policy: RotationPolicy {
                keep: policy.keep.max(1),
                ..policy
            },
            file: None,
            written: 0,
        };
        rolling.reopen()?;
        if rolling.written >= rolling.policy.max_bytes {
            rolling.roll()?;
        }
        Ok(rolling)
    }

    pub(crate) fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, n))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let backups = self.policy.keep - 1;
        if backups == 0 {
            remove_if_present(&self.active_path())?;
        } else {
            remove_if_present(&self.backup_path(backups))?;
            for n in (1..backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(&active, self.backup_path(1))?;
            }
        }

        self.reopen()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Never roll an empty file: a single oversized event still gets written.
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_bytes {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file is closed"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handing every event the same rolling file.
#[derive(Clone)]
pub(crate) struct SharedRollingFile {
    inner: Arc<Mutex<RollingFile>>,
}

impl SharedRollingFile {
    pub(crate) fn new(file: RollingFile) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, RollingFile>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))
    }
}

impl<'a> MakeWriter<'a> for SharedRollingFile {
    type Writer = SharedRollingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "claimflow".to_string()
    } else {
        stem
    }
}
