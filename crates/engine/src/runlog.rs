//! Per-run append-only log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use cf_domain::error::Result;
use cf_domain::{RunLogger, TIME_FORMAT};

/// Log sink for one run, opened at run start and released with the
/// context when the run reaches a terminal state.
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Open (create) `logs_dir/<run_id>.log`.
    pub fn open(logs_dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{run_id}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogger for RunLog {
    fn write(&self, level: &str, msg: &str) {
        let line = format!(
            "[{}] [{level}] {msg}\n",
            chrono::Local::now().format(TIME_FORMAT)
        );
        let mut file = self.file.lock();
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, path = %self.path.display(), "run log write failed");
        }
        tracing::debug!(target: "runlog", "{level} {msg}");
    }
}
