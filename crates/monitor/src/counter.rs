//! Per-monitor consecutive-failure counters.
//!
//! One small file per monitor id under `data/site_monitor/`, holding the
//! current count as decimal text. Each monitor is touched by at most one
//! task per tick, so plain read-modify-write is race-free.

use std::path::PathBuf;

use cf_domain::error::Result;

pub struct FailureCounter {
    dir: PathBuf,
}

impl FailureCounter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    pub fn value(&self, id: &str) -> i64 {
        std::fs::read_to_string(self.path(id))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Bump the counter and return the new value.
    pub fn increment(&self, id: &str) -> Result<i64> {
        std::fs::create_dir_all(&self.dir)?;
        let next = self.value(id) + 1;
        std::fs::write(self.path(id), next.to_string())?;
        Ok(next)
    }

    /// Reset by removing the counter file.
    pub fn clear(&self, id: &str) {
        let _ = std::fs::remove_file(self.path(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_persist_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FailureCounter::new(dir.path().join("site_monitor"));

        assert_eq!(counter.value("7"), 0);
        assert_eq!(counter.increment("7").unwrap(), 1);
        assert_eq!(counter.increment("7").unwrap(), 2);
        assert_eq!(counter.value("7"), 2);

        counter.clear("7");
        assert_eq!(counter.value("7"), 0, "clear removes the file");
        assert!(!dir.path().join("site_monitor/7").exists());
    }

    #[test]
    fn corrupt_counter_file_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FailureCounter::new(dir.path());
        std::fs::write(dir.path().join("9"), "garbage").unwrap();
        assert_eq!(counter.value("9"), 0);
        assert_eq!(counter.increment("9").unwrap(), 1);
    }
}
