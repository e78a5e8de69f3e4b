//! PID file management for daemon-style operation.
//!
//! The serving process writes its PID and holds an `fs2` exclusive lock;
//! a second instance fails to start instead of corrupting the stores.
//! Management commands read the PID to signal the running process.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

/// Write the current PID to `path` and take the exclusive lock. The
/// returned handle must stay alive for the server's lifetime.
pub fn write_pid_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .read(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("opening PID file {}: {e}", path.display()))?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "another certfleet instance is running (PID file {} is locked)",
            path.display()
        )
    })?;

    let pid = std::process::id();
    {
        let mut f = &file;
        writeln!(f, "{pid}")?;
        f.flush()?;
    }
    tracing::info!(path = %path.display(), pid, "PID file written");
    Ok(file)
}

pub fn remove_pid_file(path: &Path, _handle: File) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    }
}

/// PID of the running instance, if any.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Send a signal to the running instance via kill(1).
pub fn signal(path: &Path, sig: &str) -> anyhow::Result<u32> {
    let pid = read_pid(path)
        .ok_or_else(|| anyhow::anyhow!("no PID file at {}; is certfleet running?", path.display()))?;
    let status = std::process::Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .status()?;
    if !status.success() {
        anyhow::bail!("kill {sig} {pid} failed");
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid");

        let handle = write_pid_file(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
        assert!(write_pid_file(&path).is_err(), "second instance must be refused");

        remove_pid_file(&path, handle);
        assert!(!path.exists());
        assert_eq!(read_pid(&path), None);
    }
}
