//! SQLite-backed persistence.
//!
//! Four database files under the data directory, one per concern:
//! `data.db` (workflows, runs, certs, accesses, channels, deploy
//! fingerprints), `settings.db`, `accounts.db` (ACME accounts + EAB),
//! `site_monitor.db`. Connections are opened per operation and dropped
//! when the call returns; a 5 s busy timeout absorbs concurrent writers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use cf_domain::error::{Error, Result};

mod migrate;

pub mod access;
pub mod accounts;
pub mod certs;
pub mod fingerprints;
pub mod history;
pub mod monitors;
pub mod reports;
pub mod settings;
pub mod workflows;

pub use access::AccessRow;
pub use accounts::{AccountRow, EabRow};
pub use certs::{CertRow, NewCert};
pub use fingerprints::Fingerprint;
pub use history::HistoryRow;
pub use monitors::{MonitorRow, MonitorProbeUpdate};
pub use reports::ReportRow;
pub use workflows::WorkflowRow;

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Db(e.to_string())
}

/// Handle to the on-disk stores. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    /// Open the store rooted at `data_dir`, creating files and running
    /// migrations as needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let store = Self { data_dir };
        migrate::run(&store)?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn conn(&self, file: &str) -> Result<Connection> {
        let conn = Connection::open(self.data_dir.join(file)).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Ok(conn)
    }

    pub(crate) fn data(&self) -> Result<Connection> {
        self.conn("data.db")
    }

    pub(crate) fn settings_db(&self) -> Result<Connection> {
        self.conn("settings.db")
    }

    pub(crate) fn accounts_db(&self) -> Result<Connection> {
        self.conn("accounts.db")
    }

    pub(crate) fn monitors_db(&self) -> Result<Connection> {
        self.conn("site_monitor.db")
    }
}

/// `LIMIT ?, ?` pair for 1-based page / page-size inputs.
pub(crate) fn page_limits(page: i64, limit: i64) -> (i64, i64) {
    if page > 1 {
        ((page - 1) * limit, limit)
    } else {
        (0, limit)
    }
}

#[cfg(test)]
pub(crate) fn test_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("data")).expect("open store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_all_database_files() {
        let (_dir, store) = test_store();
        for file in ["data.db", "settings.db", "accounts.db", "site_monitor.db"] {
            assert!(store.data_dir().join(file).exists(), "{file} should exist");
        }
    }

    #[test]
    fn page_limits_offsets_from_second_page() {
        assert_eq!(page_limits(1, 10), (0, 10));
        assert_eq!(page_limits(3, 20), (40, 20));
    }
}
