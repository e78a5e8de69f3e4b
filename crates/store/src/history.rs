//! Run records (`workflow_history`).

use std::path::Path;

use rusqlite::{params, Row, TransactionBehavior};
use serde::Serialize;

use cf_domain::error::Result;
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub id: String,
    pub workflow_id: String,
    pub status: String,
    pub exec_type: Option<String>,
    pub create_time: Option<String>,
    pub end_time: Option<String>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        id: row.get("id")?,
        workflow_id: row.get("workflow_id")?,
        status: row.get("status")?,
        exec_type: row.get("exec_type")?,
        create_time: row.get("create_time")?,
        end_time: row.get("end_time")?,
    })
}

impl Store {
    /// Create a run record and flip the workflow to `running`, unless a
    /// run of this workflow is already `running`. The check and both
    /// writes share one immediate transaction, so concurrent launchers
    /// (scheduler tick vs. manual execute) cannot both slip past the
    /// guard. Returns the run id (dash-less UUID), or `None` when a run
    /// is already in flight.
    pub fn begin_run(&self, workflow_id: &str, exec_type: &str) -> Result<Option<String>> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let now = now_string();
        let mut conn = self.data()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let running: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM workflow_history WHERE workflow_id = ?1 AND status = 'running'",
                params![workflow_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if running > 0 {
            // Dropping the transaction rolls it back.
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO workflow_history (id, workflow_id, status, exec_type, create_time)
             VALUES (?1, ?2, 'running', ?3, ?4)",
            params![run_id, workflow_id, exec_type, now],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE workflow SET last_run_status = 'running', last_run_time = ?2, update_time = ?2
             WHERE id = ?1",
            params![workflow_id, now],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(Some(run_id))
    }

    /// Terminal transition for a run; stamps `end_time`.
    pub fn finish_history(&self, run_id: &str, status: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute(
            "UPDATE workflow_history SET status = ?2, end_time = ?3 WHERE id = ?1",
            params![run_id, status, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Terminal transition for both the run record and the workflow row.
    pub fn set_run_status(&self, workflow_id: &str, run_id: &str, status: &str) -> Result<()> {
        self.finish_history(run_id, status)?;
        self.set_workflow_last_run(workflow_id, status, None)
    }

    /// Mark a run failed without preempting in-flight work.
    pub fn stop_run(&self, run_id: &str) -> Result<()> {
        match self.get_history(run_id)? {
            Some(h) => self.set_run_status(&h.workflow_id, run_id, "fail"),
            None => Ok(()),
        }
    }

    pub fn get_history(&self, run_id: &str) -> Result<Option<HistoryRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM workflow_history WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![run_id], map_row).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn list_history(&self, workflow_id: &str, page: i64, limit: i64) -> Result<(Vec<HistoryRow>, i64)> {
        let conn = self.data()?;
        let (offset, limit) = page_limits(page, limit);
        let (count, rows) = if workflow_id.is_empty() {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM workflow_history", [], |r| r.get(0))
                .map_err(db_err)?;
            let mut stmt = conn
                .prepare("SELECT * FROM workflow_history ORDER BY create_time DESC LIMIT ?1, ?2")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![offset, limit], map_row)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            (count, rows)
        } else {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM workflow_history WHERE workflow_id = ?1",
                    params![workflow_id],
                    |r| r.get(0),
                )
                .map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM workflow_history WHERE workflow_id = ?1
                     ORDER BY create_time DESC LIMIT ?2, ?3",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![workflow_id, offset, limit], map_row)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            (count, rows)
        };
        Ok((rows, count))
    }

    /// Whether any run of this workflow is currently `running`.
    pub fn has_running_run(&self, workflow_id: &str) -> Result<bool> {
        let conn = self.data()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM workflow_history WHERE workflow_id = ?1 AND status = 'running'",
                params![workflow_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Drop history rows whose workflow no longer exists, removing their
    /// run log files alongside.
    pub fn clean_orphan_history(&self, logs_dir: &Path) -> Result<()> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare(
                "SELECT id FROM workflow_history
                 WHERE workflow_id NOT IN (SELECT CAST(id AS TEXT) FROM workflow)",
            )
            .map_err(db_err)?;
        let orphans: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        conn.execute(
            "DELETE FROM workflow_history
             WHERE workflow_id NOT IN (SELECT CAST(id AS TEXT) FROM workflow)",
            [],
        )
        .map_err(db_err)?;
        for run_id in orphans {
            let log = logs_dir.join(format!("{run_id}.log"));
            if log.exists() {
                let _ = std::fs::remove_file(log);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_store;

    #[test]
    fn run_lifecycle_updates_both_tables() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();

        let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");
        assert_eq!(run.len(), 32, "dash-less uuid");
        assert!(store.has_running_run(&wf).unwrap());
        let wrow = store.get_workflow(&wf).unwrap().unwrap();
        assert_eq!(wrow.last_run_status.as_deref(), Some("running"));

        store.set_run_status(&wf, &run, "success").unwrap();
        assert!(!store.has_running_run(&wf).unwrap());
        let hrow = store.get_history(&run).unwrap().unwrap();
        assert_eq!(hrow.status, "success");
        assert!(hrow.end_time.is_some(), "terminal transition stamps end_time");
    }

    #[test]
    fn begin_run_refuses_a_second_running_run() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();

        let first = store.begin_run(&wf, "manual").unwrap();
        assert!(first.is_some());
        assert!(
            store.begin_run(&wf, "auto").unwrap().is_none(),
            "guard must hold while a run is in flight"
        );

        // Independent workflows are not serialized against each other.
        let other = store.add_workflow("o", "{}", "manual", 1, "").unwrap().to_string();
        assert!(store.begin_run(&other, "auto").unwrap().is_some());

        // Once terminal, the next run may start.
        store.set_run_status(&wf, &first.unwrap(), "fail").unwrap();
        assert!(store.begin_run(&wf, "manual").unwrap().is_some());
    }

    #[test]
    fn begin_run_is_atomic_under_contention() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let wf = wf.clone();
                std::thread::spawn(move || store.begin_run(&wf, "auto").unwrap())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Option::is_some)
            .count();
        assert_eq!(started, 1, "racing launchers must start exactly one run");

        let (_, count) = store.list_history(&wf, 1, 50).unwrap();
        assert_eq!(count, 1, "exactly one running history row exists");
    }

    #[test]
    fn stop_marks_fail() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
        let run = store.begin_run(&wf, "auto").unwrap().expect("no run in flight");
        store.stop_run(&run).unwrap();
        assert_eq!(store.get_history(&run).unwrap().unwrap().status, "fail");
        let wrow = store.get_workflow(&wf).unwrap().unwrap();
        assert_eq!(wrow.last_run_status.as_deref(), Some("fail"));
    }

    #[test]
    fn orphan_cleanup_removes_rows_and_logs() {
        let (dir, store) = test_store();
        let logs = dir.path().join("logs");
        std::fs::create_dir_all(&logs).unwrap();

        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
        let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");
        std::fs::write(logs.join(format!("{run}.log")), "x").unwrap();

        store.delete_workflow(&wf).unwrap();
        store.clean_orphan_history(&logs).unwrap();
        assert!(store.get_history(&run).unwrap().is_none());
        assert!(!logs.join(format!("{run}.log")).exists());
    }
}
