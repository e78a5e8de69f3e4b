//! Site monitor rows (`site_monitor.db`).

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::Result;
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct MonitorRow {
    pub id: i64,
    pub name: String,
    pub site_domain: String,
    pub report_type: Option<String>,
    pub cycle: i64,
    pub repeat_send_gap: i64,
    pub state: Option<String>,
    pub ca: Option<String>,
    pub cert_domain: Option<String>,
    pub end_time: Option<String>,
    pub end_day: Option<i64>,
    pub last_time: Option<String>,
    pub except_end_time: Option<String>,
    pub active: i64,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

/// Probe results cached onto the row after each check.
#[derive(Debug, Clone, Default)]
pub struct MonitorProbeUpdate {
    pub state: String,
    pub ca: String,
    pub cert_domain: String,
    pub end_time: String,
    pub end_day: i64,
    /// Set on failing probes; cleared implicitly on healthy ones.
    pub failed_at: Option<String>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<MonitorRow> {
    Ok(MonitorRow {
        id: row.get("id")?,
        name: row.get("name")?,
        site_domain: row.get("site_domain")?,
        report_type: row.get("report_type")?,
        cycle: row.get("cycle")?,
        repeat_send_gap: row.get("repeat_send_gap")?,
        state: row.get("state")?,
        ca: row.get("ca")?,
        cert_domain: row.get("cert_domain")?,
        end_time: row.get("end_time")?,
        end_day: row.get("end_day")?,
        last_time: row.get("last_time")?,
        except_end_time: row.get("except_end_time")?,
        active: row.get("active")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}

impl Store {
    pub fn add_monitor(
        &self,
        name: &str,
        site_domain: &str,
        report_type: &str,
        cycle: i64,
        repeat_send_gap: i64,
    ) -> Result<i64> {
        let conn = self.monitors_db()?;
        let now = now_string();
        conn.execute(
            "INSERT INTO site_monitor (name, site_domain, report_type, cycle, repeat_send_gap,
                                       last_time, active, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?6, ?6)",
            params![name, site_domain, report_type, cycle, repeat_send_gap, now],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_monitor(
        &self,
        id: &str,
        name: &str,
        site_domain: &str,
        report_type: &str,
        cycle: i64,
        repeat_send_gap: i64,
    ) -> Result<()> {
        let conn = self.monitors_db()?;
        conn.execute(
            "UPDATE site_monitor SET name = ?2, site_domain = ?3, report_type = ?4,
                                     cycle = ?5, repeat_send_gap = ?6, update_time = ?7
             WHERE id = ?1",
            params![id, name, site_domain, report_type, cycle, repeat_send_gap, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_monitor(&self, id: &str) -> Result<()> {
        let conn = self.monitors_db()?;
        conn.execute("DELETE FROM site_monitor WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn set_monitor_active(&self, id: &str, active: i64) -> Result<()> {
        let conn = self.monitors_db()?;
        conn.execute(
            "UPDATE site_monitor SET active = ?2, update_time = ?3 WHERE id = ?1",
            params![id, active, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn get_monitor(&self, id: &str) -> Result<Option<MonitorRow>> {
        let conn = self.monitors_db()?;
        let mut stmt = conn
            .prepare("SELECT * FROM site_monitor WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], map_row).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn all_monitors(&self) -> Result<Vec<MonitorRow>> {
        let conn = self.monitors_db()?;
        let mut stmt = conn.prepare("SELECT * FROM site_monitor").map_err(db_err)?;
        let rows = stmt
            .query_map([], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    pub fn list_monitors(&self, search: &str, page: i64, limit: i64) -> Result<(Vec<MonitorRow>, i64)> {
        let conn = self.monitors_db()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM site_monitor WHERE name LIKE ?1 OR site_domain LIKE ?1",
                params![like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM site_monitor WHERE name LIKE ?1 OR site_domain LIKE ?1
                 ORDER BY update_time DESC LIMIT ?2, ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, offset, limit], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }

    /// Write one probe's results back to the row. `last_time` always moves;
    /// `except_end_time` is only written for failing probes.
    pub fn record_monitor_probe(&self, id: &str, update: &MonitorProbeUpdate) -> Result<()> {
        let conn = self.monitors_db()?;
        let now = now_string();
        match &update.failed_at {
            Some(failed_at) => conn
                .execute(
                    "UPDATE site_monitor SET state = ?2, ca = ?3, cert_domain = ?4, end_time = ?5,
                                             end_day = ?6, last_time = ?7, except_end_time = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        update.state,
                        update.ca,
                        update.cert_domain,
                        update.end_time,
                        update.end_day,
                        now,
                        failed_at
                    ],
                )
                .map_err(db_err)?,
            None => conn
                .execute(
                    "UPDATE site_monitor SET state = ?2, ca = ?3, cert_domain = ?4, end_time = ?5,
                                             end_day = ?6, last_time = ?7
                     WHERE id = ?1",
                    params![
                        id,
                        update.state,
                        update.ca,
                        update.cert_domain,
                        update.end_time,
                        update.end_day,
                        now
                    ],
                )
                .map_err(db_err)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    #[test]
    fn probe_update_preserves_except_end_time_on_success() {
        let (_dir, store) = test_store();
        let id = store.add_monitor("m", "example.com", "mail", 1, 3).unwrap().to_string();

        let failing = MonitorProbeUpdate {
            state: "异常".into(),
            failed_at: Some("2024-06-15 10:00:00".into()),
            ..Default::default()
        };
        store.record_monitor_probe(&id, &failing).unwrap();
        let row = store.get_monitor(&id).unwrap().unwrap();
        assert_eq!(row.except_end_time.as_deref(), Some("2024-06-15 10:00:00"));

        let healthy = MonitorProbeUpdate {
            state: "正常".into(),
            ca: "R11".into(),
            end_day: 60,
            ..Default::default()
        };
        store.record_monitor_probe(&id, &healthy).unwrap();
        let row = store.get_monitor(&id).unwrap().unwrap();
        assert_eq!(row.state.as_deref(), Some("正常"));
        assert_eq!(row.end_day, Some(60));
        // The first-failure marker is historical data, not cleared by recovery.
        assert_eq!(row.except_end_time.as_deref(), Some("2024-06-15 10:00:00"));
    }

    #[test]
    fn active_toggle() {
        let (_dir, store) = test_store();
        let id = store.add_monitor("m", "example.com", "mail", 1, 3).unwrap().to_string();
        store.set_monitor_active(&id, 0).unwrap();
        assert_eq!(store.get_monitor(&id).unwrap().unwrap().active, 0);
    }
}
