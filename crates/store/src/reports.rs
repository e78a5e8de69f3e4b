//! Notification channel configurations (`report` table).

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::{Error, Result};
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: String,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: row.get("type")?,
        config: row.get("config")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}

impl Store {
    pub fn add_report(&self, name: &str, kind: &str, config: &str) -> Result<i64> {
        let conn = self.data()?;
        conn.execute(
            "INSERT INTO report (name, type, config, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, kind, config, now_string()],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_report(&self, id: &str, name: &str, config: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute(
            "UPDATE report SET name = ?2, config = ?3, update_time = ?4 WHERE id = ?1",
            params![id, name, config, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_report(&self, id: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute("DELETE FROM report WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn get_report(&self, id: &str) -> Result<ReportRow> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM report WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], map_row).map_err(db_err)?;
        rows.next()
            .transpose()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("notification channel {id}")))
    }

    /// First channel of the given kind; used by the monitor loop, which
    /// stores a channel *type* rather than an id.
    pub fn first_report_of_kind(&self, kind: &str) -> Result<Option<ReportRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM report WHERE type = ?1 ORDER BY id LIMIT 1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![kind], map_row).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn list_reports(&self, search: &str, page: i64, limit: i64) -> Result<(Vec<ReportRow>, i64)> {
        let conn = self.data()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM report WHERE name LIKE ?1",
                params![like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT * FROM report WHERE name LIKE ?1 ORDER BY update_time DESC LIMIT ?2, ?3")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, offset, limit], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }
}
