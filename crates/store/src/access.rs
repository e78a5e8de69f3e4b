//! Stored credentials for external systems (DNS providers, panels, SSH
//! hosts, clouds). `config` is an opaque JSON string consumed by the
//! adapter that references it.

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::{Error, Result};
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct AccessRow {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: String,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<AccessRow> {
    Ok(AccessRow {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: row.get("type")?,
        config: row.get("config")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}

impl Store {
    pub fn add_access(&self, name: &str, kind: &str, config: &str) -> Result<i64> {
        let conn = self.data()?;
        conn.execute(
            "INSERT INTO access (name, type, config, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, kind, config, now_string()],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_access(&self, id: &str, name: &str, config: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute(
            "UPDATE access SET name = ?2, config = ?3, update_time = ?4 WHERE id = ?1",
            params![id, name, config, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_access(&self, id: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute("DELETE FROM access WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Lookup that errors when the reference is dangling: a config error
    /// for the node that named it.
    pub fn get_access(&self, id: &str) -> Result<AccessRow> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM access WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], map_row).map_err(db_err)?;
        rows.next()
            .transpose()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("access {id}")))
    }

    /// The referenced access's `config` parsed as a JSON object.
    pub fn access_config(&self, id: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
        let row = self.get_access(id)?;
        match serde_json::from_str(&row.config) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Config(format!("access {id}: config is not an object"))),
            Err(e) => Err(Error::Config(format!("access {id}: {e}"))),
        }
    }

    pub fn list_access(&self, search: &str, kind: &str, page: i64, limit: i64) -> Result<(Vec<AccessRow>, i64)> {
        let conn = self.data()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let kind_like = if kind.is_empty() { "%".to_string() } else { kind.to_string() };
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM access WHERE name LIKE ?1 AND type LIKE ?2",
                params![like, kind_like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM access WHERE name LIKE ?1 AND type LIKE ?2
                 ORDER BY update_time DESC LIMIT ?3, ?4",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, kind_like, offset, limit], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }
}
