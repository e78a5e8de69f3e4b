//! Workflow table access.

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::Result;
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRow {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub exec_type: String,
    pub active: i64,
    pub exec_time: Option<String>,
    pub last_run_time: Option<String>,
    pub last_run_status: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRow> {
    Ok(WorkflowRow {
        id: row.get("id")?,
        name: row.get("name")?,
        content: row.get("content")?,
        exec_type: row.get("exec_type")?,
        active: row.get("active")?,
        exec_time: row.get("exec_time")?,
        last_run_time: row.get("last_run_time")?,
        last_run_status: row.get("last_run_status")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}

const COLS: &str = "id, name, content, exec_type, active, exec_time, \
                    last_run_time, last_run_status, create_time, update_time";

impl Store {
    pub fn add_workflow(
        &self,
        name: &str,
        content: &str,
        exec_type: &str,
        active: i64,
        exec_time: &str,
    ) -> Result<i64> {
        let conn = self.data()?;
        let now = now_string();
        conn.execute(
            "INSERT INTO workflow (name, content, exec_type, active, exec_time, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![name, content, exec_type, active, exec_time, now],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_workflow(
        &self,
        id: &str,
        name: &str,
        content: &str,
        exec_type: &str,
        active: i64,
        exec_time: &str,
    ) -> Result<()> {
        let conn = self.data()?;
        conn.execute(
            "UPDATE workflow SET name = ?2, content = ?3, exec_type = ?4, active = ?5,
                                 exec_time = ?6, update_time = ?7
             WHERE id = ?1",
            params![id, name, content, exec_type, active, exec_time, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_workflow(&self, id: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute("DELETE FROM workflow WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {COLS} FROM workflow WHERE id = ?1"))
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], map_row).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn list_workflows(&self, search: &str, page: i64, limit: i64) -> Result<(Vec<WorkflowRow>, i64)> {
        let conn = self.data()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM workflow WHERE name LIKE ?1",
                params![like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLS} FROM workflow WHERE name LIKE ?1
                 ORDER BY update_time DESC LIMIT ?2, ?3"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, offset, limit], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }

    /// Every workflow, for the scheduler tick.
    pub fn all_workflows(&self) -> Result<Vec<WorkflowRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {COLS} FROM workflow"))
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    pub fn set_workflow_exec_type(&self, id: &str, exec_type: &str) -> Result<()> {
        self.update_workflow_fields(id, &[("exec_type", exec_type)])
    }

    pub fn set_workflow_active(&self, id: &str, active: i64) -> Result<()> {
        self.update_workflow_fields(id, &[("active", &active.to_string())])
    }

    pub fn set_workflow_last_run(&self, id: &str, status: &str, time: Option<&str>) -> Result<()> {
        match time {
            Some(t) => self.update_workflow_fields(id, &[("last_run_status", status), ("last_run_time", t)]),
            None => self.update_workflow_fields(id, &[("last_run_status", status)]),
        }
    }

    fn update_workflow_fields(&self, id: &str, fields: &[(&str, &str)]) -> Result<()> {
        let conn = self.data()?;
        let mut sets: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{col} = ?{}", i + 2))
            .collect();
        sets.push(format!("update_time = ?{}", fields.len() + 2));
        let sql = format!("UPDATE workflow SET {} WHERE id = ?1", sets.join(", "));
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&id];
        for (_, v) in fields {
            values.push(v);
        }
        let now = now_string();
        values.push(&now);
        conn.execute(&sql, values.as_slice()).map_err(db_err)?;
        Ok(())
    }
}
