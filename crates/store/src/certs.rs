//! Certificate table access. Dedup-by-sha256 and domain parsing live in
//! `cf-certs`; this layer is plain row storage.

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::Result;
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct CertRow {
    pub id: i64,
    pub sha256: String,
    pub source: String,
    pub key: String,
    pub cert: String,
    pub issuer: Option<String>,
    pub issuer_cert: Option<String>,
    pub domains: Option<String>,
    pub history_id: Option<String>,
    pub workflow_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub end_day: Option<i64>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

/// Insert payload for a validated certificate bundle.
#[derive(Debug, Clone)]
pub struct NewCert {
    pub sha256: String,
    pub source: String,
    pub key: String,
    pub cert: String,
    pub issuer: String,
    pub issuer_cert: String,
    pub domains: String,
    pub history_id: String,
    pub workflow_id: String,
    pub start_time: String,
    pub end_time: String,
    pub end_day: i64,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CertRow> {
    Ok(CertRow {
        id: row.get("id")?,
        sha256: row.get("sha256")?,
        source: row.get("source")?,
        key: row.get("key")?,
        cert: row.get("cert")?,
        issuer: row.get("issuer")?,
        issuer_cert: row.get("issuer_cert")?,
        domains: row.get("domains")?,
        history_id: row.get("history_id")?,
        workflow_id: row.get("workflow_id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        end_day: row.get("end_day")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
    })
}

impl Store {
    pub fn insert_cert(&self, cert: &NewCert) -> Result<i64> {
        let conn = self.data()?;
        let now = now_string();
        conn.execute(
            "INSERT INTO cert (sha256, source, key, cert, issuer, issuer_cert, domains,
                               history_id, workflow_id, start_time, end_time, end_day,
                               create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                cert.sha256,
                cert.source,
                cert.key,
                cert.cert,
                cert.issuer,
                cert.issuer_cert,
                cert.domains,
                cert.history_id,
                cert.workflow_id,
                cert.start_time,
                cert.end_time,
                cert.end_day,
                now,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Lookup by row id or sha256 hex.
    pub fn get_cert(&self, id_or_sha: &str) -> Result<Option<CertRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM cert WHERE CAST(id AS TEXT) = ?1 OR sha256 = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id_or_sha], map_row).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn list_certs(&self, search: &str, page: i64, limit: i64) -> Result<(Vec<CertRow>, i64)> {
        let conn = self.data()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cert WHERE domains LIKE ?1",
                params![like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT * FROM cert WHERE domains LIKE ?1 ORDER BY end_time ASC LIMIT ?2, ?3")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, offset, limit], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }

    /// All certificates produced by runs of one workflow, for reuse lookup.
    pub fn certs_by_workflow(&self, workflow_id: &str) -> Result<Vec<CertRow>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT * FROM cert WHERE workflow_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![workflow_id], map_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    pub fn delete_cert(&self, id: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute("DELETE FROM cert WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }
}
