//! Per-(workflow, node) deploy fingerprints, used to suppress no-op
//! deploys when the certificate has not changed since the last success.

use rusqlite::params;
use serde::Serialize;

use cf_domain::error::Result;

use crate::{db_err, Store};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fingerprint {
    pub cert_hash: String,
    pub status: String,
}

impl Store {
    pub fn get_fingerprint(&self, workflow_id: &str, node_id: &str) -> Result<Option<Fingerprint>> {
        let conn = self.data()?;
        let mut stmt = conn
            .prepare("SELECT cert_hash, status FROM workflow_deploy WHERE workflow_id = ?1 AND node_id = ?2")
            .map_err(db_err)?;
        let mut rows = stmt
            .query_map(params![workflow_id, node_id], |row| {
                Ok(Fingerprint {
                    cert_hash: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    status: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn upsert_fingerprint(&self, workflow_id: &str, node_id: &str, cert_hash: &str, status: &str) -> Result<()> {
        let conn = self.data()?;
        conn.execute(
            "INSERT INTO workflow_deploy (workflow_id, node_id, cert_hash, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(workflow_id, node_id)
             DO UPDATE SET cert_hash = excluded.cert_hash, status = excluded.status",
            params![workflow_id, node_id, cert_hash, status],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    #[test]
    fn upsert_replaces_by_composite_key() {
        let (_dir, store) = test_store();
        assert!(store.get_fingerprint("1", "deploy-1").unwrap().is_none());

        store.upsert_fingerprint("1", "deploy-1", "aaa", "success").unwrap();
        store.upsert_fingerprint("1", "deploy-1", "bbb", "fail").unwrap();
        assert_eq!(
            store.get_fingerprint("1", "deploy-1").unwrap().unwrap(),
            Fingerprint { cert_hash: "bbb".into(), status: "fail".into() }
        );

        // Same node id under another workflow is independent.
        store.upsert_fingerprint("2", "deploy-1", "ccc", "success").unwrap();
        assert_eq!(store.get_fingerprint("1", "deploy-1").unwrap().unwrap().cert_hash, "bbb");
    }
}
