//! Content-addressed certificate persistence.

use serde::Serialize;

use cf_domain::error::{Error, Result};
use cf_store::{NewCert, Store};

use crate::parse::parse_cert_pem;
use crate::validate::validate_certificate;

/// The bundle shape that flows between workflow nodes.
#[derive(Debug, Clone, Serialize)]
pub struct CertBundle {
    pub cert: String,
    pub key: String,
    pub domains: String,
}

/// Validate and store a certificate bundle; idempotent on the leaf's
/// SHA-256. Returns the (possibly pre-existing) sha.
pub fn save_cert(
    store: &Store,
    source: &str,
    key_pem: &str,
    cert_pem: &str,
    issuer_cert_pem: &str,
    history_id: &str,
) -> Result<String> {
    validate_certificate(cert_pem, key_pem)?;
    let info = parse_cert_pem(cert_pem)?;

    if store.get_cert(&info.sha256)?.is_some() {
        return Ok(info.sha256);
    }

    // A run id links the cert back to the workflow that produced it.
    let workflow_id = if history_id.is_empty() {
        String::new()
    } else {
        store
            .get_history(history_id)?
            .map(|h| h.workflow_id)
            .unwrap_or_default()
    };

    let row = NewCert {
        sha256: info.sha256.clone(),
        source: source.to_string(),
        key: key_pem.to_string(),
        cert: cert_pem.to_string(),
        issuer: info.issuer.clone(),
        issuer_cert: issuer_cert_pem.to_string(),
        domains: info.domains_joined(),
        history_id: history_id.to_string(),
        workflow_id,
        start_time: info.start_time(),
        end_time: info.end_time(),
        end_day: info.days_remaining(),
    };
    match store.insert_cert(&row) {
        Ok(_) => Ok(info.sha256),
        // A concurrent writer beat us to the same sha; that is the
        // idempotent outcome, not a failure.
        Err(_) if store.get_cert(&info.sha256)?.is_some() => Ok(info.sha256),
        Err(e) => Err(e),
    }
}

/// Store a user-supplied PEM pair.
pub fn upload_cert(store: &Store, key_pem: &str, cert_pem: &str) -> Result<String> {
    save_cert(store, "upload", key_pem, cert_pem, "", "")
}

/// Fetch a stored bundle by row id or sha256.
pub fn get_cert(store: &Store, id_or_sha: &str) -> Result<CertBundle> {
    let row = store
        .get_cert(id_or_sha)?
        .ok_or_else(|| Error::NotFound(format!("certificate {id_or_sha}")))?;
    Ok(CertBundle {
        cert: row.cert,
        key: row.key,
        domains: row.domains.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn self_signed(domains: &[&str]) -> (String, String) {
        let params =
            rcgen::CertificateParams::new(domains.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn save_is_idempotent_on_sha() {
        let (_dir, store) = test_store();
        let (cert, key) = self_signed(&["dedup.example"]);

        let sha1 = save_cert(&store, "upload", &key, &cert, "", "").unwrap();
        let sha2 = save_cert(&store, "upload", &key, &cert, "", "").unwrap();
        assert_eq!(sha1, sha2, "same PEM must yield the same sha");

        let (rows, count) = store.list_certs("", 1, 50).unwrap();
        assert_eq!(count, 1, "exactly one row after duplicate save");
        assert_eq!(rows[0].sha256, sha1);
    }

    #[test]
    fn save_links_workflow_through_history() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
        let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");

        let (cert, key) = self_signed(&["linked.example"]);
        let sha = save_cert(&store, "workflow", &key, &cert, "", &run).unwrap();
        let row = store.get_cert(&sha).unwrap().unwrap();
        assert_eq!(row.workflow_id.as_deref(), Some(wf.as_str()));
        assert_eq!(row.history_id.as_deref(), Some(run.as_str()));
        assert_eq!(row.source, "workflow");
    }

    #[test]
    fn mismatched_upload_is_rejected() {
        let (_dir, store) = test_store();
        let (cert, _) = self_signed(&["a.example"]);
        let (_, other_key) = self_signed(&["b.example"]);
        assert!(upload_cert(&store, &other_key, &cert).is_err());
    }

    #[test]
    fn get_cert_resolves_by_id_and_sha() {
        let (_dir, store) = test_store();
        let (cert, key) = self_signed(&["g.example"]);
        let sha = upload_cert(&store, &key, &cert).unwrap();
        let by_sha = get_cert(&store, &sha).unwrap();
        assert_eq!(by_sha.domains, "g.example");
        let row = store.get_cert(&sha).unwrap().unwrap();
        let by_id = get_cert(&store, &row.id.to_string()).unwrap();
        assert_eq!(by_id.cert, by_sha.cert);
    }
}
