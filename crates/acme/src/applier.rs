//! The apply-node entry point: certificate reuse, account resolution,
//! the DNS-01 order flow, and persistence of the issued bundle.

use std::time::Duration;

use instant_acme::{
    AuthorizationStatus, ChallengeType, Identifier, NewOrder, OrderStatus, RetryPolicy,
};
use serde_json::{json, Map, Value};

use cf_certs::keys::{generate_key_pem, KeyAlgorithm};
use cf_certs::parse::split_chain;
use cf_certs::{contains_all_ignoring_repeats, save_cert};
use cf_domain::error::{Error, Result};
use cf_domain::value::{as_bool_loose, as_i64_loose, as_string_loose};
use cf_domain::RunLogger;
use cf_store::Store;

use crate::account::{resolve_account, resolve_ca};
use crate::dns::make_provider;
use crate::precheck::{challenge_fqdn, Precheck, PrecheckMode, DEFAULT_NAME_SERVERS};

/// Parsed apply-node configuration.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub run_id: String,
    pub email: String,
    pub domains: Vec<String>,
    pub provider: String,
    pub provider_id: String,
    pub ca: String,
    pub algorithm: KeyAlgorithm,
    pub end_day: i64,
    pub eab_id: String,
    pub proxy: String,
    pub name_servers: Vec<String>,
    pub skip_check: bool,
    pub ignore_check: bool,
    pub close_cname: bool,
    pub max_wait: Duration,
}

impl ApplyRequest {
    pub fn from_config(config: &Map<String, Value>, run_id: &str) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            config
                .get(key)
                .and_then(as_string_loose)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Config(format!("apply node is missing {key}")))
        };

        let domains = cf_certs::domains::split_domains(&required("domains")?);
        if domains.is_empty() {
            return Err(Error::Config("apply node has no domains".into()));
        }

        let algorithm = KeyAlgorithm::parse(
            &config
                .get("algorithm")
                .and_then(as_string_loose)
                .unwrap_or_default(),
        )?;

        let name_servers = match config.get("name_server").and_then(as_string_loose) {
            Some(raw) if !raw.is_empty() => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => DEFAULT_NAME_SERVERS.iter().map(|s| s.to_string()).collect(),
        };

        let max_wait = config
            .get("max_wait")
            .and_then(as_i64_loose)
            .filter(|&secs| secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(Duration::from_secs(120));

        Ok(Self {
            run_id: run_id.to_string(),
            email: required("email")?,
            domains,
            provider: required("provider")?,
            provider_id: required("provider_id")?,
            ca: config.get("ca").and_then(as_string_loose).unwrap_or_default(),
            algorithm,
            end_day: config.get("end_day").and_then(as_i64_loose).unwrap_or(30),
            eab_id: config.get("eabId").and_then(as_string_loose).unwrap_or_default(),
            proxy: config.get("proxy").and_then(as_string_loose).unwrap_or_default(),
            name_servers,
            skip_check: config.get("skip_check").map(as_bool_loose).unwrap_or(false),
            ignore_check: config.get("ignore_check").map(as_bool_loose).unwrap_or(false),
            close_cname: config.get("close_cname").map(as_bool_loose).unwrap_or(false),
            max_wait,
        })
    }

    fn precheck(&self) -> Precheck {
        let mode = if self.skip_check {
            PrecheckMode::Skip
        } else if self.ignore_check {
            PrecheckMode::Ignore
        } else {
            PrecheckMode::Default
        };
        Precheck {
            mode,
            name_servers: self.name_servers.clone(),
            max_wait: self.max_wait,
            follow_cname: !self.close_cname,
        }
    }

    /// Per-apply HTTP client; carries the proxy and a 30 s timeout when
    /// one is configured.
    fn http_client(&self) -> Result<reqwest::Client> {
        if self.proxy.is_empty() {
            return reqwest::Client::builder()
                .build()
                .map_err(|e| Error::Http(e.to_string()));
        }
        let proxy = reqwest::Proxy::all(&self.proxy)
            .map_err(|e| Error::Config(format!("invalid proxy address: {e}")))?;
        reqwest::Client::builder()
            .proxy(proxy)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))
    }
}

/// Issue (or reuse) a certificate for an apply node. Returns the bundle
/// the engine records as the node output.
pub async fn apply(store: &Store, request: &ApplyRequest, log: &dyn RunLogger) -> Result<Value> {
    // Reuse a cached certificate when one still covers the request.
    match find_reusable(store, request)? {
        Some(bundle) => return Ok(bundle),
        None => log.debug("no reusable certificate, requesting a new one"),
    }
    log.debug(&format!("requesting certificate for {}", request.domains.join(",")));

    let http = request.http_client()?;
    let (ca, eab) = resolve_ca(store, &request.ca, &request.eab_id)?;
    let account = resolve_account(
        store,
        &request.email,
        &ca,
        request.algorithm.is_ec(),
        eab,
        &http,
        log,
    )
    .await?;

    let creds = store.access_config(&request.provider_id)?;
    let provider = make_provider(&request.provider, &creds, http)?;
    let precheck = request.precheck();

    let identifiers: Vec<Identifier> = request
        .domains
        .iter()
        .map(|d| Identifier::Dns(d.clone()))
        .collect();
    let mut order = account
        .new_order(&NewOrder::new(&identifiers))
        .await
        .map_err(|e| Error::Acme(format!("order creation: {e}")))?;

    let key_pem = generate_key_pem(request.algorithm)?;

    let mut published: Vec<String> = Vec::new();
    let issue = async {
        let mut authorizations = order.authorizations();
        while let Some(authorization) = authorizations.next().await {
            let mut authorization =
                authorization.map_err(|e| Error::Acme(format!("authorization fetch: {e}")))?;
            match authorization.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(Error::Acme(format!("authorization in state {status:?}")));
                }
            }
            let domain = authorization.identifier().to_string();
            let mut challenge = authorization
                .challenge(ChallengeType::Dns01)
                .ok_or_else(|| {
                    Error::Acme(format!("CA offers no DNS-01 challenge for {domain}"))
                })?;
            let txt_value = challenge.key_authorization().dns_value();

            log.info(&format!("publishing DNS challenge record for {domain}"));
            let _ = provider.remove_txt_record(&domain).await;
            provider.set_txt_record(&domain, &txt_value).await?;
            published.push(domain.clone());

            precheck
                .wait_for_txt(&challenge_fqdn(&domain), &txt_value, log)
                .await?;

            challenge
                .set_ready()
                .await
                .map_err(|e| Error::Acme(format!("challenge ready for {domain}: {e}")))?;
        }
        drop(authorizations);

        let status = order
            .poll_ready(&RetryPolicy::default())
            .await
            .map_err(|e| Error::Acme(format!("order polling: {e}")))?;
        if status != OrderStatus::Ready {
            return Err(Error::Acme(format!("order ended in state {status:?}")));
        }

        let csr = build_csr(&request.domains, &key_pem)?;
        order
            .finalize_csr(&csr)
            .await
            .map_err(|e| Error::Acme(format!("order finalize: {e}")))?;
        order
            .poll_certificate(&RetryPolicy::default())
            .await
            .map_err(|e| Error::Acme(format!("certificate download: {e}")))
    };
    let chain = issue.await;

    // Challenge records are transient regardless of the outcome.
    for domain in &published {
        let _ = provider.remove_txt_record(domain).await;
    }
    let chain = chain?;

    let (cert_pem, issuer_pem) = split_chain(&chain)?;
    save_cert(store, "workflow", &key_pem, &cert_pem, &issuer_pem, &request.run_id)?;

    Ok(json!({
        "cert": cert_pem,
        "key": key_pem,
        "issuerCert": issuer_pem,
        "domains": request.domains.join(","),
    }))
}

fn build_csr(domains: &[String], key_pem: &str) -> Result<Vec<u8>> {
    let key_pair = rcgen::KeyPair::from_pem(key_pem)
        .map_err(|e| Error::Validation(format!("CSR key: {e}")))?;
    let params = rcgen::CertificateParams::new(domains.to_vec())
        .map_err(|e| Error::Validation(format!("CSR params: {e}")))?;
    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| Error::Validation(format!("CSR build: {e}")))?;
    Ok(csr.der().as_ref().to_vec())
}

/// Find the stored certificate with the most remaining validity among
/// this workflow's certificates whose domain set covers the request.
/// Candidates at or under the reuse threshold fall through to fresh
/// issuance.
fn find_reusable(store: &Store, request: &ApplyRequest) -> Result<Option<Value>> {
    let history = store
        .get_history(&request.run_id)?
        .ok_or_else(|| Error::Config(format!("run {} has no history row", request.run_id)))?;
    let certs = store.certs_by_workflow(&history.workflow_id)?;

    let now = chrono::Local::now().timestamp();
    let mut best: Option<(i64, &cf_store::CertRow)> = None;
    for row in &certs {
        let stored_domains = cf_certs::domains::split_domains(row.domains.as_deref().unwrap_or(""));
        if !contains_all_ignoring_repeats(&stored_domains, &request.domains) {
            continue;
        }
        let Some(end_time) = row.end_time.as_deref() else {
            continue;
        };
        let Ok(end) = chrono::NaiveDateTime::parse_from_str(end_time, cf_domain::TIME_FORMAT)
        else {
            continue;
        };
        // Stored times are local wall-clock strings.
        let Some(end) = chrono::TimeZone::from_local_datetime(&chrono::Local, &end).single()
        else {
            continue;
        };
        let days = (end.timestamp() - now) / 86_400;
        if best.as_ref().map(|(d, _)| days > *d).unwrap_or(true) {
            best = Some((days, row));
        }
    }

    match best {
        Some((days, row)) if days > request.end_day => Ok(Some(json!({
            "cert": row.cert,
            "key": row.key,
            "issuerCert": row.issuer_cert.clone().unwrap_or_default(),
            "domains": row.domains.clone().unwrap_or_default(),
            "skip": true,
        }))),
        Some((days, _)) => {
            tracing::debug!(days, threshold = request.end_day, "cached certificate too close to expiry");
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn base_config() -> Map<String, Value> {
        serde_json::from_str(
            r#"{"email":"op@example.com","domains":"a.example, b.example",
                "provider":"cloudflare","provider_id":"1"}"#,
        )
        .unwrap()
    }

    #[test]
    fn config_defaults_are_applied() {
        let req = ApplyRequest::from_config(&base_config(), "run1").unwrap();
        assert_eq!(req.domains, vec!["a.example", "b.example"]);
        assert_eq!(req.algorithm, KeyAlgorithm::Rsa2048);
        assert_eq!(req.end_day, 30);
        assert_eq!(req.max_wait, Duration::from_secs(120));
        assert_eq!(req.name_servers, vec!["8.8.8.8:53", "1.1.1.1:53"]);
        assert!(!req.skip_check && !req.ignore_check && !req.close_cname);
    }

    #[test]
    fn config_accepts_loose_encodings() {
        let mut config = base_config();
        config.insert("end_day".into(), Value::String("45".into()));
        config.insert("skip_check".into(), Value::Number(1.into()));
        config.insert("max_wait".into(), Value::String("60".into()));
        config.insert("name_server".into(), Value::String("9.9.9.9:53".into()));
        let req = ApplyRequest::from_config(&config, "run1").unwrap();
        assert_eq!(req.end_day, 45);
        assert!(req.skip_check);
        assert_eq!(req.max_wait, Duration::from_secs(60));
        assert_eq!(req.name_servers, vec!["9.9.9.9:53"]);
    }

    #[test]
    fn missing_required_field_names_it() {
        let mut config = base_config();
        config.remove("email");
        let err = ApplyRequest::from_config(&config, "run1").unwrap_err();
        assert!(err.to_string().contains("email"), "got: {err}");
    }

    #[test]
    fn precheck_mode_selection() {
        let mut config = base_config();
        config.insert("skip_check".into(), Value::Bool(true));
        config.insert("ignore_check".into(), Value::Bool(true));
        let req = ApplyRequest::from_config(&config, "r").unwrap();
        // skip wins over ignore.
        assert_eq!(req.precheck().mode, PrecheckMode::Skip);

        let mut config = base_config();
        config.insert("ignore_check".into(), Value::Bool(true));
        let req = ApplyRequest::from_config(&config, "r").unwrap();
        assert_eq!(req.precheck().mode, PrecheckMode::Ignore);
    }

    fn insert_cert_row(store: &Store, workflow_id: &str, domains: &str, days_left: i64, sha: &str) {
        let end = chrono::Local::now() + chrono::Duration::days(days_left);
        store
            .insert_cert(&cf_store::NewCert {
                sha256: sha.into(),
                source: "workflow".into(),
                key: format!("KEY-{sha}"),
                cert: format!("CERT-{sha}"),
                issuer: "CA".into(),
                issuer_cert: String::new(),
                domains: domains.into(),
                history_id: String::new(),
                workflow_id: workflow_id.into(),
                start_time: String::new(),
                end_time: end.format(cf_domain::TIME_FORMAT).to_string(),
                end_day: days_left,
            })
            .unwrap();
    }

    #[test]
    fn reuse_picks_longest_lived_covering_cert() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
        let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");

        insert_cert_row(&store, &wf, "a.example,b.example", 40, "short");
        insert_cert_row(&store, &wf, "a.example,b.example,c.example", 80, "long");
        insert_cert_row(&store, &wf, "other.example", 200, "uncovering");

        let mut config = base_config();
        config.insert("end_day".into(), Value::Number(30.into()));
        let req = ApplyRequest::from_config(&config, &run).unwrap();
        let bundle = find_reusable(&store, &req).unwrap().expect("reusable");
        assert_eq!(bundle["cert"], "CERT-long");
        assert_eq!(bundle["skip"], true);
    }

    #[test]
    fn reuse_below_threshold_falls_through_to_issuance() {
        let (_dir, store) = test_store();
        let wf = store.add_workflow("w", "{}", "manual", 1, "").unwrap().to_string();
        let run = store.begin_run(&wf, "manual").unwrap().expect("no run in flight");
        insert_cert_row(&store, &wf, "a.example,b.example", 10, "stale");

        let req = ApplyRequest::from_config(&base_config(), &run).unwrap();
        assert!(
            find_reusable(&store, &req).unwrap().is_none(),
            "candidate within end_day must not be reused"
        );
    }

    #[test]
    fn reuse_requires_a_history_row() {
        let (_dir, store) = test_store();
        let req = ApplyRequest::from_config(&base_config(), "no-such-run").unwrap();
        assert!(find_reusable(&store, &req).is_err());
    }
}
