//! SafeLine WAF adapter (token-header API).

use serde_json::{json, Map, Value};

use cf_domain::error::{Error, Result};
use cf_store::Store;

use crate::{access_creds, base_url, cred, http_client, ignore_ssl, node_str, DeployTarget};

async fn request(
    store: &Store,
    config: &Map<String, Value>,
    method: reqwest::Method,
    path: &str,
    body: &Value,
) -> Result<Value> {
    let creds = access_creds(store, config)?;
    let token = cred(&creds, "api_token")?;
    let base = base_url(cred(&creds, "url")?)?;

    let client = http_client(ignore_ssl(&creds))?;
    let resp = client
        .request(method, format!("{base}{path}"))
        .header("X-SLCE-API-TOKEN", token)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("safeline request: {e}")))?;
    let reply: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("safeline response: {e}")))?;
    if let Some(err) = reply.get("err").and_then(|v| v.as_str()) {
        if !err.is_empty() {
            return Err(Error::Deploy(format!(
                "safeline error {err}: {}",
                reply.get("msg").and_then(|v| v.as_str()).unwrap_or("")
            )));
        }
    }
    Ok(reply)
}

/// Upload (or replace, when `cert_id` is non-zero) a manual certificate;
/// returns the certificate object id.
async fn upload_cert(
    store: &Store,
    config: &Map<String, Value>,
    cert_id: i64,
    cert: &str,
    key: &str,
) -> Result<i64> {
    let mut body = json!({
        "type": 2,
        "manual": { "crt": cert, "key": key },
    });
    if cert_id != 0 {
        body["id"] = json!(cert_id);
    }
    let reply = request(store, config, reqwest::Method::POST, "api/open/cert", &body).await?;
    reply
        .get("data")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Deploy("safeline upload returned no certificate id".into()))
}

/// Install the bundle as the panel's own certificate.
pub(crate) async fn deploy_panel(target: &DeployTarget<'_>) -> Result<()> {
    let cert_id = upload_cert(
        target.store,
        target.config,
        0,
        &target.cert.cert,
        &target.cert.key,
    )
    .await?;
    request(
        target.store,
        target.config,
        reqwest::Method::PUT,
        "api/open/system",
        &json!({ "cert_id": cert_id }),
    )
    .await?;
    Ok(())
}

/// Refresh the certificate bound to one protected site (matched by its
/// comment/name). Sites without a bound certificate get a fresh upload
/// the operator still needs to attach.
pub(crate) async fn deploy_site(target: &DeployTarget<'_>) -> Result<()> {
    let site_name = node_str(target.config, "siteName")?;
    let listing = request(
        target.store,
        target.config,
        reqwest::Method::GET,
        &format!("api/open/site?page=1&page_size=100&site={site_name}"),
        &json!({}),
    )
    .await?;
    let sites = listing
        .get("data")
        .and_then(|d| d.get("data"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let site = sites
        .iter()
        .find(|s| s.get("comment").and_then(|v| v.as_str()) == Some(site_name.as_str()))
        .ok_or_else(|| Error::Deploy(format!("safeline has no site named {site_name}")))?;

    let cert_id = site.get("cert_id").and_then(|v| v.as_i64()).unwrap_or(0);
    if cert_id == 0 {
        let new_id = upload_cert(
            target.store,
            target.config,
            0,
            &target.cert.cert,
            &target.cert.key,
        )
        .await?;
        target.log.info(&format!(
            "site {site_name} has no TLS yet; uploaded certificate {new_id}, attach it manually"
        ));
    } else {
        target.log.debug(&format!("site {site_name} uses certificate {cert_id}, replacing"));
        upload_cert(
            target.store,
            target.config,
            cert_id,
            &target.cert.cert,
            &target.cert.key,
        )
        .await?;
    }
    Ok(())
}

pub async fn api_test(store: &Store, provider_id: &str) -> Result<()> {
    let mut config = Map::new();
    config.insert("provider_id".into(), Value::String(provider_id.to_string()));
    request(
        store,
        &config,
        reqwest::Method::GET,
        "api/open/site/group",
        &json!({}),
    )
    .await?;
    Ok(())
}
