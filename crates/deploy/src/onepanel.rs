//! 1Panel adapter. JSON requests authenticated with
//! `1Panel-Token = md5("1panel" + api_key + timestamp)`.

use serde_json::{json, Map, Value};

use cf_domain::error::{Error, Result};
use cf_store::Store;

use crate::{access_creds, base_url, cred, http_client, ignore_ssl, node_str, DeployTarget};

fn token(timestamp: &str, api_key: &str) -> String {
    format!("{:x}", md5::compute(format!("1panel{api_key}{timestamp}").as_bytes()))
}

async fn request(
    store: &Store,
    config: &Map<String, Value>,
    method: reqwest::Method,
    path: &str,
    body: &Value,
) -> Result<Value> {
    let creds = access_creds(store, config)?;
    let api_key = cred(&creds, "api_key")?;
    let base = base_url(cred(&creds, "url")?)?;

    let timestamp = chrono::Utc::now().timestamp().to_string();
    let client = http_client(ignore_ssl(&creds))?;
    let resp = client
        .request(method, format!("{base}{path}"))
        .header("1Panel-Timestamp", &timestamp)
        .header("1Panel-Token", token(&timestamp, api_key))
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("1panel request: {e}")))?;
    let reply: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("1panel response: {e}")))?;
    match reply.get("code").and_then(|v| v.as_i64()) {
        Some(200) => Ok(reply),
        Some(_) => Err(Error::Deploy(format!(
            "1panel error: {}",
            reply.get("message").and_then(|v| v.as_str()).unwrap_or("unknown")
        ))),
        None => Err(Error::Deploy("1panel returned no status code".into())),
    }
}

/// Install the bundle as the panel's own certificate.
pub(crate) async fn deploy_panel(target: &DeployTarget<'_>) -> Result<()> {
    let body = json!({
        "cert": target.cert.cert,
        "key": target.cert.key,
        "ssl": "enable",
        "sslType": "import-paste",
    });
    request(
        target.store,
        target.config,
        reqwest::Method::POST,
        "api/v1/settings/ssl/update",
        &body,
    )
    .await?;
    Ok(())
}

/// Update one website's HTTPS config in place, preserving its current
/// protocol/HSTS settings.
pub(crate) async fn deploy_site(target: &DeployTarget<'_>) -> Result<()> {
    let site_id = node_str(target.config, "site_id")?;
    let website_id: i64 = site_id
        .parse()
        .map_err(|_| Error::Deploy(format!("site_id is not numeric: {site_id}")))?;

    let current = request(
        target.store,
        target.config,
        reqwest::Method::GET,
        &format!("api/v1/websites/{site_id}/https"),
        &json!({}),
    )
    .await?;
    let data = current
        .get("data")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::Deploy("1panel site query returned no data".into()))?;

    let ssl_protocol = data
        .get("SSLProtocol")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_else(|| {
            vec![json!("TLSv1.3"), json!("TLSv1.2"), json!("TLSv1.1"), json!("TLSv1")]
        });
    let http_config = match data.get("httpConfig").and_then(|v| v.as_str()) {
        Some("") | None => "HTTPToHTTPS",
        Some(v) => v,
    };

    let body = json!({
        "SSLProtocol": ssl_protocol,
        "algorithm": data.get("algorithm").and_then(|v| v.as_str()).unwrap_or_default(),
        "certificate": target.cert.cert,
        "privateKey": target.cert.key,
        "enable": true,
        "hsts": data.get("hsts").and_then(|v| v.as_bool()).unwrap_or(false),
        "httpConfig": http_config,
        "importType": "paste",
        "type": "manual",
        "websiteId": website_id,
    });
    request(
        target.store,
        target.config,
        reqwest::Method::POST,
        &format!("api/v1/websites/{site_id}/https"),
        &body,
    )
    .await?;
    Ok(())
}

pub async fn api_test(store: &Store, provider_id: &str) -> Result<()> {
    let mut config = Map::new();
    config.insert("provider_id".into(), Value::String(provider_id.to_string()));
    request(
        store,
        &config,
        reqwest::Method::GET,
        "api/v1/settings/upgrade",
        &json!({}),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_binds_key_and_timestamp() {
        let a = token("1718000000", "k");
        assert_eq!(a.len(), 32);
        assert_ne!(a, token("1718000001", "k"));
        assert_ne!(a, token("1718000000", "other"));
    }
}
