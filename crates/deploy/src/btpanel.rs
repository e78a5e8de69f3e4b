//! bt-panel adapter. Requests are form-encoded and signed with
//! `md5(timestamp + md5(api_key))`.

use serde_json::{Map, Value};

use cf_domain::error::{Error, Result};
use cf_store::Store;

use crate::{access_creds, base_url, cred, http_client, ignore_ssl, node_str, DeployTarget};

fn signature(timestamp: &str, api_key: &str) -> String {
    let key_md5 = format!("{:x}", md5::compute(api_key.as_bytes()));
    format!("{:x}", md5::compute(format!("{timestamp}{key_md5}").as_bytes()))
}

async fn request(
    store: &Store,
    config: &Map<String, Value>,
    path: &str,
    mut form: Vec<(String, String)>,
) -> Result<Value> {
    let creds = access_creds(store, config)?;
    let api_key = cred(&creds, "api_key")?;
    let base = base_url(cred(&creds, "url")?)?;

    let timestamp = chrono::Utc::now().timestamp().to_string();
    form.push(("request_time".into(), timestamp.clone()));
    form.push(("request_token".into(), signature(&timestamp, api_key)));

    let client = http_client(ignore_ssl(&creds))?;
    let resp = client
        .post(format!("{base}{path}"))
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("btpanel request: {e}")))?;
    let body: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("btpanel response: {e}")))?;
    if body.get("status").and_then(|v| v.as_bool()) == Some(false) {
        return Err(Error::Deploy(format!(
            "btpanel error: {}",
            body.get("msg").and_then(|v| v.as_str()).unwrap_or("unknown")
        )));
    }
    Ok(body)
}

/// Install the bundle as the panel's own certificate.
pub(crate) async fn deploy_panel(target: &DeployTarget<'_>) -> Result<()> {
    let form = vec![
        ("cert_type".to_string(), "1".to_string()),
        ("privateKey".to_string(), target.cert.key.clone()),
        ("certPem".to_string(), target.cert.cert.clone()),
    ];
    request(target.store, target.config, "config?action=SetPanelSSL", form).await?;
    Ok(())
}

/// Upload the bundle to the panel cert store, then bind it to each of
/// the comma-separated site names.
pub(crate) async fn deploy_site(target: &DeployTarget<'_>) -> Result<()> {
    let site_names = node_str(target.config, "siteName")?;

    let upload = request(
        target.store,
        target.config,
        "ssl/cert/save_cert",
        vec![
            ("key".to_string(), target.cert.key.clone()),
            ("csr".to_string(), target.cert.cert.clone()),
        ],
    )
    .await?;
    let ssl_hash = upload
        .get("ssl_hash")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Deploy("btpanel upload returned no ssl_hash".into()))?;

    let batch: Vec<Value> = site_names
        .split(',')
        .map(|name| {
            serde_json::json!({ "siteName": name.trim(), "ssl_hash": ssl_hash })
        })
        .collect();
    request(
        target.store,
        target.config,
        "ssl?action=SetBatchCertToSite",
        vec![("BatchInfo".to_string(), serde_json::to_string(&batch)?)],
    )
    .await?;
    Ok(())
}

/// Connectivity test for the access editor.
pub async fn api_test(store: &Store, provider_id: &str) -> Result<()> {
    let mut config = Map::new();
    config.insert("provider_id".into(), Value::String(provider_id.to_string()));
    request(store, &config, "system?action=GetNetWork", Vec::new()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_md5_of_timestamp_and_hashed_key() {
        // md5("key") = 3c6e0b8a9c15224a8228b9a98ca1531d
        // md5("100" + that) is stable.
        let sig = signature("100", "key");
        assert_eq!(sig.len(), 32);
        assert_eq!(sig, signature("100", "key"), "deterministic");
        assert_ne!(sig, signature("101", "key"));
        assert_ne!(sig, signature("100", "other"));
    }
}
