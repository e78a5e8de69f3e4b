//! Qiniu CDN adapter (QBox-token API): upload the certificate, then
//! switch the domain to it.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha1::Sha1;

use cf_domain::error::{Error, Result};

use crate::{access_creds, cred, node_str, DeployTarget};

const API: &str = "https://api.qiniu.com";

/// QBox signature over `<path>\n` (JSON bodies are not included).
fn qbox_token(access_key: &str, secret_key: &str, path: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret_key.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(format!("{path}\n").as_bytes());
    let sign = base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes());
    format!("QBox {access_key}:{sign}")
}

async fn call(
    creds: &Map<String, Value>,
    method: reqwest::Method,
    path: &str,
    body: &Value,
) -> Result<Value> {
    let access_key = cred(creds, "access_key")?;
    let secret_key = cred(creds, "access_secret")?;

    let resp = reqwest::Client::new()
        .request(method, format!("{API}{path}"))
        .header("Authorization", qbox_token(access_key, secret_key, path))
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("qiniu request: {e}")))?;
    let status = resp.status();
    let reply: Value = resp
        .json()
        .await
        .unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(Error::Deploy(format!(
            "qiniu API status {}: {}",
            status.as_u16(),
            reply.get("error").and_then(|v| v.as_str()).unwrap_or("")
        )));
    }
    if let Some(code) = reply.get("code").and_then(|v| v.as_i64()) {
        if code != 0 && code != 200 {
            return Err(Error::Deploy(format!(
                "qiniu API error {code}: {}",
                reply.get("error").and_then(|v| v.as_str()).unwrap_or("")
            )));
        }
    }
    Ok(reply)
}

pub(crate) async fn deploy_cdn(target: &DeployTarget<'_>) -> Result<()> {
    let domain = node_str(target.config, "domain")?;
    let creds = access_creds(target.store, target.config)?;

    let name = format!("certfleet-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let upload = call(
        &creds,
        reqwest::Method::POST,
        "/sslcert",
        &json!({
            "name": name,
            "common_name": domain,
            "pri": target.cert.key,
            "ca": target.cert.cert,
        }),
    )
    .await?;
    let cert_id = upload
        .get("certID")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Deploy("qiniu upload returned no certID".into()))?
        .to_string();
    target.log.debug(&format!("uploaded certificate {cert_id}"));

    call(
        &creds,
        reqwest::Method::PUT,
        &format!("/domain/{domain}/sslize"),
        &json!({ "certid": cert_id }),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_qbox_shape() {
        let token = qbox_token("AK", "SK", "/domain/x.example/sslize");
        assert!(token.starts_with("QBox AK:"));
        assert_ne!(token, qbox_token("AK", "SK", "/sslcert"), "path is signed");
    }
}
