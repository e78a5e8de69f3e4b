//! DogeCloud CDN adapter. Requests are signed with
//! `hmac-sha1(secret, "<path>\n<body>")` carried in a `TOKEN` header.

use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha1::Sha1;

use cf_domain::error::{Error, Result};

use crate::{access_creds, cred, node_str, DeployTarget};

const API: &str = "https://api.dogecloud.com";

fn token(access_key: &str, secret_key: &str, path: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret_key.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(format!("{path}\n{body}").as_bytes());
    format!("TOKEN {access_key}:{}", hex::encode(mac.finalize().into_bytes()))
}

async fn call(creds: &Map<String, Value>, path: &str, payload: &Value) -> Result<Value> {
    let access_key = cred(creds, "access_key")?;
    let secret_key = cred(creds, "secret_key")?;
    let body = serde_json::to_string(payload)?;

    let resp = reqwest::Client::new()
        .post(format!("{API}{path}"))
        .header("Authorization", token(access_key, secret_key, path, &body))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("dogecloud request: {e}")))?;
    let reply: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("dogecloud response: {e}")))?;
    if reply.get("code").and_then(|v| v.as_i64()) != Some(200) {
        return Err(Error::Deploy(format!(
            "dogecloud API error: {}",
            reply.get("msg").and_then(|v| v.as_str()).unwrap_or("unknown")
        )));
    }
    Ok(reply)
}

pub(crate) async fn deploy_cdn(target: &DeployTarget<'_>) -> Result<()> {
    let domain = node_str(target.config, "domain")?;
    let creds = access_creds(target.store, target.config)?;

    let note = format!("certfleet-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let upload = call(
        &creds,
        "/cdn/cert/upload.json",
        &json!({
            "note": note,
            "cert": target.cert.cert,
            "private": target.cert.key,
        }),
    )
    .await?;
    let cert_id = upload
        .get("data")
        .and_then(|d| d.get("id"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Deploy("dogecloud upload returned no certificate id".into()))?;
    target.log.debug(&format!("uploaded certificate {cert_id}"));

    call(
        &creds,
        "/cdn/domain/config.json",
        &json!({
            "domain": domain,
            "cert_id": cert_id,
        }),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_signs_path_and_body() {
        let a = token("AK", "SK", "/cdn/cert/upload.json", "{}");
        let b = token("AK", "SK", "/cdn/cert/upload.json", r#"{"x":1}"#);
        assert!(a.starts_with("TOKEN AK:"));
        assert_ne!(a, b);
    }
}
