//! Alibaba Cloud CDN adapter: set the domain certificate directly via
//! the HMAC-SHA1-signed RPC API.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha1::Sha1;

use cf_domain::error::{Error, Result};

use crate::{access_creds, cred, node_str, DeployTarget};

const ENDPOINT: &str = "https://cdn.aliyuncs.com/";
const VERSION: &str = "2018-05-10";

fn sign(secret: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let string_to_sign = format!("POST&%2F&{}", urlencoding::encode(&canonical));
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret}&").as_bytes())
        .expect("hmac accepts any key length");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

async fn rpc(creds: &Map<String, Value>, action: &str, extra: &[(&str, &str)]) -> Result<Value> {
    let access_key_id = cred(creds, "access_key_id")?;
    let access_key_secret = cred(creds, "access_key_secret")?;

    let mut params: Vec<(String, String)> = vec![
        ("AccessKeyId".into(), access_key_id.to_string()),
        ("Action".into(), action.to_string()),
        ("Format".into(), "JSON".into()),
        ("SignatureMethod".into(), "HMAC-SHA1".into()),
        ("SignatureNonce".into(), uuid::Uuid::new_v4().to_string()),
        ("SignatureVersion".into(), "1.0".into()),
        ("Timestamp".into(), Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ("Version".into(), VERSION.into()),
    ];
    for (k, v) in extra {
        params.push((k.to_string(), v.to_string()));
    }
    params.push(("Signature".into(), sign(access_key_secret, &params)));

    let resp = reqwest::Client::new()
        .post(ENDPOINT)
        .form(&params)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("aliyun request: {e}")))?;
    let body: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("aliyun response: {e}")))?;
    if let Some(code) = body.get("Code").and_then(|v| v.as_str()) {
        return Err(Error::Deploy(format!(
            "aliyun API error {code}: {}",
            body.get("Message").and_then(|v| v.as_str()).unwrap_or("")
        )));
    }
    Ok(body)
}

/// Upload-and-bind in one call: `SetCdnDomainSSLCertificate` with inline
/// key material.
pub(crate) async fn deploy_cdn(target: &DeployTarget<'_>) -> Result<()> {
    let domain = node_str(target.config, "domain")?;
    let creds = access_creds(target.store, target.config)?;
    let cert_name = format!("certfleet-{}", Utc::now().format("%Y%m%d%H%M%S"));
    rpc(
        &creds,
        "SetCdnDomainSSLCertificate",
        &[
            ("DomainName", domain.as_str()),
            ("CertName", cert_name.as_str()),
            ("CertType", "upload"),
            ("SSLProtocol", "on"),
            ("SSLPub", target.cert.cert.as_str()),
            ("SSLPri", target.cert.key.as_str()),
        ],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_order_insensitive() {
        let params = vec![
            ("DomainName".to_string(), "cdn.example.com".to_string()),
            ("Action".to_string(), "SetCdnDomainSSLCertificate".to_string()),
        ];
        let mut reversed = params.clone();
        reversed.reverse();
        assert_eq!(sign("s", &params), sign("s", &reversed));
    }
}
