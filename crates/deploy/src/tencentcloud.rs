//! Tencent Cloud adapter: upload to the SSL service, then deploy the
//! certificate onto cdn/cos/waf/teo instances. TC3-HMAC-SHA256 signed.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use cf_domain::error::{Error, Result};

use crate::{access_creds, cred, node_str, DeployTarget};

const HOST: &str = "ssl.tencentcloudapi.com";
const SERVICE: &str = "ssl";
const VERSION: &str = "2019-12-05";

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn authorization(secret_id: &str, secret_key: &str, timestamp: i64, body: &str) -> String {
    let date = chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let signed_headers = "content-type;host";
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:application/json; charset=utf-8\nhost:{HOST}\n\n{signed_headers}\n{}",
        sha256_hex(body)
    );
    let credential_scope = format!("{date}/{SERVICE}/tc3_request");
    let string_to_sign = format!(
        "TC3-HMAC-SHA256\n{timestamp}\n{credential_scope}\n{}",
        sha256_hex(&canonical_request)
    );
    let secret_date = hmac_sha256(format!("TC3{secret_key}").as_bytes(), &date);
    let secret_service = hmac_sha256(&secret_date, SERVICE);
    let secret_signing = hmac_sha256(&secret_service, "tc3_request");
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign));
    format!(
        "TC3-HMAC-SHA256 Credential={secret_id}/{credential_scope}, \
         SignedHeaders={signed_headers}, Signature={signature}"
    )
}

async fn call(creds: &Map<String, Value>, action: &str, payload: &Value) -> Result<Value> {
    let secret_id = cred(creds, "secret_id")?;
    let secret_key = cred(creds, "secret_key")?;
    let body = serde_json::to_string(payload)?;
    let timestamp = Utc::now().timestamp();

    let resp = reqwest::Client::new()
        .post(format!("https://{HOST}/"))
        .header("Authorization", authorization(secret_id, secret_key, timestamp, &body))
        .header("Content-Type", "application/json; charset=utf-8")
        .header("Host", HOST)
        .header("X-TC-Action", action)
        .header("X-TC-Version", VERSION)
        .header("X-TC-Timestamp", timestamp.to_string())
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Deploy(format!("tencentcloud request: {e}")))?;
    let reply: Value = resp
        .json()
        .await
        .map_err(|e| Error::Deploy(format!("tencentcloud response: {e}")))?;
    let response = reply.get("Response").cloned().unwrap_or(Value::Null);
    if let Some(err) = response.get("Error") {
        return Err(Error::Deploy(format!(
            "tencentcloud API error {}: {}",
            err.get("Code").and_then(|v| v.as_str()).unwrap_or("unknown"),
            err.get("Message").and_then(|v| v.as_str()).unwrap_or("")
        )));
    }
    Ok(response)
}

/// Upload the bundle, then point the named resource instances at it.
pub(crate) async fn deploy(target: &DeployTarget<'_>, resource_type: &str) -> Result<()> {
    let domain = node_str(target.config, "domain")?;
    let creds = access_creds(target.store, target.config)?;

    let upload = call(
        &creds,
        "UploadCertificate",
        &json!({
            "CertificatePublicKey": target.cert.cert,
            "CertificatePrivateKey": target.cert.key,
            "CertificateType": "SVR",
            "Repeatable": false,
        }),
    )
    .await?;
    let cert_id = upload
        .get("CertificateId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Deploy("tencentcloud upload returned no CertificateId".into()))?;
    target.log.debug(&format!("uploaded certificate {cert_id}"));

    let instances: Vec<String> = domain.split(',').map(|d| d.trim().to_string()).collect();
    call(
        &creds,
        "DeployCertificateInstance",
        &json!({
            "CertificateId": cert_id,
            "InstanceIdList": instances,
            "ResourceType": resource_type,
            "Status": 1,
        }),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_scope_uses_ssl_service() {
        let header = authorization("AKID", "secret", 1_718_409_600, "{}");
        assert!(header.contains("/2024-06-15/ssl/tc3_request"));
        assert!(header.starts_with("TC3-HMAC-SHA256 Credential=AKID/"));
    }
}
