//! Tencent Cloud DNSPod adapter, speaking the TC3-HMAC-SHA256-signed
//! JSON API.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use cf_domain::error::{Error, Result};

use super::{apex_zone, cred, DnsProvider};

const HOST: &str = "dnspod.tencentcloudapi.com";
const SERVICE: &str = "dnspod";
const VERSION: &str = "2021-03-23";

pub struct TencentCloud {
    secret_id: String,
    secret_key: String,
    http: reqwest::Client,
}

impl TencentCloud {
    pub fn new(creds: &Map<String, Value>, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            secret_id: cred(creds, "secret_id")?.to_string(),
            secret_key: cred(creds, "secret_key")?.to_string(),
            http,
        })
    }

    async fn call(&self, action: &str, payload: &Value) -> Result<Value> {
        let body = serde_json::to_string(payload)?;
        let timestamp = Utc::now().timestamp();
        let authorization = authorization_header(
            &self.secret_id,
            &self.secret_key,
            timestamp,
            &body,
        );

        let resp = self
            .http
            .post(format!("https://{HOST}/"))
            .header("Authorization", authorization)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Host", HOST)
            .header("X-TC-Action", action)
            .header("X-TC-Version", VERSION)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Dns(format!("tencentcloud request: {e}")))?;
        let reply: Value = resp
            .json()
            .await
            .map_err(|e| Error::Dns(format!("tencentcloud response: {e}")))?;
        let response = reply.get("Response").cloned().unwrap_or(Value::Null);
        if let Some(err) = response.get("Error") {
            return Err(Error::Dns(format!(
                "tencentcloud API error {}: {}",
                err.get("Code").and_then(|v| v.as_str()).unwrap_or("unknown"),
                err.get("Message").and_then(|v| v.as_str()).unwrap_or("")
            )));
        }
        Ok(response)
    }
}

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Build the TC3-HMAC-SHA256 Authorization header for a JSON POST.
fn authorization_header(secret_id: &str, secret_key: &str, timestamp: i64, body: &str) -> String {
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

#[async_trait::async_trait]
impl DnsProvider for TencentCloud {
    async fn set_txt_record(&self, domain: &str, value: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        self.call(
            "CreateRecord",
            &json!({
                "Domain": zone,
                "SubDomain": rr,
                "RecordType": "TXT",
                "RecordLine": "默认",
                "Value": value,
                "TTL": 600,
            }),
        )
        .await?;
        Ok(())
    }

    async fn remove_txt_record(&self, domain: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        let listing = self
            .call(
                "DescribeRecordList",
                &json!({ "Domain": zone, "Subdomain": rr, "RecordType": "TXT" }),
            )
            .await;
        let listing = match listing {
            Ok(v) => v,
            // Nothing to clean up.
            Err(_) => return Ok(()),
        };
        if let Some(records) = listing.get("RecordList").and_then(|v| v.as_array()) {
            for record in records {
                if let Some(id) = record.get("RecordId").and_then(|v| v.as_i64()) {
                    self.call("DeleteRecord", &json!({ "Domain": zone, "RecordId": id }))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_shape() {
        let header = authorization_header("AKIDexample", "secret", 1_718_409_600, "{}");
        assert!(header.starts_with("TC3-HMAC-SHA256 Credential=AKIDexample/2024-06-15/dnspod/tc3_request"));
        assert!(header.contains("SignedHeaders=content-type;host"));
        let sig = header.rsplit("Signature=").next().unwrap();
        assert_eq!(sig.len(), 64, "hex sha256 signature");
    }

    #[test]
    fn signature_depends_on_body() {
        let a = authorization_header("id", "key", 1_718_409_600, "{}");
        let b = authorization_header("id", "key", 1_718_409_600, r#"{"Domain":"x"}"#);
        assert_ne!(a, b);
    }
}
