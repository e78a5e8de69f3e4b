//! Alibaba Cloud DNS (alidns) adapter, speaking the HMAC-SHA1-signed RPC
//! API.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha1::Sha1;

use cf_domain::error::{Error, Result};

use super::{apex_zone, cred, DnsProvider};

const ENDPOINT: &str = "https://alidns.aliyuncs.com/";
const API_VERSION: &str = "2015-01-09";

pub struct Aliyun {
    access_key_id: String,
    access_key_secret: String,
    http: reqwest::Client,
}

impl Aliyun {
    pub fn new(creds: &Map<String, Value>, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            access_key_id: cred(creds, "access_key_id")?.to_string(),
            access_key_secret: cred(creds, "access_key_secret")?.to_string(),
            http,
        })
    }

    async fn rpc(&self, action: &str, extra: &[(&str, &str)]) -> Result<Value> {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let mut params: Vec<(String, String)> = vec![
            ("AccessKeyId".into(), self.access_key_id.clone()),
            ("Action".into(), action.to_string()),
            ("Format".into(), "JSON".into()),
            ("SignatureMethod".into(), "HMAC-SHA1".into()),
            ("SignatureNonce".into(), nonce),
            ("SignatureVersion".into(), "1.0".into()),
            ("Timestamp".into(), timestamp),
            ("Version".into(), API_VERSION.into()),
        ];
        for (k, v) in extra {
            params.push((k.to_string(), v.to_string()));
        }
        let signature = sign(&self.access_key_secret, &params);
        params.push(("Signature".into(), signature));

        let resp = self
            .http
            .get(ENDPOINT)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Dns(format!("aliyun request: {e}")))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Dns(format!("aliyun response: {e}")))?;
        // Error payloads carry a Code field; successes only a RequestId.
        if let Some(code) = body.get("Code").and_then(|v| v.as_str()) {
            return Err(Error::Dns(format!(
                "aliyun API error {code}: {}",
                body.get("Message").and_then(|v| v.as_str()).unwrap_or("")
            )));
        }
        if !status.is_success() {
            return Err(Error::Dns(format!("aliyun API status {}", status.as_u16())));
        }
        Ok(body)
    }
}

/// RPC-style signature: sorted, percent-encoded query joined into
/// `GET&%2F&<encoded query>`, MACed with `secret&`.
fn sign(secret: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let string_to_sign = format!("GET&%2F&{}", urlencoding::encode(&canonical));

    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret}&").as_bytes())
        .expect("hmac accepts any key length");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[async_trait::async_trait]
impl DnsProvider for Aliyun {
    async fn set_txt_record(&self, domain: &str, value: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        self.rpc(
            "AddDomainRecord",
            &[
                ("DomainName", zone.as_str()),
                ("RR", rr.as_str()),
                ("Type", "TXT"),
                ("Value", value),
                ("TTL", "600"),
            ],
        )
        .await?;
        Ok(())
    }

    async fn remove_txt_record(&self, domain: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        self.rpc(
            "DeleteSubDomainRecords",
            &[
                ("DomainName", zone.as_str()),
                ("RR", rr.as_str()),
                ("Type", "TXT"),
            ],
        )
        .await?;
        Ok(())
    }
}
