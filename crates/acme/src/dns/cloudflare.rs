//! Cloudflare DNS adapter. Accepts either a scoped API token or the
//! legacy email + global key pair.

use serde_json::{json, Map, Value};

use cf_domain::error::{Error, Result};

use super::{cred, record_fqdn, zone_candidates, DnsProvider};

const API: &str = "https://api.cloudflare.com/client/v4";

pub struct Cloudflare {
    auth: Auth,
    http: reqwest::Client,
}

enum Auth {
    Token(String),
    GlobalKey { email: String, key: String },
}

impl Cloudflare {
    pub fn new(creds: &Map<String, Value>, http: reqwest::Client) -> Result<Self> {
        let auth = if let Some(token) = creds.get("api_token").and_then(|v| v.as_str()) {
            if token.is_empty() {
                return Err(Error::Config("DNS credentials are missing api_token".into()));
            }
            Auth::Token(token.to_string())
        } else {
            Auth::GlobalKey {
                email: cred(creds, "email")?.to_string(),
                key: cred(creds, "api_key")?.to_string(),
            }
        };
        Ok(Self { auth, http })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.auth {
            Auth::Token(token) => req.bearer_auth(token),
            Auth::GlobalKey { email, key } => {
                req.header("X-Auth-Email", email).header("X-Auth-Key", key)
            }
        }
    }

    async fn api(&self, method: reqwest::Method, url: String, body: Option<Value>) -> Result<Value> {
        let mut req = self.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Dns(format!("cloudflare request: {e}")))?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Dns(format!("cloudflare response: {e}")))?;
        if body.get("success").and_then(|v| v.as_bool()) != Some(true) {
            return Err(Error::Dns(format!(
                "cloudflare API error: {}",
                body.get("errors").map(|e| e.to_string()).unwrap_or_default()
            )));
        }
        Ok(body)
    }

    async fn zone_id(&self, fqdn: &str) -> Result<String> {
        for candidate in zone_candidates(fqdn) {
            let body = self
                .api(reqwest::Method::GET, format!("{API}/zones?name={candidate}"), None)
                .await?;
            if let Some(id) = body
                .get("result")
                .and_then(|r| r.as_array())
                .and_then(|zones| zones.first())
                .and_then(|z| z.get("id"))
                .and_then(|v| v.as_str())
            {
                return Ok(id.to_string());
            }
        }
        Err(Error::Dns(format!("no cloudflare zone covers {fqdn}")))
    }
}

#[async_trait::async_trait]
impl DnsProvider for Cloudflare {
    async fn set_txt_record(&self, domain: &str, value: &str) -> Result<()> {
        let fqdn = record_fqdn(domain);
        let zone = self.zone_id(&fqdn).await?;
        self.api(
            reqwest::Method::POST,
            format!("{API}/zones/{zone}/dns_records"),
            Some(json!({ "type": "TXT", "name": fqdn, "content": value, "ttl": 120 })),
        )
        .await?;
        Ok(())
    }

    async fn remove_txt_record(&self, domain: &str) -> Result<()> {
        let fqdn = record_fqdn(domain);
        let zone = self.zone_id(&fqdn).await?;
        let listing = self
            .api(
                reqwest::Method::GET,
                format!("{API}/zones/{zone}/dns_records?type=TXT&name={fqdn}"),
                None,
            )
            .await?;
        if let Some(records) = listing.get("result").and_then(|r| r.as_array()) {
            for record in records {
                if let Some(id) = record.get("id").and_then(|v| v.as_str()) {
                    self.api(
                        reqwest::Method::DELETE,
                        format!("{API}/zones/{zone}/dns_records/{id}"),
                        None,
                    )
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
    fn accepts_token_or_email_key() {
        let mut creds = Map::new();
        creds.insert("api_token".into(), Value::String("t".into()));
        assert!(Cloudflare::new(&creds, reqwest::Client::new()).is_ok());

        let mut creds = Map::new();
        creds.insert("email".into(), Value::String("a@b.c".into()));
        creds.insert("api_key".into(), Value::String("k".into()));
        assert!(Cloudflare::new(&creds, reqwest::Client::new()).is_ok());

        assert!(Cloudflare::new(&Map::new(), reqwest::Client::new()).is_err());
    }
}
