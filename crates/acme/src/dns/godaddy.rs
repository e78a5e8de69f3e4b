//! GoDaddy DNS adapter (`sso-key` header auth).

use serde_json::{json, Map, Value};

use cf_domain::error::{Error, Result};

use super::{apex_zone, cred, DnsProvider};

const API: &str = "https://api.godaddy.com";

pub struct GoDaddy {
    api_key: String,
    api_secret: String,
    http: reqwest::Client,
}

impl GoDaddy {
    pub fn new(creds: &Map<String, Value>, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            api_key: cred(creds, "api_key")?.to_string(),
            api_secret: cred(creds, "api_secret")?.to_string(),
            http,
        })
    }

    fn auth(&self) -> String {
        format!("sso-key {}:{}", self.api_key, self.api_secret)
    }
}

#[async_trait::async_trait]
impl DnsProvider for GoDaddy {
    async fn set_txt_record(&self, domain: &str, value: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        let url = format!("{API}/v1/domains/{zone}/records/TXT/{rr}");
        let resp = self
            .http
            .put(&url)
            .header("Authorization", self.auth())
            .json(&json!([{ "data": value, "ttl": 600 }]))
            .send()
            .await
            .map_err(|e| Error::Dns(format!("godaddy request: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Dns(format!(
                "godaddy API status {} for {url}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn remove_txt_record(&self, domain: &str) -> Result<()> {
        let (zone, rr) = apex_zone(domain);
        let url = format!("{API}/v1/domains/{zone}/records/TXT/{rr}");
        let resp = self
            .http
            .delete(&url)
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| Error::Dns(format!("godaddy request: {e}")))?;
        // 404 just means nothing was published.
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(Error::Dns(format!(
                "godaddy API status {} for {url}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_key_and_secret() {
        let mut creds = Map::new();
        creds.insert("api_key".into(), Value::String("k".into()));
        assert!(GoDaddy::new(&creds, reqwest::Client::new()).is_err());
        creds.insert("api_secret".into(), Value::String("s".into()));
        let gd = GoDaddy::new(&creds, reqwest::Client::new()).unwrap();
        assert_eq!(gd.auth(), "sso-key k:s");
    }
}
