//! DNS provider adapters for DNS-01 challenges.
//!
//! Each adapter publishes and removes the `_acme-challenge` TXT record
//! through its vendor API, using credentials from the referenced Access
//! row. Credential key names follow the stored access configs.

use async_trait::async_trait;
use serde_json::{Map, Value};

use cf_domain::error::{Error, Result};

mod aliyun;
mod cloudflare;
mod godaddy;
mod tencentcloud;

/// A DNS zone operator able to host ACME TXT challenge records.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Publish the challenge TXT record for `domain` (wildcards already
    /// stripped by the caller).
    async fn set_txt_record(&self, domain: &str, value: &str) -> Result<()>;

    /// Remove any challenge TXT records previously published for
    /// `domain`. Best-effort cleanup; callers ignore failures.
    async fn remove_txt_record(&self, domain: &str) -> Result<()>;
}

/// Instantiate a provider adapter by tag.
pub fn make_provider(
    tag: &str,
    creds: &Map<String, Value>,
    http: reqwest::Client,
) -> Result<Box<dyn DnsProvider>> {
    match tag {
        "cloudflare" => Ok(Box::new(cloudflare::Cloudflare::new(creds, http)?)),
        "aliyun" => Ok(Box::new(aliyun::Aliyun::new(creds, http)?)),
        "tencentcloud" => Ok(Box::new(tencentcloud::TencentCloud::new(creds, http)?)),
        "godaddy" => Ok(Box::new(godaddy::GoDaddy::new(creds, http)?)),
        other => Err(Error::Config(format!("unsupported DNS provider: {other}"))),
    }
}

pub(crate) fn cred<'a>(creds: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    creds
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Config(format!("DNS credentials are missing {key}")))
}

/// The record host for a challenge domain, e.g.
/// `_acme-challenge.www.example.com`.
pub(crate) fn record_fqdn(domain: &str) -> String {
    format!("_acme-challenge.{}", domain.trim_start_matches("*."))
}

/// Candidate zones for an fqdn, most specific first:
/// `a.b.example.com` → `[a.b.example.com, b.example.com, example.com]`.
pub(crate) fn zone_candidates(fqdn: &str) -> Vec<String> {
    let labels: Vec<&str> = fqdn.trim_end_matches('.').split('.').collect();
    let mut out = Vec::new();
    for i in 0..labels.len() {
        if labels.len() - i >= 2 {
            out.push(labels[i..].join("."));
        }
    }
    out
}

/// Registrable-domain heuristic used by the vendors that key their APIs
/// on the apex zone: the last two labels.
pub(crate) fn apex_zone(domain: &str) -> (String, String) {
    let fqdn = record_fqdn(domain);
    let labels: Vec<&str> = fqdn.split('.').collect();
    if labels.len() <= 2 {
        return (fqdn.clone(), String::new());
    }
    let zone = labels[labels.len() - 2..].join(".");
    let rr = labels[..labels.len() - 2].join(".");
    (zone, rr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_candidates_walk_up_labels() {
        assert_eq!(
            zone_candidates("_acme-challenge.www.example.com"),
            vec![
                "_acme-challenge.www.example.com",
                "www.example.com",
                "example.com"
            ]
        );
        assert_eq!(zone_candidates("example.com"), vec!["example.com"]);
    }

    #[test]
    fn apex_zone_splits_record_and_zone() {
        let (zone, rr) = apex_zone("www.example.com");
        assert_eq!(zone, "example.com");
        assert_eq!(rr, "_acme-challenge.www");

        let (zone, rr) = apex_zone("*.example.com");
        assert_eq!(zone, "example.com");
        assert_eq!(rr, "_acme-challenge");
    }

    #[test]
    fn unknown_tag_is_a_config_error() {
        let err = match make_provider("route66", &Map::new(), reqwest::Client::new()) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("unsupported DNS provider"));
    }

    #[test]
    fn missing_credential_names_the_key() {
        let err = cred(&Map::new(), "api_token").unwrap_err();
        assert!(err.to_string().contains("api_token"));
    }
}
