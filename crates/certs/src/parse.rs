//! PEM certificate parsing.

use chrono::{DateTime, Local, TimeZone};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use cf_domain::error::{Error, Result};
use cf_domain::TIME_FORMAT;

/// Everything the rest of the system needs from a parsed leaf certificate.
#[derive(Debug, Clone)]
pub struct CertInfo {
    /// CN ∪ SAN DNS names, deduplicated, CN first.
    pub domains: Vec<String>,
    /// Issuer organization, falling back to the issuer CN, then "UNKNOWN".
    pub issuer: String,
    pub issuer_cn: String,
    pub not_before: DateTime<Local>,
    pub not_after: DateTime<Local>,
    /// Hex SHA-256 of the DER encoding.
    pub sha256: String,
}

impl CertInfo {
    pub fn start_time(&self) -> String {
        self.not_before.format(TIME_FORMAT).to_string()
    }

    pub fn end_time(&self) -> String {
        self.not_after.format(TIME_FORMAT).to_string()
    }

    /// Whole days until expiry; negative once expired.
    pub fn days_remaining(&self) -> i64 {
        (self.not_after.timestamp() - Local::now().timestamp()) / 86_400
    }

    pub fn domains_joined(&self) -> String {
        self.domains.join(",")
    }
}

/// Decode the first PEM block of `pem_str` as a DER certificate.
pub fn decode_cert_der(pem_str: &str) -> Result<Vec<u8>> {
    let block = pem::parse(pem_str)
        .map_err(|e| Error::Validation(format!("certificate PEM: {e}")))?;
    if block.tag() != "CERTIFICATE" {
        return Err(Error::Validation(format!(
            "expected CERTIFICATE PEM block, got {}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

/// Parse a PEM leaf certificate into [`CertInfo`].
pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let der = decode_cert_der(pem_str)?;
    parse_cert_der(&der)
}

pub fn parse_cert_der(der: &[u8]) -> Result<CertInfo> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Validation(format!("certificate DER: {e}")))?;

    let mut domains: Vec<String> = Vec::new();
    if let Some(cn) = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|a| a.as_str().ok())
    {
        if !cn.is_empty() {
            domains.push(cn.to_string());
        }
    }
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                if !domains.iter().any(|d| d == dns) {
                    domains.push(dns.to_string());
                }
            }
        }
    }

    let issuer_org = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|a| a.as_str().ok())
        .unwrap_or("")
        .to_string();
    let issuer_cn = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|a| a.as_str().ok())
        .unwrap_or("")
        .to_string();
    let issuer = if !issuer_org.is_empty() {
        issuer_org
    } else if !issuer_cn.is_empty() {
        issuer_cn.clone()
    } else {
        "UNKNOWN".to_string()
    };

    let not_before = local_time(cert.validity().not_before.timestamp())?;
    let not_after = local_time(cert.validity().not_after.timestamp())?;

    Ok(CertInfo {
        domains,
        issuer,
        issuer_cn,
        not_before,
        not_after,
        sha256: hex::encode(Sha256::digest(der)),
    })
}

/// Hex SHA-256 of a PEM certificate's DER bytes.
pub fn cert_sha256(pem_str: &str) -> Result<String> {
    Ok(hex::encode(Sha256::digest(decode_cert_der(pem_str)?)))
}

/// Split a bundle PEM into (leaf, issuer chain).
pub fn split_chain(chain_pem: &str) -> Result<(String, String)> {
    let blocks = pem::parse_many(chain_pem)
        .map_err(|e| Error::Validation(format!("certificate chain PEM: {e}")))?;
    if blocks.is_empty() {
        return Err(Error::Validation("certificate chain is empty".into()));
    }
    let leaf = pem::encode(&blocks[0]);
    let issuers = blocks[1..]
        .iter()
        .map(pem::encode)
        .collect::<Vec<_>>()
        .join("");
    Ok((leaf, issuers))
}

fn local_time(ts: i64) -> Result<DateTime<Local>> {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| Error::Validation("certificate validity out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(domains: &[&str]) -> (String, String) {
        let params =
            rcgen::CertificateParams::new(domains.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn extracts_san_domains_and_validity() {
        let (cert_pem, _) = self_signed(&["a.example", "b.example"]);
        let info = parse_cert_pem(&cert_pem).unwrap();
        assert!(info.domains.contains(&"a.example".to_string()));
        assert!(info.domains.contains(&"b.example".to_string()));
        assert!(info.not_after > info.not_before);
        assert_eq!(info.sha256.len(), 64, "hex sha256");
    }

    #[test]
    fn reparsing_reserialized_pem_is_stable() {
        let (cert_pem, _) = self_signed(&["x.example"]);
        let der = decode_cert_der(&cert_pem).unwrap();
        let reserialized = pem::encode(&pem::Pem::new("CERTIFICATE", der));
        let a = parse_cert_pem(&cert_pem).unwrap();
        let b = parse_cert_pem(&reserialized).unwrap();
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.domains, b.domains);
    }

    #[test]
    fn split_chain_separates_leaf_and_issuers() {
        let (leaf, _) = self_signed(&["leaf.example"]);
        let (issuer, _) = self_signed(&["issuer.example"]);
        let bundle = format!("{leaf}{issuer}");
        let (got_leaf, got_issuer) = split_chain(&bundle).unwrap();
        assert_eq!(parse_cert_pem(&got_leaf).unwrap().domains[0], "leaf.example");
        assert_eq!(parse_cert_pem(&got_issuer).unwrap().domains[0], "issuer.example");

        let (only_leaf, empty_issuer) = split_chain(&leaf).unwrap();
        assert!(!only_leaf.is_empty());
        assert!(empty_issuer.is_empty());
    }

    #[test]
    fn garbage_pem_is_a_validation_error() {
        assert!(parse_cert_pem("not a pem").is_err());
    }
}
