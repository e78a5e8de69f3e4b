//! TLS probe of a live endpoint.
//!
//! The probe inspects the presented leaf certificate; it does NOT
//! validate trust (verification is disabled on purpose), so its output
//! must never be read as a trust decision.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use cf_certs::parse::parse_cert_der;
use cf_domain::error::{Error, Result};
use cf_domain::TIME_FORMAT;

/// Result of probing one target.
#[derive(Debug, Clone)]
pub struct SiteProbe {
    pub target: String,
    /// 0 when the HTTPS GET failed.
    pub http_status: u16,
    pub state: String,
    pub domains: Vec<String>,
    /// Issuer common name of the presented leaf.
    pub issuer: String,
    pub not_before: String,
    pub not_after: String,
    pub days_remaining: i64,
    pub cert_ok: bool,
    pub cert_note: String,
}

/// Split `host[:port]`, defaulting to 443. IPv6 literals may be
/// bracketed.
pub fn split_host_port(target: &str) -> (String, u16) {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, port_part)) = rest.split_once(']') {
            let port = port_part
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(443);
            return (host.to_string(), port);
        }
    }
    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (target.to_string(), 443),
        },
        _ => (target.to_string(), 443),
    }
}

/// TLS-dial the target, record HTTPS liveness, and inspect the leaf
/// certificate.
pub async fn check_site(target: &str) -> Result<SiteProbe> {
    let (host, port) = split_host_port(target);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Other(format!("TLS config: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = tokio::time::timeout(
        Duration::from_secs(10),
        tokio::net::TcpStream::connect((host.as_str(), port)),
    )
    .await
    .map_err(|_| Error::Timeout(format!("connect {host}:{port}")))?
    .map_err(|e| Error::Other(format!("{target} is not reachable: {e}")))?;

    let server_name = ServerName::try_from(host.clone())
        .map_err(|_| Error::Other(format!("invalid host name: {host}")))?;
    let tls = tokio::time::timeout(Duration::from_secs(10), connector.connect(server_name, tcp))
        .await
        .map_err(|_| Error::Timeout(format!("TLS handshake with {host}:{port}")))?
        .map_err(|e| Error::Other(format!("{target} does not speak TLS: {e}")))?;

    let leaf_der = {
        let (_, conn) = tls.get_ref();
        conn.peer_certificates()
            .and_then(|certs| certs.first())
            .map(|c| c.as_ref().to_vec())
            .ok_or_else(|| Error::Other(format!("{target} presented no certificate")))?
    };
    drop(tls);

    // Liveness is separate from the certificate inspection.
    let http_status = http_get_status(&host, port).await;

    let info = parse_cert_der(&leaf_der)?;
    let now = chrono::Local::now();
    let (cert_ok, cert_note) = if now < info.not_before {
        (false, "尚未生效")
    } else if now > info.not_after {
        (false, "已过期")
    } else {
        (true, "有效")
    };

    Ok(SiteProbe {
        target: target.to_string(),
        http_status,
        state: if http_status != 0 { "正常".into() } else { "异常".into() },
        domains: info.domains.clone(),
        issuer: info.issuer_cn.clone(),
        not_before: info.not_before.format(TIME_FORMAT).to_string(),
        not_after: info.not_after.format(TIME_FORMAT).to_string(),
        days_remaining: info.days_remaining(),
        cert_ok,
        cert_note: cert_note.to_string(),
    })
}

async fn http_get_status(host: &str, port: u16) -> u16 {
    let url = format!("https://{host}:{port}");
    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(_) => return 0,
    };
    match client.get(&url).send().await {
        Ok(resp) => resp.status().as_u16(),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "HTTPS GET failed during probe");
            0
        }
    }
}

/// Accept-everything verifier: the probe reports on whatever certificate
/// the peer presents, trusted or not.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_split_defaults_to_443() {
        assert_eq!(split_host_port("example.com"), ("example.com".into(), 443));
        assert_eq!(split_host_port("example.com:8443"), ("example.com".into(), 8443));
        assert_eq!(split_host_port("[::1]:9443"), ("::1".into(), 9443));
        assert_eq!(split_host_port("[::1]"), ("::1".into(), 443));
        // A bad port is treated as part of the name, keeping the default.
        assert_eq!(split_host_port("example.com:https"), ("example.com:https".into(), 443));
    }

    #[tokio::test]
    async fn unreachable_target_is_an_error() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let err = check_site("192.0.2.1:9").await.unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("not reachable") || msg.contains("connect"),
            "got: {msg}"
        );
    }
}
