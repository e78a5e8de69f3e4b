//! Key/certificate pair validation.
//!
//! The pair check signs a probe message with the private key and verifies
//! it against the certificate's public key, detecting RSA / ECDSA
//! (P-256, P-384) / Ed25519 from the key material itself.

use chrono::Local;
use p256::pkcs8::EncodePrivateKey;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, Ed25519KeyPair, RsaKeyPair, UnparsedPublicKey};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use cf_domain::error::{Error, Result};

use crate::parse::{decode_cert_der, parse_cert_der};

const PROBE_MESSAGE: &[u8] = b"test message";

enum ProbeKey {
    Rsa(RsaKeyPair),
    EcdsaP256(EcdsaKeyPair),
    EcdsaP384(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

/// Load a private key PEM, accepting PKCS#8 (`PRIVATE KEY`), PKCS#1
/// (`RSA PRIVATE KEY`), and SEC1 (`EC PRIVATE KEY`, P-256) encodings.
fn load_private_key(key_pem: &str) -> Result<ProbeKey> {
    let block =
        pem::parse(key_pem).map_err(|e| Error::Validation(format!("private key PEM: {e}")))?;
    let der = block.contents();
    let rng = SystemRandom::new();
    match block.tag() {
        "PRIVATE KEY" => {
            if let Ok(kp) = RsaKeyPair::from_pkcs8(der) {
                return Ok(ProbeKey::Rsa(kp));
            }
            if let Ok(kp) =
                EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng)
            {
                return Ok(ProbeKey::EcdsaP256(kp));
            }
            if let Ok(kp) =
                EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P384_SHA384_ASN1_SIGNING, der, &rng)
            {
                return Ok(ProbeKey::EcdsaP384(kp));
            }
            if let Ok(kp) = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der) {
                return Ok(ProbeKey::Ed25519(kp));
            }
            Err(Error::Validation("unrecognized PKCS#8 private key".into()))
        }
        "RSA PRIVATE KEY" => RsaKeyPair::from_der(der)
            .map(ProbeKey::Rsa)
            .map_err(|e| Error::Validation(format!("PKCS#1 RSA key: {e}"))),
        "EC PRIVATE KEY" => {
            let secret = p256::SecretKey::from_sec1_der(der)
                .map_err(|_| Error::Validation("unsupported EC key (only P-256 SEC1)".into()))?;
            let pkcs8 = secret
                .to_pkcs8_der()
                .map_err(|e| Error::Validation(format!("EC key re-encoding: {e}")))?;
            EcdsaKeyPair::from_pkcs8(
                &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                pkcs8.as_bytes(),
                &rng,
            )
            .map(ProbeKey::EcdsaP256)
            .map_err(|e| Error::Validation(format!("EC key: {e}")))
        }
        other => Err(Error::Validation(format!("unrecognized key PEM block: {other}"))),
    }
}

/// Validate that `cert_pem` parses, is within its validity window, and
/// matches `key_pem` via a test signature.
pub fn validate_certificate(cert_pem: &str, key_pem: &str) -> Result<()> {
    let der = decode_cert_der(cert_pem)?;
    let info = parse_cert_der(&der)?;

    let now = Local::now();
    if now < info.not_before {
        return Err(Error::Validation(format!(
            "certificate not yet valid (starts {})",
            info.start_time()
        )));
    }
    if now > info.not_after {
        return Err(Error::Validation(format!(
            "certificate expired (ended {})",
            info.end_time()
        )));
    }

    let key = load_private_key(key_pem)?;
    verify_pair(&der, &key)
}

fn verify_pair(cert_der: &[u8], key: &ProbeKey) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| Error::Validation(format!("certificate DER: {e}")))?;
    let spki = cert.public_key().subject_public_key.data.as_ref();
    let rng = SystemRandom::new();

    let (signature_bytes, verifier): (Vec<u8>, UnparsedPublicKey<&[u8]>) = match key {
        ProbeKey::Rsa(kp) => {
            let mut sig = vec![0u8; kp.public().modulus_len()];
            kp.sign(&signature::RSA_PKCS1_SHA256, &rng, PROBE_MESSAGE, &mut sig)
                .map_err(|_| Error::Validation("RSA test signature failed".into()))?;
            (
                sig,
                UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, spki),
            )
        }
        ProbeKey::EcdsaP256(kp) => {
            let sig = kp
                .sign(&rng, PROBE_MESSAGE)
                .map_err(|_| Error::Validation("ECDSA test signature failed".into()))?;
            (
                sig.as_ref().to_vec(),
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, spki),
            )
        }
        ProbeKey::EcdsaP384(kp) => {
            let sig = kp
                .sign(&rng, PROBE_MESSAGE)
                .map_err(|_| Error::Validation("ECDSA test signature failed".into()))?;
            (
                sig.as_ref().to_vec(),
                UnparsedPublicKey::new(&signature::ECDSA_P384_SHA384_ASN1, spki),
            )
        }
        ProbeKey::Ed25519(kp) => (
            kp.sign(PROBE_MESSAGE).as_ref().to_vec(),
            UnparsedPublicKey::new(&signature::ED25519, spki),
        ),
    };

    verifier
        .verify(PROBE_MESSAGE, &signature_bytes)
        .map_err(|_| Error::Validation("certificate and key do not match".into()))
}
