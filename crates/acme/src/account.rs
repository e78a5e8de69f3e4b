//! ACME account resolution and registration.

use base64::Engine;
use instant_acme::{Account, AccountCredentials, ExternalAccountKey, NewAccount};

use cf_domain::error::{Error, Result};
use cf_domain::RunLogger;
use cf_store::Store;

/// Stored spelling of the default CA tag.
pub const LETS_ENCRYPT: &str = "Let's Encrypt";

const ZEROSSL_EAB_URL: &str = "https://api.zerossl.com/acme/eab-credentials-email";

#[derive(Debug, Clone)]
pub struct EabCredentials {
    pub kid: String,
    pub hmac_encoded: String,
}

/// Directory URL per CA tag; `sslcom` splits by key family.
pub fn directory_url(ca: &str, algorithm_is_ec: bool) -> Option<&'static str> {
    match ca {
        LETS_ENCRYPT | "letsencrypt" => Some("https://acme-v02.api.letsencrypt.org/directory"),
        "zerossl" => Some("https://acme.zerossl.com/v2/DV90"),
        "google" => Some("https://dv.acme-v02.api.pki.goog/directory"),
        "sslcom" => Some(if algorithm_is_ec {
            "https://acme.ssl.com/sslcom-dv-ecc"
        } else {
            "https://acme.ssl.com/sslcom-dv-rsa"
        }),
        "buypass" => Some("https://api.buypass.com/acme/directory"),
        _ => None,
    }
}

/// Canonicalize the `(ca, eabId)` pair from an apply node into the stored
/// CA tag plus any EAB credentials the id references.
pub fn resolve_ca(store: &Store, ca: &str, eab_id: &str) -> Result<(String, Option<EabCredentials>)> {
    match eab_id {
        "" => {
            let ca = if ca.is_empty() || ca == "letsencrypt" {
                LETS_ENCRYPT.to_string()
            } else {
                ca.to_string()
            };
            Ok((ca, None))
        }
        "let" => Ok((LETS_ENCRYPT.to_string(), None)),
        "buy" | "buypass" => Ok(("buypass".to_string(), None)),
        id => {
            let row = store
                .get_eab(id)?
                .ok_or_else(|| Error::Config(format!("EAB credentials {id} not found")))?;
            if row.kid.is_empty() || row.hmac_encoded.is_empty() {
                return Err(Error::Config(format!("EAB credentials {id} are incomplete")));
            }
            Ok((
                row.ca.clone(),
                Some(EabCredentials {
                    kid: row.kid,
                    hmac_encoded: row.hmac_encoded,
                }),
            ))
        }
    }
}

/// Load the account for `(email, ca)`, registering a new one when
/// permitted. Newly registered credentials are persisted.
pub async fn resolve_account(
    store: &Store,
    email: &str,
    ca: &str,
    algorithm_is_ec: bool,
    mut eab: Option<EabCredentials>,
    http: &reqwest::Client,
    log: &dyn RunLogger,
) -> Result<Account> {
    let row = store.get_account(email, ca)?;

    // The self-service CAs may register on the fly; everything else needs
    // a pre-created account row.
    let self_service = matches!(ca, LETS_ENCRYPT | "zerossl" | "buypass");
    if row.is_none() && !self_service {
        return Err(Error::Config(format!(
            "no {ca} account for {email}; add one under account management"
        )));
    }

    let dir_url = match directory_url(ca, algorithm_is_ec) {
        Some(url) => url.to_string(),
        None => row
            .as_ref()
            .and_then(|r| r.ca_dir_url.clone())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("no directory URL for CA {ca}; check the {email} account"))
            })?,
    };

    if let Some(creds_json) = row.as_ref().and_then(|r| r.credentials.clone()) {
        if !creds_json.is_empty() {
            log.debug("loaded stored ACME account credentials");
            let creds: AccountCredentials = serde_json::from_str(&creds_json)
                .map_err(|e| Error::Acme(format!("stored account credentials: {e}")))?;
            return Account::builder()
                .map_err(|e| Error::Acme(format!("account builder: {e}")))?
                .from_credentials(creds)
                .await
                .map_err(|e| Error::Acme(format!("account restore: {e}")));
        }
    }

    // Registration path. EAB resolution order: explicit node eabId, the
    // account row's own kid/hmac, then the CA's discovery endpoint.
    if eab.is_none() {
        if let Some(row) = &row {
            if let (Some(kid), Some(hmac)) = (row.kid.clone(), row.hmac_encoded.clone()) {
                if !kid.is_empty() && !hmac.is_empty() {
                    eab = Some(EabCredentials { kid, hmac_encoded: hmac });
                }
            }
        }
    }
    if eab.is_none() {
        match ca {
            "zerossl" => {
                log.debug("fetching ZeroSSL EAB credentials");
                eab = Some(fetch_zerossl_eab(email, http).await?);
            }
            "sslcom" | "google" => {
                return Err(Error::Config(format!(
                    "{ca} requires EAB credentials; add a {ca} account under account management"
                )));
            }
            _ => {}
        }
    }

    let eab_key = match &eab {
        Some(creds) => Some(decode_eab(creds)?),
        None => None,
    };

    log.debug(&format!("registering ACME account for {email}"));
    let contact = format!("mailto:{email}");
    let new_account = NewAccount {
        contact: &[contact.as_str()],
        terms_of_service_agreed: true,
        only_return_existing: false,
    };
    let (account, credentials) = Account::builder()
        .map_err(|e| Error::Acme(format!("account builder: {e}")))?
        .create(&new_account, dir_url, eab_key.as_ref())
        .await
        .map_err(|e| Error::Acme(format!("account registration: {e}")))?;

    let serialized = serde_json::to_string(&credentials)?;
    if let Err(e) = store.save_account_credentials(email, ca, &serialized) {
        log.debug(&format!("account registered but not persisted: {e}"));
    } else {
        log.debug("account registered and saved");
    }
    Ok(account)
}

fn decode_eab(creds: &EabCredentials) -> Result<ExternalAccountKey> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let key = engine
        .decode(creds.hmac_encoded.trim_end_matches('='))
        .map_err(|e| Error::Config(format!("EAB hmac is not base64url: {e}")))?;
    Ok(ExternalAccountKey::new(creds.kid.clone(), &key))
}

/// ZeroSSL hands out EAB credentials keyed by email.
async fn fetch_zerossl_eab(email: &str, http: &reqwest::Client) -> Result<EabCredentials> {
    let resp = http
        .post(ZEROSSL_EAB_URL)
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .map_err(|e| Error::Acme(format!("ZeroSSL EAB request: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::Acme(format!(
            "ZeroSSL EAB request returned status {}",
            resp.status().as_u16()
        )));
    }
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| Error::Acme(format!("ZeroSSL EAB response: {e}")))?;
    let kid = body.get("eab_kid").and_then(|v| v.as_str()).unwrap_or("");
    let hmac = body.get("eab_hmac_key").and_then(|v| v.as_str()).unwrap_or("");
    if kid.is_empty() || hmac.is_empty() {
        return Err(Error::Acme("ZeroSSL EAB response is missing kid or hmac".into()));
    }
    Ok(EabCredentials {
        kid: kid.to_string(),
        hmac_encoded: hmac.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    #[test]
    fn directory_urls_cover_known_cas() {
        assert!(directory_url(LETS_ENCRYPT, false).unwrap().contains("letsencrypt"));
        assert!(directory_url("sslcom", false).unwrap().ends_with("-rsa"));
        assert!(directory_url("sslcom", true).unwrap().ends_with("-ecc"));
        assert!(directory_url("my-private-ca", false).is_none());
    }

    #[test]
    fn ca_resolution_canonicalizes_default() {
        let (_dir, store) = test_store();
        let (ca, eab) = resolve_ca(&store, "", "").unwrap();
        assert_eq!(ca, LETS_ENCRYPT);
        assert!(eab.is_none());

        let (ca, _) = resolve_ca(&store, "letsencrypt", "").unwrap();
        assert_eq!(ca, LETS_ENCRYPT);

        let (ca, _) = resolve_ca(&store, "ignored", "buy").unwrap();
        assert_eq!(ca, "buypass");
    }

    #[test]
    fn ca_resolution_loads_eab_rows() {
        let (_dir, store) = test_store();
        let id = store.add_eab("corp", "kid-1", "aGVsbG8", "sslcom", "a@b.c").unwrap();
        let (ca, eab) = resolve_ca(&store, "", &id.to_string()).unwrap();
        assert_eq!(ca, "sslcom");
        assert_eq!(eab.unwrap().kid, "kid-1");

        assert!(resolve_ca(&store, "", "404").is_err());
    }

    #[tokio::test]
    async fn unknown_ca_without_account_row_is_a_config_error() {
        let (_dir, store) = test_store();
        let err = match resolve_account(
            &store,
            "op@example.com",
            "sslcom",
            false,
            None,
            &reqwest::Client::new(),
            &cf_domain::NoopLogger,
        )
        .await
        {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("account management"), "got: {err}");
    }
}
