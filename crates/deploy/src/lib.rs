//! Certificate deployment to target systems.
//!
//! A `deploy` node names a target kind (`provider`) and a stored
//! credential (`provider_id`); the dispatcher routes to the matching
//! adapter. Adapters receive the node config verbatim; provider-specific
//! keys are opaque to the engine.

use std::path::PathBuf;

use serde_json::{Map, Value};

use cf_domain::error::{Error, Result};
use cf_domain::value::as_string_loose;
use cf_domain::RunLogger;
use cf_plugin::PluginHost;
use cf_store::Store;

mod aliyun;
mod btpanel;
mod doge;
mod localhost;
mod onepanel;
mod plugin;
mod qiniu;
mod safeline;
mod ssh;
mod tencentcloud;

pub use btpanel::api_test as btpanel_test;
pub use onepanel::api_test as onepanel_test;
pub use safeline::api_test as safeline_test;
pub use ssh::test_connection as ssh_test;

/// The certificate material handed to an adapter.
#[derive(Debug, Clone)]
pub struct CertPair {
    pub cert: String,
    pub key: String,
}

impl CertPair {
    /// Extract the bundle from a node's resolved `certificate` input.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Deploy("no certificate available to deploy".into()))?;
        let cert = obj
            .get("cert")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Deploy("certificate bundle is missing cert".into()))?;
        let key = obj
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Deploy("certificate bundle is missing key".into()))?;
        Ok(Self {
            cert: cert.to_string(),
            key: key.to_string(),
        })
    }
}

/// Everything an adapter may need.
pub struct DeployTarget<'a> {
    pub store: &'a Store,
    pub plugins: &'a PluginHost,
    pub plugin_dir: PathBuf,
    pub config: &'a Map<String, Value>,
    pub cert: &'a CertPair,
    pub log: &'a dyn RunLogger,
}

/// Route a deploy to its target adapter.
pub async fn deploy(target: &DeployTarget<'_>) -> Result<()> {
    let provider = node_str(target.config, "provider")?;
    target.log.debug(&format!("deploying via {provider}"));
    match provider.as_str() {
        "ssh" => ssh::deploy(target).await,
        "localhost" => localhost::deploy(target).await,
        "btpanel" => btpanel::deploy_panel(target).await,
        "btpanel-site" => btpanel::deploy_site(target).await,
        "1panel" => onepanel::deploy_panel(target).await,
        "1panel-site" => onepanel::deploy_site(target).await,
        "safeline-panel" => safeline::deploy_panel(target).await,
        "safeline-site" => safeline::deploy_site(target).await,
        "tencentcloud-cdn" => tencentcloud::deploy(target, "cdn").await,
        "tencentcloud-cos" => tencentcloud::deploy(target, "cos").await,
        "tencentcloud-waf" => tencentcloud::deploy(target, "waf").await,
        "tencentcloud-teo" => tencentcloud::deploy(target, "teo").await,
        "aliyun-cdn" => aliyun::deploy_cdn(target).await,
        "qiniu-cdn" => qiniu::deploy_cdn(target).await,
        "doge-cdn" => doge::deploy_cdn(target).await,
        "plugin" => plugin::deploy(target).await,
        other => Err(Error::Deploy(format!("unsupported deploy target: {other}"))),
    }
}

// ── shared adapter helpers ──────────────────────────────────────────

/// Required node-config string with loose coercion.
pub(crate) fn node_str(config: &Map<String, Value>, key: &str) -> Result<String> {
    config
        .get(key)
        .and_then(as_string_loose)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Deploy(format!("deploy node is missing {key}")))
}

pub(crate) fn node_str_opt(config: &Map<String, Value>, key: &str) -> String {
    config.get(key).and_then(as_string_loose).unwrap_or_default()
}

/// Credentials of the Access row the node references.
pub(crate) fn access_creds(store: &Store, config: &Map<String, Value>) -> Result<Map<String, Value>> {
    let provider_id = node_str(config, "provider_id")?;
    store.access_config(&provider_id)
}

pub(crate) fn cred<'a>(creds: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    creds
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Deploy(format!("access credentials are missing {key}")))
}

/// `scheme://host[:port]/` of a stored panel URL.
pub(crate) fn base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw).map_err(|e| Error::Deploy(format!("panel url: {e}")))?;
    Ok(format!("{}/", &parsed[..url::Position::BeforePath]))
}

/// Panel-style HTTP client, optionally skipping TLS verification for
/// self-signed panel certs.
pub(crate) fn http_client(ignore_ssl: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(ignore_ssl)
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

pub(crate) fn ignore_ssl(creds: &Map<String, Value>) -> bool {
    creds
        .get("ignore_ssl")
        .map(cf_domain::value::as_bool_loose)
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn target_fixture(
        config_json: &str,
    ) -> (tempfile::TempDir, Store, PluginHost, Map<String, Value>, CertPair) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).unwrap();
        let config: Map<String, Value> = serde_json::from_str(config_json).unwrap();
        let cert = CertPair {
            cert: "CERT".into(),
            key: "KEY".into(),
        };
        (dir, store, PluginHost::new(), config, cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::NoopLogger;

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let (_dir, store, plugins, config, cert) =
            testutil::target_fixture(r#"{"provider":"smoke-signals","provider_id":"1"}"#);
        let target = DeployTarget {
            store: &store,
            plugins: &plugins,
            plugin_dir: PathBuf::from("plugins"),
            config: &config,
            cert: &cert,
            log: &NoopLogger,
        };
        let err = deploy(&target).await.unwrap_err();
        assert!(err.to_string().contains("unsupported deploy target"));
    }

    #[test]
    fn cert_pair_extraction_validates_shape() {
        let value = serde_json::json!({"cert": "C", "key": "K"});
        let pair = CertPair::from_value(&value).unwrap();
        assert_eq!(pair.cert, "C");

        assert!(CertPair::from_value(&serde_json::json!({"cert": "C"})).is_err());
        assert!(CertPair::from_value(&serde_json::json!("nope")).is_err());
    }

    #[test]
    fn base_url_strips_path() {
        assert_eq!(base_url("https://panel.example.com:8888/login").unwrap(), "https://panel.example.com:8888/");
        assert!(base_url("definitely not a url").is_err());
    }
}
