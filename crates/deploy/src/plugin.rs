//! External plugin adapter: merges the stored plugin config with the
//! node's `params`, injects the key material, and invokes the plugin
//! host.

use serde_json::{Map, Value};

use cf_domain::error::{Error, Result};

use crate::{access_creds, node_str, DeployTarget};

pub(crate) async fn deploy(target: &DeployTarget<'_>) -> Result<()> {
    let action = node_str(target.config, "action")?;
    let creds = access_creds(target.store, target.config)?;

    let plugin_name = creds
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Deploy("plugin access has no plugin name".into()))?
        .to_string();

    // The stored access carries the plugin's base config, either inline
    // or as a JSON string.
    let mut params: Map<String, Value> = match creds.get("config") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| Error::Deploy(format!("plugin config: {e}")))?,
        None => Map::new(),
        Some(_) => return Err(Error::Deploy("plugin config has an invalid shape".into())),
    };

    // Node-level params override the stored config.
    let raw_params = node_str(target.config, "params")?;
    let node_params: Map<String, Value> = serde_json::from_str(&raw_params)
        .map_err(|e| Error::Deploy(format!("plugin params: {e}")))?;
    for (k, v) in node_params {
        params.insert(k, v);
    }

    params.insert("cert".into(), Value::String(target.cert.cert.clone()));
    params.insert("key".into(), Value::String(target.cert.key.clone()));

    target.log.debug(&format!("invoking plugin {plugin_name}:{action}"));
    target
        .plugins
        .call(&target.plugin_dir, &plugin_name, &action, params)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::target_fixture;
    use crate::DeployTarget;
    use cf_domain::NoopLogger;

    #[tokio::test]
    async fn missing_action_is_a_config_error() {
        let (_tmp, store, plugins, config, cert) =
            target_fixture(r#"{"provider":"plugin","provider_id":"1"}"#);
        let target = DeployTarget {
            store: &store,
            plugins: &plugins,
            plugin_dir: "plugins".into(),
            config: &config,
            cert: &cert,
            log: &NoopLogger,
        };
        let err = deploy(&target).await.unwrap_err();
        assert!(err.to_string().contains("action"), "got: {err}");
    }

    #[tokio::test]
    async fn merges_access_config_with_node_params() {
        let (_tmp, store, plugins, config, cert) = target_fixture(
            r#"{"provider":"plugin","provider_id":"1","action":"deploy",
                "params":"{\"region\":\"eu\"}"}"#,
        );
        store
            .add_access(
                "edge",
                "plugin",
                r#"{"name":"edge-pusher","config":{"region":"us","token":"t"}}"#,
            )
            .unwrap();
        let target = DeployTarget {
            store: &store,
            plugins: &plugins,
            plugin_dir: "plugins".into(),
            config: &config,
            cert: &cert,
            log: &NoopLogger,
        };
        // No plugin binary registered: the call itself fails, which is
        // fine; the config path up to the host call must succeed.
        let err = deploy(&target).await.unwrap_err();
        assert!(err.to_string().contains("edge-pusher"), "got: {err}");
    }
}
