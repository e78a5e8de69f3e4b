//! `notify` node: route a message through a stored channel, honoring
//! upstream skip propagation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cf_domain::error::{Error, Result};
use cf_domain::value::{as_bool_loose, as_string_loose};
use cf_notify::NotifyParams;
use cf_store::Store;

use crate::registry::{NodeEnv, NodeExecutor};

pub struct NotifyExecutor {
    store: Arc<Store>,
}

impl NotifyExecutor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NodeExecutor for NotifyExecutor {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>> {
        env.log.info("============= sending notification =============");

        // When the upstream node skipped its work and this node opted in,
        // stay silent.
        let upstream_skipped = env
            .from_node_data
            .as_ref()
            .and_then(|v| v.get("skip"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if upstream_skipped {
            let node_skip = env.config.get("skip").map(as_bool_loose).unwrap_or(false);
            if node_skip {
                env.log.debug("upstream node skipped its work, skipping notification");
                env.log.info("============= notification done =============");
                return Ok(Some(json!({ "skip": true })));
            }
        }

        let required = |key: &str| -> Result<String> {
            env.config
                .get(key)
                .and_then(as_string_loose)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Notify(format!("notify node is missing {key}")))
        };

        // Template variables: the node config plus non-PEM facts from the
        // resolved certificate input (so `__domains__` works out of the
        // box). Key material never reaches templates.
        let mut vars = env.config.clone();
        for source in [&env.certificate, &env.from_node_data] {
            if let Some(Value::Object(obj)) = source {
                for (k, v) in obj {
                    if matches!(k.as_str(), "key" | "cert" | "issuerCert") {
                        continue;
                    }
                    vars.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        vars.remove("key");

        let params = NotifyParams {
            provider: required("provider")?,
            provider_id: required("provider_id")?,
            subject: cf_notify::replace_placeholders(&required("subject")?, &vars),
            body: cf_notify::replace_placeholders(&required("body")?, &vars),
            extra: vars,
        };
        env.log.debug(&format!("sending notification: {}", params.subject));

        match cf_notify::notify(&self.store, &params).await {
            Ok(()) => {
                env.log.info("============= notification sent =============");
                Ok(Some(Value::String(format!("notified: {}", params.subject))))
            }
            Err(e) => {
                env.log.error(&e.to_string());
                env.log.info("============= notification failed =============");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::NoopLogger;
    use serde_json::json;

    fn env_with(config: serde_json::Value, from_node_data: Option<Value>) -> NodeEnv {
        NodeEnv {
            run_id: "run".into(),
            node_id: "notify-1".into(),
            config: config.as_object().cloned().unwrap_or_default(),
            certificate: None,
            from_node_data,
            log: Arc::new(NoopLogger),
        }
    }

    #[tokio::test]
    async fn upstream_skip_plus_node_flag_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(cf_store::Store::open(dir.path().join("data")).unwrap());
        let exec = NotifyExecutor::new(store);

        // No provider/subject configured at all: the skip gate must fire
        // before config validation, matching the silent no-op contract.
        let env = env_with(json!({ "skip": 1 }), Some(json!({ "skip": true })));
        let out = exec.execute(env).await.unwrap().unwrap();
        assert_eq!(out["skip"], true);
    }

    #[tokio::test]
    async fn upstream_skip_without_node_flag_still_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(cf_store::Store::open(dir.path().join("data")).unwrap());
        let exec = NotifyExecutor::new(store);

        let env = env_with(json!({}), Some(json!({ "skip": true })));
        let err = exec.execute(env).await.unwrap_err();
        assert!(
            err.to_string().contains("provider"),
            "without the node flag the send path runs (and trips config validation): {err}"
        );
    }
}
