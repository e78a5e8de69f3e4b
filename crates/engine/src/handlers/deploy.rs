//! `deploy` node: fingerprint-gated dispatch to a target adapter.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cf_deploy::{CertPair, DeployTarget};
use cf_domain::error::{Error, Result};
use cf_domain::value::as_bool_loose;
use cf_plugin::PluginHost;
use cf_store::Store;

use crate::registry::{NodeEnv, NodeExecutor};

pub struct DeployExecutor {
    store: Arc<Store>,
    plugins: Arc<PluginHost>,
    default_plugin_dir: PathBuf,
}

impl DeployExecutor {
    pub fn new(store: Arc<Store>, plugins: Arc<PluginHost>, default_plugin_dir: PathBuf) -> Self {
        Self {
            store,
            plugins,
            default_plugin_dir,
        }
    }
}

#[async_trait]
impl NodeExecutor for DeployExecutor {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>> {
        env.log.info("============= deploying certificate =============");

        let cert_value = env
            .certificate
            .clone()
            .ok_or_else(|| Error::Deploy("no certificate available to deploy".into()))?;
        let pair = CertPair::from_value(&cert_value)?;
        let sha256 = cf_certs::parse::cert_sha256(&pair.cert)?;

        let history = self
            .store
            .get_history(&env.run_id)?
            .ok_or_else(|| Error::Deploy(format!("run {} has no history row", env.run_id)))?;
        let workflow_id = history.workflow_id;

        // Skip when the same certificate already deployed successfully
        // from this node.
        let fingerprint = self.store.get_fingerprint(&workflow_id, &env.node_id)?;
        let skip_enabled = env.config.get("skip").map(as_bool_loose).unwrap_or(false);
        if skip_enabled {
            if let Some(fp) = &fingerprint {
                if fp.cert_hash == sha256 && fp.status == "success" {
                    env.log.info("certificate unchanged since the last successful deploy, skipping");
                    env.log.info("============= deploy succeeded =============");
                    return Ok(Some(json!({ "skip": true })));
                }
            }
        }

        let plugin_dir = PathBuf::from(
            self.store
                .setting_or("plugin_dir", &self.default_plugin_dir.to_string_lossy()),
        );
        let target = DeployTarget {
            store: &self.store,
            plugins: &self.plugins,
            plugin_dir,
            config: &env.config,
            cert: &pair,
            log: env.log.as_ref(),
        };
        let result = cf_deploy::deploy(&target).await;

        let status = if result.is_ok() { "success" } else { "fail" };
        self.store
            .upsert_fingerprint(&workflow_id, &env.node_id, &sha256, status)?;

        match result {
            Ok(()) => {
                env.log.info("============= deploy succeeded =============");
                Ok(None)
            }
            Err(e) => {
                env.log.error(&e.to_string());
                env.log.info("============= deploy failed =============");
                Err(e)
            }
        }
    }
}
