//! `upload` node: fetch a stored certificate by id, or validate and
//! store raw PEM from the node config.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cf_domain::error::{Error, Result};
use cf_domain::value::as_string_loose;
use cf_domain::RunLogger;
use cf_store::Store;

use crate::registry::{NodeEnv, NodeExecutor};

pub struct UploadExecutor {
    store: Arc<Store>,
}

impl UploadExecutor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn load(&self, env: &NodeEnv, log: &dyn RunLogger) -> Result<Value> {
        match env.config.get("cert_id").and_then(as_string_loose) {
            Some(cert_id) if !cert_id.is_empty() => {
                log.debug(&format!("loading stored certificate {cert_id}"));
                let bundle = cf_certs::get_cert(&self.store, &cert_id)?;
                Ok(json!({ "cert": bundle.cert, "key": bundle.key, "domains": bundle.domains }))
            }
            _ => {
                let key = env
                    .config
                    .get("key")
                    .and_then(as_string_loose)
                    .ok_or_else(|| Error::Validation("upload node is missing key".into()))?;
                let cert = env
                    .config
                    .get("cert")
                    .and_then(as_string_loose)
                    .ok_or_else(|| Error::Validation("upload node is missing cert".into()))?;
                cf_certs::upload_cert(&self.store, &key, &cert)?;
                Ok(json!({ "cert": cert, "key": key }))
            }
        }
    }
}

#[async_trait]
impl NodeExecutor for UploadExecutor {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>> {
        env.log.info("============= loading certificate =============");
        match self.load(&env, env.log.as_ref()) {
            Ok(bundle) => {
                env.log.info("============= certificate loaded =============");
                Ok(Some(bundle))
            }
            Err(e) => {
                env.log.error(&e.to_string());
                env.log.info("============= certificate load failed =============");
                Err(e)
            }
        }
    }
}
