//! `apply` node: obtain (or reuse) a certificate via ACME.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use cf_acme::ApplyRequest;
use cf_domain::error::Result;
use cf_store::Store;

use crate::registry::{NodeEnv, NodeExecutor};

pub struct ApplyExecutor {
    store: Arc<Store>,
}

impl ApplyExecutor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NodeExecutor for ApplyExecutor {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>> {
        env.log.info("============= applying certificate =============");
        let request = ApplyRequest::from_config(&env.config, &env.run_id)?;
        match cf_acme::apply(&self.store, &request, env.log.as_ref()).await {
            Ok(bundle) => {
                env.log.info("============= apply succeeded =============");
                Ok(Some(bundle))
            }
            Err(e) => {
                env.log.error(&e.to_string());
                env.log.info("============= apply failed =============");
                Err(e)
            }
        }
    }
}
