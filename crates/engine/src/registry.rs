//! Node executor dispatch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use cf_domain::error::Result;
use cf_domain::workflow::kind;
use cf_domain::RunLogger;
use cf_plugin::PluginHost;
use cf_store::Store;

use crate::handlers;

/// Everything the engine injects into a node invocation, kept beside the
/// node's own free-form config rather than mixed into it.
pub struct NodeEnv {
    pub run_id: String,
    pub node_id: String,
    pub config: Map<String, Value>,
    /// Resolved upstream input; the only value that flows between nodes.
    pub certificate: Option<Value>,
    /// The upstream node's full output, for skip propagation.
    pub from_node_data: Option<Value>,
    pub log: Arc<dyn RunLogger>,
}

#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, env: NodeEnv) -> Result<Option<Value>>;
}

/// Fixed dispatch table from node kind to handler. Kinds without a
/// handler (including the structural branch kinds) execute as successful
/// no-ops, keeping newer graphs runnable.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production registry: apply, upload, deploy, notify.
    pub fn standard(store: Arc<Store>, plugins: Arc<PluginHost>, plugin_dir: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(kind::APPLY, Arc::new(handlers::ApplyExecutor::new(store.clone())));
        registry.register(kind::UPLOAD, Arc::new(handlers::UploadExecutor::new(store.clone())));
        registry.register(
            kind::DEPLOY,
            Arc::new(handlers::DeployExecutor::new(store.clone(), plugins, plugin_dir)),
        );
        registry.register(kind::NOTIFY, Arc::new(handlers::NotifyExecutor::new(store)));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(kind.into(), executor);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(kind).cloned()
    }
}
