//! Per-run execution context.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use cf_domain::workflow::NodeStatus;
use cf_domain::RunLogger;

/// Shared state of one run: node outputs, node statuses, the immutable
/// run id, and the run's log sink. Guarded for concurrent branch
/// fan-outs; `set_output` is the only mutator.
pub struct ExecutionContext {
    data: RwLock<HashMap<String, Value>>,
    status: RwLock<HashMap<String, NodeStatus>>,
    run_id: String,
    log: Arc<dyn RunLogger>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, log: Arc<dyn RunLogger>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            status: RwLock::new(HashMap::new()),
            run_id: run_id.into(),
            log,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log(&self) -> Arc<dyn RunLogger> {
        self.log.clone()
    }

    /// Record a node's output and terminal status.
    pub fn set_output(&self, node_id: &str, output: Option<Value>, status: NodeStatus) {
        if let Some(value) = output {
            self.data.write().insert(node_id.to_string(), value);
        }
        self.status.write().insert(node_id.to_string(), status);
    }

    pub fn get_output(&self, node_id: &str) -> Option<Value> {
        self.data.read().get(node_id).cloned()
    }

    pub fn get_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.status.read().get(node_id).cloned()
    }
}
