//! The recursive tree walker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use cf_domain::error::{Error, Result};
use cf_domain::value::as_string_loose;
use cf_domain::workflow::{kind, NodeStatus, WorkflowNode};

use crate::context::ExecutionContext;
use crate::registry::{ExecutorRegistry, NodeEnv};

type BoxedRun = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Walks one run's node tree against an executor registry.
pub struct Engine {
    registry: Arc<ExecutorRegistry>,
}

impl Engine {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a workflow `content` document under the given context.
    pub async fn run(self: &Arc<Self>, content: &str, ctx: Arc<ExecutionContext>) -> Result<()> {
        let root = WorkflowNode::from_content(content)?;
        let log = ctx.log();
        log.info("============= run started =============");
        match run_node(self.clone(), root, ctx, None, None).await {
            Ok(()) => {
                log.info("============= run finished =============");
                Ok(())
            }
            Err(e) => {
                log.error(&e.to_string());
                log.info("============= run failed =============");
                Err(e)
            }
        }
    }
}

/// Execute one node and its downstream structure.
///
/// `own_fnd` is this node's upstream output (its `fromNodeData`);
/// `child_preset` is a value already destined for this node's linear
/// child, which takes precedence over this node's own output. Branch
/// fan-out and condition routing set both: their entries execute with
/// the propagated value AND forward it past any wrapper entry whose own
/// output is empty.
fn run_node(
    engine: Arc<Engine>,
    mut node: WorkflowNode,
    ctx: Arc<ExecutionContext>,
    own_fnd: Option<Value>,
    child_preset: Option<Value>,
) -> BoxedRun {
    Box::pin(async move {
        // Resolve declared inputs against upstream outputs. The only
        // payload that flows between nodes is the certificate bundle.
        let mut certificate = None;
        for input in &node.inputs {
            if input.from_node_id.is_empty() {
                continue;
            }
            if let Some(value) = ctx.get_output(&input.from_node_id) {
                certificate = Some(value);
            }
        }

        let env = NodeEnv {
            run_id: ctx.run_id().to_string(),
            node_id: node.id.clone(),
            config: node.config.clone(),
            certificate,
            from_node_data: own_fnd.clone(),
            log: ctx.log(),
        };
        let result = match engine.registry.get(&node.kind) {
            Some(executor) => executor.execute(env).await,
            // Unknown kinds (and the structural branch kinds) are
            // successful no-ops.
            None => Ok(None),
        };

        let (output, status) = match result {
            Ok(output) => (output, NodeStatus::Success),
            Err(err) => {
                // The error is swallowed only when the immediate child
                // routes on execution results.
                let routed = node
                    .child
                    .as_ref()
                    .map(|c| c.kind == kind::EXECUTE_RESULT_BRANCH)
                    .unwrap_or(false);
                if !routed {
                    return Err(err);
                }
                ctx.log().error(&err.to_string());
                (None, NodeStatus::Fail)
            }
        };
        ctx.set_output(&node.id, output.clone(), status);

        // Parallel fan-out: all children run concurrently; the first
        // error wins after every child has finished. Each child executes
        // with this node's fromNodeData and forwards it down its lane.
        if node.kind == kind::BRANCH && !node.condition_nodes.is_empty() {
            let mut join = JoinSet::new();
            for branch in node.condition_nodes.drain(..) {
                join.spawn(run_node(
                    engine.clone(),
                    branch,
                    ctx.clone(),
                    own_fnd.clone(),
                    own_fnd.clone(),
                ));
            }
            let mut first_err: Option<Error> = None;
            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                    Err(e) => {
                        if first_err.is_none() {
                            first_err = Some(Error::Other(format!("branch task panicked: {e}")));
                        }
                    }
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
        }

        // Condition routing: execute the entries whose `type` matches the
        // referenced node's status. Each matching entry executes with the
        // referenced node's output as its fromNodeData and forwards it
        // down its lane.
        if node.kind == kind::EXECUTE_RESULT_BRANCH && !node.condition_nodes.is_empty() {
            let from_id = node
                .config
                .get("fromNodeId")
                .and_then(|v| as_string_loose(v))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::Config(format!("condition node {} has no fromNodeId", node.id))
                })?;
            let last_status = ctx.get_status(&from_id);
            let from_data = ctx.get_output(&from_id);
            for branch in node.condition_nodes.drain(..) {
                let wanted = branch.config.get("type").and_then(|v| as_string_loose(v));
                let matches = match (&wanted, &last_status) {
                    (Some(w), Some(s)) => w == s.as_str(),
                    _ => false,
                };
                if matches {
                    run_node(
                        engine.clone(),
                        branch,
                        ctx.clone(),
                        from_data.clone(),
                        from_data.clone(),
                    )
                    .await
                    .map_err(|e| Error::Other(format!("condition branch failed: {e}")))?;
                }
            }
        }

        // Linear successor. A pre-seeded value wins over this node's own
        // output.
        if let Some(child) = node.child.take() {
            let child_fnd = match child_preset {
                Some(preset) => Some(preset),
                None => output,
            };
            return run_node(engine, *child, ctx, child_fnd, None).await;
        }
        Ok(())
    })
}
