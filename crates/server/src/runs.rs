//! Run launching shared by the scheduler and the manual-execute API.

use std::sync::Arc;

use cf_domain::error::{Error, Result};
use cf_engine::{ExecutionContext, RunLog};

use crate::state::AppState;

/// Start a run for a workflow. The single-running-run guard lives in
/// `begin_run`, which checks and inserts in one transaction, so racing
/// launchers (scheduler tick vs. manual execute) start at most one run.
/// Returns the run id and a handle on the run task.
pub fn start_run(
    state: &AppState,
    workflow_id: &str,
    exec_type: &str,
) -> Result<(String, tokio::task::JoinHandle<()>)> {
    let workflow = state
        .store
        .get_workflow(workflow_id)?
        .ok_or_else(|| Error::NotFound(format!("workflow {workflow_id}")))?;

    let run_id = state
        .store
        .begin_run(workflow_id, exec_type)?
        .ok_or_else(|| Error::Other("workflow is already running".into()))?;
    let handle = tokio::spawn(execute(
        state.clone(),
        workflow_id.to_string(),
        run_id.clone(),
        workflow.content,
    ));
    Ok((run_id, handle))
}

async fn execute(state: AppState, workflow_id: String, run_id: String, content: String) {
    let log: Arc<dyn cf_domain::RunLogger> = match RunLog::open(&state.logs_dir(), &run_id) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::warn!(run_id = %run_id, error = %e, "run log unavailable, continuing without");
            Arc::new(cf_domain::NoopLogger)
        }
    };
    let ctx = Arc::new(ExecutionContext::new(&run_id, log));

    let result = state.engine.run(&content, ctx).await;
    let status = match &result {
        Ok(()) => "success",
        Err(e) => {
            tracing::warn!(run_id = %run_id, workflow_id = %workflow_id, error = %e, "run failed");
            "fail"
        }
    };
    if let Err(e) = state.store.set_run_status(&workflow_id, &run_id, status) {
        tracing::error!(run_id = %run_id, error = %e, "failed to record run status");
    }
}

/// Mark a run failed. In-flight work is not preempted; it finishes on its
/// own I/O timeouts.
pub fn stop_run(state: &AppState, run_id: &str) -> Result<()> {
    state.store.stop_run(run_id)
}
