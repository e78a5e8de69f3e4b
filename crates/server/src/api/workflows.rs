//! Workflow CRUD, execution control, and run history.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_domain::workflow::WorkflowNode;
use cf_store::{HistoryRow, WorkflowRow};

use super::{ok, ApiResult, ListQuery, Paged};
use crate::runs;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WorkflowBody {
    pub name: String,
    pub content: String,
    #[serde(default = "default_exec_type")]
    pub exec_type: String,
    #[serde(default)]
    pub active: i64,
    #[serde(default)]
    pub exec_time: String,
}

fn default_exec_type() -> String {
    "manual".into()
}

fn validate_body(body: &WorkflowBody) -> Result<(), Error> {
    WorkflowNode::from_content(&body.content)
        .map_err(|e| Error::Config(format!("workflow content is invalid: {e}")))?;
    if body.exec_type == "auto" {
        cf_domain::workflow::ExecTime::parse(&body.exec_time)
            .map_err(|e| Error::Config(format!("exec_time is invalid: {e}")))?;
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<WorkflowRow>> {
    let (list, count) = state.store.list_workflows(&query.search, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<WorkflowBody>,
) -> ApiResult<i64> {
    validate_body(&body)?;
    let id = state.store.add_workflow(
        &body.name,
        &body.content,
        &body.exec_type,
        body.active,
        &body.exec_time,
    )?;
    ok(id)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WorkflowBody>,
) -> ApiResult<()> {
    validate_body(&body)?;
    state.store.update_workflow(
        &id,
        &body.name,
        &body.content,
        &body.exec_type,
        body.active,
        &body.exec_time,
    )?;
    ok(())
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_workflow(&id)?;
    state.store.clean_orphan_history(&state.logs_dir())?;
    ok(())
}

#[derive(Deserialize)]
pub struct ActiveBody {
    pub active: i64,
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ActiveBody>,
) -> ApiResult<()> {
    state.store.set_workflow_active(&id, body.active)?;
    ok(())
}

pub async fn execute(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    let (run_id, _handle) = runs::start_run(&state, &id, "manual")?;
    ok(run_id)
}

pub async fn stop(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<()> {
    runs::stop_run(&state, &run_id)?;
    ok(())
}

pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<HistoryRow>> {
    let (list, count) = state.store.list_history(&id, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn run_log(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<String> {
    let path = state.logs_dir().join(format!("{run_id}.log"));
    let content = std::fs::read_to_string(&path)
        .map_err(|_| Error::NotFound(format!("run log {run_id}")))?;
    ok(content)
}
