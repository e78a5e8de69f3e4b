//! Notification channel CRUD and test sends.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_store::ReportRow;

use super::{ok, ApiResult, ListQuery, Paged};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReportBody {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<ReportRow>> {
    let (list, count) = state.store.list_reports(&query.search, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn add(State(state): State<AppState>, Json(body): Json<ReportBody>) -> ApiResult<i64> {
    let id = state.store.add_report(&body.name, &body.kind, &body.config)?;
    ok(id)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReportBody>,
) -> ApiResult<()> {
    state.store.update_report(&id, &body.name, &body.config)?;
    ok(())
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_report(&id)?;
    ok(())
}

pub async fn test(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    cf_notify::notify_test(&state.store, &id).await?;
    ok(())
}
