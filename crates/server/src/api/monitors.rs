//! Site monitor CRUD. Creation and edits probe the target immediately so
//! the row starts with fresh certificate metadata.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_store::MonitorRow;

use super::{ok, ApiResult, ListQuery, Paged};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MonitorBody {
    pub name: String,
    pub site_domain: String,
    #[serde(default)]
    pub report_type: String,
    #[serde(default = "default_cycle")]
    pub cycle: i64,
    #[serde(default = "default_gap")]
    pub repeat_send_gap: i64,
}

fn default_cycle() -> i64 {
    1
}
fn default_gap() -> i64 {
    10
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<MonitorRow>> {
    let (list, count) = state.store.list_monitors(&query.search, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn add(State(state): State<AppState>, Json(body): Json<MonitorBody>) -> ApiResult<i64> {
    let id = state.store.add_monitor(
        &body.name,
        &body.site_domain,
        &body.report_type,
        body.cycle,
        body.repeat_send_gap,
    )?;
    refresh(&state, id).await;
    ok(id)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MonitorBody>,
) -> ApiResult<()> {
    state.store.update_monitor(
        &id,
        &body.name,
        &body.site_domain,
        &body.report_type,
        body.cycle,
        body.repeat_send_gap,
    )?;
    if let Ok(parsed) = id.parse::<i64>() {
        refresh(&state, parsed).await;
    }
    ok(())
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_monitor(&id)?;
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
    state
        .store
        .get_monitor(&id)?
        .ok_or_else(|| Error::NotFound(format!("monitor {id}")))?;
    state.store.set_monitor_active(&id, body.active)?;
    ok(())
}

/// Fire-and-record probe; a failing first probe is not an API error.
async fn refresh(state: &AppState, id: i64) {
    let monitor = match state.store.get_monitor(&id.to_string()) {
        Ok(Some(row)) => row,
        _ => return,
    };
    if let Err(e) = cf_monitor::refresh_monitor(&state.store, &monitor).await {
        tracing::debug!(monitor_id = id, error = %e, "initial monitor probe failed");
    }
}
