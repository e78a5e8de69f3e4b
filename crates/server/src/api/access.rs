//! Access (stored credential) CRUD and connectivity tests.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_store::AccessRow;

use super::{ok, ApiResult, Paged};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AccessListQuery {
    #[serde(default = "default_page")]
    pub p: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub search: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    10
}

#[derive(Deserialize)]
pub struct AccessBody {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AccessListQuery>,
) -> ApiResult<Paged<AccessRow>> {
    let (list, count) = state
        .store
        .list_access(&query.search, &query.kind, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn add(State(state): State<AppState>, Json(body): Json<AccessBody>) -> ApiResult<i64> {
    validate_config(&body.config)?;
    let id = state.store.add_access(&body.name, &body.kind, &body.config)?;
    ok(id)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AccessBody>,
) -> ApiResult<()> {
    validate_config(&body.config)?;
    state.store.update_access(&id, &body.name, &body.config)?;
    ok(())
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_access(&id)?;
    ok(())
}

/// Connectivity test for access kinds with a cheap probe endpoint.
pub async fn test(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let row = state.store.get_access(&id)?;
    match row.kind.as_str() {
        "ssh" => cf_deploy::ssh_test(&state.store, &id).await?,
        "btpanel" => cf_deploy::btpanel_test(&state.store, &id).await?,
        "1panel" => cf_deploy::onepanel_test(&state.store, &id).await?,
        "safeline" => cf_deploy::safeline_test(&state.store, &id).await?,
        other => {
            return Err(super::ApiError(Error::Config(format!(
                "no connectivity test for access type {other}"
            ))))
        }
    }
    ok(())
}

fn validate_config(config: &str) -> Result<(), Error> {
    match serde_json::from_str::<serde_json::Value>(config) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        _ => Err(Error::Config("access config must be a JSON object".into())),
    }
}
