//! ACME account and EAB credential CRUD.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_store::{AccountRow, EabRow};

use super::{ok, ApiResult, ListQuery, Paged};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AccountBody {
    pub email: String,
    pub ca: String,
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub hmac_encoded: String,
    #[serde(default)]
    pub ca_dir_url: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<AccountRow>> {
    let (list, count) = state.store.list_accounts(&query.search, query.p, query.limit)?;
    ok(Paged { list, count })
}

pub async fn add(State(state): State<AppState>, Json(body): Json<AccountBody>) -> ApiResult<i64> {
    let id = state.store.add_account(
        &body.email,
        &canonical_ca(&body.ca),
        &body.kid,
        &body.hmac_encoded,
        &body.ca_dir_url,
    )?;
    ok(id)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AccountBody>,
) -> ApiResult<()> {
    state.store.update_account(
        &id,
        &body.email,
        &canonical_ca(&body.ca),
        &body.kid,
        &body.hmac_encoded,
        &body.ca_dir_url,
    )?;
    ok(())
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_account(&id)?;
    ok(())
}

fn canonical_ca(ca: &str) -> String {
    if ca == "letsencrypt" {
        cf_acme::account::LETS_ENCRYPT.to_string()
    } else {
        ca.to_string()
    }
}

// ── EAB credentials ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EabBody {
    #[serde(default)]
    pub name: String,
    pub kid: String,
    pub hmac_encoded: String,
    pub ca: String,
    #[serde(default)]
    pub mail: String,
}

#[derive(Deserialize)]
pub struct EabQuery {
    #[serde(default)]
    pub ca: String,
}

pub async fn list_eab(
    State(state): State<AppState>,
    Query(query): Query<EabQuery>,
) -> ApiResult<Vec<EabRow>> {
    ok(state.store.list_eab(&query.ca)?)
}

pub async fn add_eab(State(state): State<AppState>, Json(body): Json<EabBody>) -> ApiResult<i64> {
    let id = state
        .store
        .add_eab(&body.name, &body.kid, &body.hmac_encoded, &body.ca, &body.mail)?;
    ok(id)
}

pub async fn update_eab(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EabBody>,
) -> ApiResult<()> {
    state
        .store
        .update_eab(&id, &body.name, &body.kid, &body.hmac_encoded, &body.ca, &body.mail)?;
    ok(())
}

pub async fn remove_eab(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_eab(&id)?;
    ok(())
}
