//! Certificate listing, upload, and deletion.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_store::CertRow;

use super::{ok, ApiResult, ListQuery, Paged};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Paged<CertRow>> {
    let (mut list, count) = state.store.list_certs(&query.search, query.p, query.limit)?;
    // The stored end_day is a snapshot from save time; the listing shows
    // current days-to-expiry.
    for row in &mut list {
        if let Some(days) = days_remaining(row.end_time.as_deref()) {
            row.end_day = Some(days);
        }
    }
    ok(Paged { list, count })
}

fn days_remaining(end_time: Option<&str>) -> Option<i64> {
    let end = chrono::NaiveDateTime::parse_from_str(end_time?, cf_domain::TIME_FORMAT).ok()?;
    let end = chrono::TimeZone::from_local_datetime(&chrono::Local, &end).single()?;
    Some((end.timestamp() - chrono::Local::now().timestamp()) / 86_400)
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<CertRow> {
    let row = state
        .store
        .get_cert(&id)?
        .ok_or_else(|| Error::NotFound(format!("certificate {id}")))?;
    ok(row)
}

#[derive(Deserialize)]
pub struct UploadBody {
    pub cert: String,
    pub key: String,
}

pub async fn upload(
    State(state): State<AppState>,
    Json(body): Json<UploadBody>,
) -> ApiResult<String> {
    let sha = cf_certs::upload_cert(&state.store, &body.key, &body.cert)?;
    ok(sha)
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.store.delete_cert(&id)?;
    ok(())
}
