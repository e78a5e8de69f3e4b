//! Thin admin HTTP surface: CRUD over the stores plus run control. All
//! behavior lives in the subsystem crates; handlers translate between
//! HTTP and store calls.

mod access;
mod accounts;
mod certs;
mod monitors;
mod overview;
mod reports;
pub(crate) mod settings;
mod workflows;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};

use cf_domain::error::Error;

use crate::auth;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
pub struct ApiOk<T: Serialize> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

pub type ApiResult<T> = std::result::Result<Json<ApiOk<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiOk {
        code: 200,
        msg: "success".into(),
        data,
    }))
}

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Config(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "code": status.as_u16(),
            "msg": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Common pagination/search query.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub p: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub search: String,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    10
}

#[derive(Serialize)]
pub struct Paged<T: Serialize> {
    pub list: Vec<T>,
    pub count: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<serde_json::Value> {
    let username = state.store.setting_or("username", "admin");
    let stored = state
        .store
        .setting("password")?
        .ok_or_else(|| Error::Config("no admin password is set; set one from the CLI".into()))?;
    let salt = state.store.setting_or("salt", "");

    let candidate = auth::password_digest(&body.password, &salt);
    if body.username != username || !auth::digests_match(&candidate, &stored) {
        return Err(ApiError(Error::Config("invalid username or password".into())));
    }
    let token = state.sessions.create();
    ok(serde_json::json!({ "token": token }))
}

async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if !state.sessions.validate(token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "code": 401, "msg": "unauthorized" })),
        )
            .into_response();
    }
    next.run(request).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/workflows", get(workflows::list).post(workflows::add))
        .route("/workflows/:id", put(workflows::update).delete(workflows::remove))
        .route("/workflows/:id/execute", post(workflows::execute))
        .route("/workflows/:id/active", post(workflows::set_active))
        .route("/workflows/:id/history", get(workflows::history))
        .route("/runs/:run_id/stop", post(workflows::stop))
        .route("/runs/:run_id/log", get(workflows::run_log))
        .route("/certs", get(certs::list).post(certs::upload))
        .route("/certs/:id", get(certs::get_one).delete(certs::remove))
        .route("/access", get(access::list).post(access::add))
        .route("/access/:id", put(access::update).delete(access::remove))
        .route("/access/:id/test", post(access::test))
        .route("/accounts", get(accounts::list).post(accounts::add))
        .route("/accounts/:id", put(accounts::update).delete(accounts::remove))
        .route("/eab", get(accounts::list_eab).post(accounts::add_eab))
        .route("/eab/:id", put(accounts::update_eab).delete(accounts::remove_eab))
        .route("/reports", get(reports::list).post(reports::add))
        .route("/reports/:id", put(reports::update).delete(reports::remove))
        .route("/reports/:id/test", post(reports::test))
        .route("/monitors", get(monitors::list).post(monitors::add))
        .route("/monitors/:id", put(monitors::update).delete(monitors::remove))
        .route("/monitors/:id/active", post(monitors::set_active))
        .route("/settings", get(settings::list).put(settings::update))
        .route("/overview", get(overview::stats))
        .route("/plugins", get(overview::plugins))
        .route_layer(middleware::from_fn_with_state(state, require_session));

    Router::new().nest(
        "/api",
        Router::new().route("/login", post(login)).merge(protected),
    )
}
