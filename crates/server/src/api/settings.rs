//! Runtime settings read/update. The password digest is written through
//! the same scheme the CLI uses; secrets never leave the store.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_store::settings::SettingRow;

use super::{ok, ApiResult};
use crate::auth::password_digest;
use crate::state::AppState;

const HIDDEN: &[&str] = &["password", "salt"];
const EDITABLE: &[&str] = &[
    "username",
    "password",
    "secure_entrance",
    "https",
    "port",
    "timeout",
    "plugin_dir",
    "workflow_log_path",
];

pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<SettingRow>> {
    let rows = state
        .store
        .settings_all()?
        .into_iter()
        .filter(|row| !HIDDEN.contains(&row.key.as_str()))
        .collect();
    ok(rows)
}

#[derive(Deserialize)]
pub struct UpdateBody {
    pub key: String,
    pub value: String,
}

pub async fn update(
    State(state): State<AppState>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<()> {
    if !EDITABLE.contains(&body.key.as_str()) {
        return Err(super::ApiError(Error::Config(format!(
            "setting {} is not editable",
            body.key
        ))));
    }
    match body.key.as_str() {
        "password" => {
            let salt = state.store.setting_or("salt", "");
            state
                .store
                .set_setting("password", &password_digest(&body.value, &salt))?;
        }
        "secure_entrance" => {
            validate_entrance(&body.value)?;
            state.store.set_setting("secure_entrance", &body.value)?;
        }
        key => state.store.set_setting(key, &body.value)?,
    }
    ok(())
}

pub fn validate_entrance(path: &str) -> Result<(), Error> {
    if !path.starts_with('/') || path.len() < 5 || path == "/login" {
        return Err(Error::Config(
            "security entrance must start with '/', be at least 5 characters, and not be /login".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrance_rules() {
        assert!(validate_entrance("/ops-portal").is_ok());
        assert!(validate_entrance("/abcd").is_err(), "too short");
        assert!(validate_entrance("/login").is_err(), "login is reserved");
        assert!(validate_entrance("noslash").is_err());
    }
}
