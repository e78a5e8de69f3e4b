//! Dashboard counts and plugin inventory.

use axum::extract::State;

use cf_plugin::PluginMetadata;

use super::{ok, ApiResult};
use crate::state::AppState;

pub async fn stats(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let (_, workflows) = state.store.list_workflows("", 1, 1)?;
    let (_, certs) = state.store.list_certs("", 1, 1)?;
    let (_, accesses) = state.store.list_access("", "", 1, 1)?;
    let (_, monitors) = state.store.list_monitors("", 1, 1)?;
    let (_, history) = state.store.list_history("", 1, 1)?;
    ok(serde_json::json!({
        "workflows": workflows,
        "certs": certs,
        "accesses": accesses,
        "monitors": monitors,
        "runs": history,
        "scheduler_running": state.scheduler.is_running(),
    }))
}

pub async fn plugins(State(state): State<AppState>) -> ApiResult<Vec<PluginMetadata>> {
    // Rescan so freshly dropped-in executables show up.
    let found = state.plugins.scan(&state.plugin_dir()).await?;
    ok(found)
}
