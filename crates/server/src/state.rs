//! Shared process state.

use std::sync::Arc;

use cf_domain::config::Config;
use cf_engine::Engine;
use cf_plugin::PluginHost;
use cf_store::Store;

use crate::auth::SessionMap;
use crate::sched::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub plugins: Arc<PluginHost>,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
    pub sessions: Arc<SessionMap>,
}

impl AppState {
    /// The workflow log directory: the `workflow_log_path` setting when
    /// present, the static config otherwise.
    pub fn logs_dir(&self) -> std::path::PathBuf {
        let configured = self
            .store
            .setting_or("workflow_log_path", &self.config.paths.logs_dir.to_string_lossy());
        std::path::PathBuf::from(configured)
    }

    pub fn plugin_dir(&self) -> std::path::PathBuf {
        let configured = self
            .store
            .setting_or("plugin_dir", &self.config.paths.plugin_dir.to_string_lossy());
        std::path::PathBuf::from(configured)
    }
}
