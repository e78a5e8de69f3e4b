//! Process bootstrap: stores, plugin scan, subsystems, signal plane, and
//! the axum listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use cf_domain::config::Config;
use cf_engine::{Engine, ExecutorRegistry};
use cf_plugin::PluginHost;
use cf_store::Store;

use crate::auth::SessionMap;
use crate::cli::{self, pid};
use crate::sched::Scheduler;
use crate::state::AppState;

/// The web subsystem: an axum listener that can be stopped and started
/// from the control plane without taking the scheduler down.
#[derive(Default)]
pub struct WebServer {
    inner: Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

impl WebServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, state: AppState) {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let serve_token = token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve(state, serve_token).await {
                tracing::error!(error = %e, "web subsystem exited with an error");
            }
        });
        *inner = Some((token, handle));
    }

    pub async fn stop(&self) {
        let taken = self.inner.lock().take();
        if let Some((token, handle)) = taken {
            token.cancel();
            let _ = handle.await;
            tracing::info!("web subsystem stopped");
        }
    }

    pub async fn restart(&self, state: AppState) {
        self.stop().await;
        self.start(state);
    }
}

async fn serve(state: AppState, token: CancellationToken) -> anyhow::Result<()> {
    let port: u16 = state
        .store
        .setting_or("port", &state.config.server.port.to_string())
        .parse()
        .unwrap_or(state.config.server.port);
    let addr = format!("{}:{}", state.config.server.host, port);

    let app = crate::api::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "web subsystem listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("axum server error")?;
    Ok(())
}

/// Foreground entry point for `certfleet start`.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    tracing::info!("certfleet starting");

    // ── Filesystem layout ───────────────────────────────────────────
    for dir in [
        config.paths.data_dir.clone(),
        config.paths.logs_dir.clone(),
        config.paths.plugin_dir.clone(),
        config.https_dir(),
        config.monitor_counter_dir(),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    // ── Store ───────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&config.paths.data_dir).context("opening stores")?);
    tracing::info!(data_dir = %config.paths.data_dir.display(), "stores ready");

    // ── Single-instance guard ───────────────────────────────────────
    let pid_handle = pid::write_pid_file(&config.pid_path())?;

    // ── Plugin host ─────────────────────────────────────────────────
    let plugins = Arc::new(PluginHost::new());
    let plugin_dir = std::path::PathBuf::from(
        store.setting_or("plugin_dir", &config.paths.plugin_dir.to_string_lossy()),
    );
    match plugins.scan(&plugin_dir).await {
        Ok(found) => tracing::info!(plugins = found.len(), "plugin scan complete"),
        Err(e) => tracing::warn!(error = %e, "plugin scan failed"),
    }

    // ── Engine ──────────────────────────────────────────────────────
    let registry = ExecutorRegistry::standard(store.clone(), plugins.clone(), plugin_dir);
    let engine = Arc::new(Engine::new(Arc::new(registry)));
    tracing::info!("executor registry + engine ready");

    // ── Sessions ────────────────────────────────────────────────────
    let session_ttl: u64 = store.setting_or("timeout", "86400").parse().unwrap_or(86_400);
    let sessions = Arc::new(SessionMap::new(Duration::from_secs(session_ttl)));

    let scheduler = Arc::new(Scheduler::new());
    let state = AppState {
        config: config.clone(),
        store,
        plugins,
        engine,
        scheduler: scheduler.clone(),
        sessions,
    };

    // ── Subsystems per the control file ─────────────────────────────
    let web = Arc::new(WebServer::new());
    apply_control(&state, &web, &scheduler).await;

    // ── SIGHUP control plane ────────────────────────────────────────
    {
        let state = state.clone();
        let web = web.clone();
        let scheduler = scheduler.clone();
        let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("installing SIGHUP handler")?;
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                tracing::info!("SIGHUP received, re-reading control file");
                apply_control(&state, &web, &scheduler).await;
            }
        });
    }

    // ── Run until terminated ────────────────────────────────────────
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
        _ = terminate.recv() => tracing::info!("terminate received"),
    }

    scheduler.stop().await;
    web.stop().await;
    pid::remove_pid_file(&config.pid_path(), pid_handle);
    tracing::info!("certfleet stopped");
    Ok(())
}

/// Bring both subsystems to the state `data/.env` asks for.
async fn apply_control(state: &AppState, web: &WebServer, scheduler: &Scheduler) {
    let env = cli::read_env(&state.config.env_path());
    match env.get("web").map(String::as_str) {
        Some("stop") => web.stop().await,
        Some("restart") => web.restart(state.clone()).await,
        _ => web.start(state.clone()),
    }
    match env.get("scheduler").map(String::as_str) {
        Some("stop") => scheduler.stop().await,
        Some("restart") => scheduler.restart(state.clone()).await,
        _ => scheduler.start(state.clone()),
    }
}
