//! Background scheduler: a fixed 10 s tick driving the workflow trigger
//! pass and the site monitor pass, with a stop/start/restart protocol
//! controlled from the CLI signal plane.

pub mod monitors;
pub mod workflows;

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

const TICK: Duration = Duration::from_secs(10);

/// Long-lived scheduler singleton with an explicit lifecycle.
#[derive(Default)]
pub struct Scheduler {
    inner: Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn start(&self, state: AppState) {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            run_loop(state, loop_token).await;
        });
        *inner = Some((token, handle));
        tracing::info!("scheduler started (10s tick)");
    }

    pub async fn stop(&self) {
        let taken = self.inner.lock().take();
        if let Some((token, handle)) = taken {
            token.cancel();
            let _ = handle.await;
            tracing::info!("scheduler stopped");
        }
    }

    pub async fn restart(&self, state: AppState) {
        self.stop().await;
        self.start(state);
    }
}

/// Both passes run concurrently each tick; the next tick starts once the
/// slower pass has finished and the remainder of the interval elapsed.
async fn run_loop(state: AppState, token: CancellationToken) {
    loop {
        let started = tokio::time::Instant::now();

        tokio::join!(
            workflows::tick(&state),
            monitors::tick(&state),
        );

        let elapsed = started.elapsed();
        if elapsed < TICK {
            tokio::select! {
                _ = tokio::time::sleep(TICK - elapsed) => {}
                _ = token.cancelled() => return,
            }
        } else if token.is_cancelled() {
            return;
        }
    }
}
