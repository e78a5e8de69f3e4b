//! Per-run logging interface.
//!
//! Every run owns an append-only log file; subsystems invoked by the
//! engine receive the sink through this trait so progress lands in the
//! run's log rather than only in process-level tracing.

/// Sink for per-run log lines.
pub trait RunLogger: Send + Sync {
    fn write(&self, level: &str, msg: &str);

    fn info(&self, msg: &str) {
        self.write("INFO", msg);
    }

    fn debug(&self, msg: &str) {
        self.write("DEBUG", msg);
    }

    fn error(&self, msg: &str) {
        self.write("ERROR", msg);
    }
}

/// Logger that drops everything; for tests and fire-and-forget paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl RunLogger for NoopLogger {
    fn write(&self, _level: &str, _msg: &str) {}
}
