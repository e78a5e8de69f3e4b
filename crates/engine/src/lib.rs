//! The workflow engine: per-run execution context and log sink, the
//! node-executor registry, and the recursive tree walker.

pub mod context;
pub mod engine;
pub mod handlers;
pub mod registry;
pub mod runlog;

pub use context::ExecutionContext;
pub use engine::Engine;
pub use registry::{ExecutorRegistry, NodeEnv, NodeExecutor};
pub use runlog::RunLog;
