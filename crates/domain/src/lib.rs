//! Shared domain types for certfleet: the workspace-wide error type, the
//! application config, the workflow node tree, and loose JSON coercions.

pub mod config;
pub mod error;
pub mod log;
pub mod value;
pub mod workflow;

pub use error::{Error, Result};
pub use log::{NoopLogger, RunLogger};

/// Timestamp format used everywhere a time is persisted or compared.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in the persisted string format.
pub fn now_string() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}
