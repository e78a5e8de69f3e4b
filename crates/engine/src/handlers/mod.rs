//! Node handlers for the built-in node kinds.

mod apply;
mod deploy;
mod notify;
mod upload;

pub use apply::ApplyExecutor;
pub use deploy::DeployExecutor;
pub use notify::NotifyExecutor;
pub use upload::UploadExecutor;
