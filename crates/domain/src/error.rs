/// Shared error type used across all certfleet crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Db(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ACME: {0}")]
    Acme(String),

    #[error("DNS: {0}")]
    Dns(String),

    #[error("deploy: {0}")]
    Deploy(String),

    #[error("notify: {0}")]
    Notify(String),

    #[error("plugin: {0}")]
    Plugin(String),

    #[error("certificate: {0}")]
    Validation(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
