//! Application configuration.
//!
//! Static process configuration lives in `certfleet.toml` next to the
//! binary; everything an operator can change at runtime (port, username,
//! password digest, secure entrance, plugin dir) lives in the `settings`
//! table and is read through the store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    /// Fallback port when the `port` setting is absent from the store.
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    /// Per-run workflow logs (`<logs_dir>/<runId>.log`).
    #[serde(default = "d_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "d_plugin_dir")]
    pub plugin_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            logs_dir: d_logs_dir(),
            plugin_dir: d_plugin_dir(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn pid_path(&self) -> PathBuf {
        self.paths.data_dir.join("pid")
    }

    pub fn env_path(&self) -> PathBuf {
        self.paths.data_dir.join(".env")
    }

    pub fn https_dir(&self) -> PathBuf {
        self.paths.data_dir.join("https")
    }

    pub fn monitor_counter_dir(&self) -> PathBuf {
        self.paths.data_dir.join("site_monitor")
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    7979
}
fn d_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn d_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn d_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let cfg = Config::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(cfg.server.port, 7979);
        assert_eq!(cfg.paths.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.paths.plugin_dir, PathBuf::from("plugins"));
    }
}
