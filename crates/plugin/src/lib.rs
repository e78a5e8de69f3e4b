//! External plugin host.
//!
//! Plugins are standalone executables speaking JSON over stdio: one
//! request object on stdin, one response object on stdout, stderr
//! discarded. Discovery scans the plugin directory and interrogates each
//! executable with `get_metadata`; invalid outputs are logged and
//! skipped. A lookup miss triggers a single rescan before failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use cf_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
pub struct PluginRequest {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub actions: Vec<ActionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    /// Filled in by discovery, not by the plugin.
    #[serde(skip)]
    pub path: PathBuf,
}

impl PluginMetadata {
    pub fn supports(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.name == action)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Host
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Miss {
    Plugin,
    Action,
}

/// Process-wide plugin registry. The registry map is repopulated
/// atomically on each scan.
#[derive(Default)]
pub struct PluginHost {
    registry: RwLock<HashMap<String, PluginMetadata>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` (recursively) and rebuild the registry. Returns the
    /// discovered plugins.
    pub async fn scan(&self, dir: &Path) -> Result<Vec<PluginMetadata>> {
        let mut found = Vec::new();
        let mut files = Vec::new();
        collect_files(dir, &mut files);
        for path in files {
            match get_metadata(&path).await {
                Ok(mut meta) => {
                    meta.path = path;
                    found.push(meta);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid plugin, skipping");
                }
            }
        }
        let mut registry = self.registry.write();
        registry.clear();
        for meta in &found {
            registry.insert(meta.name.clone(), meta.clone());
        }
        Ok(found)
    }

    pub fn plugins(&self) -> Vec<PluginMetadata> {
        self.registry.read().values().cloned().collect()
    }

    pub fn actions(&self, plugin: &str) -> Vec<ActionInfo> {
        self.registry
            .read()
            .get(plugin)
            .map(|m| m.actions.clone())
            .unwrap_or_default()
    }

    /// Invoke `action` on the named plugin. A registry miss triggers one
    /// rescan of `dir`; a second miss is terminal.
    pub async fn call(
        &self,
        dir: &Path,
        name: &str,
        action: &str,
        params: Map<String, Value>,
    ) -> Result<PluginResponse> {
        match self.try_call(name, action, params.clone()).await {
            Ok(resp) => Ok(resp),
            Err(Ok(_miss)) => {
                tracing::debug!(plugin = name, action, "registry miss, rescanning plugins");
                self.scan(dir).await?;
                match self.try_call(name, action, params).await {
                    Ok(resp) => Ok(resp),
                    Err(Ok(Miss::Plugin)) => {
                        Err(Error::Plugin(format!("plugin not found: {name}")))
                    }
                    Err(Ok(Miss::Action)) => Err(Error::Plugin(format!(
                        "plugin {name} does not support action {action}"
                    ))),
                    Err(Err(e)) => Err(e),
                }
            }
            Err(Err(e)) => Err(e),
        }
    }

    async fn try_call(
        &self,
        name: &str,
        action: &str,
        params: Map<String, Value>,
    ) -> std::result::Result<PluginResponse, std::result::Result<Miss, Error>> {
        let path = {
            let registry = self.registry.read();
            let Some(meta) = registry.get(name) else {
                return Err(Ok(Miss::Plugin));
            };
            if !meta.supports(action) {
                return Err(Ok(Miss::Action));
            }
            meta.path.clone()
        };
        let req = PluginRequest {
            action: action.to_string(),
            params: Some(params),
        };
        let resp = invoke(&path, &req).await.map_err(Err)?;
        if resp.status != "success" {
            return Err(Err(Error::Plugin(format!(
                "plugin {name} responded with an error: {}",
                resp.message
            ))));
        }
        Ok(resp)
    }
}

/// Run one short-lived plugin process: write the request, close stdin,
/// read stdout to EOF, wait for exit. Stderr is discarded.
async fn invoke(path: &Path, req: &PluginRequest) -> Result<PluginResponse> {
    let mut child = tokio::process::Command::new(path)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| Error::Plugin(format!("spawn {}: {e}", path.display())))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Plugin("failed to capture plugin stdin".into()))?;
    stdin.write_all(&serde_json::to_vec(req)?).await?;
    stdin.write_all(b"\n").await?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::Plugin(format!("wait for {}: {e}", path.display())))?;
    serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Plugin(format!("invalid plugin output: {e}")))
}

async fn get_metadata(path: &Path) -> Result<PluginMetadata> {
    let req = PluginRequest {
        action: "get_metadata".to_string(),
        params: None,
    };
    let resp = invoke(path, &req).await?;
    if resp.status != "success" {
        return Err(Error::Plugin(format!("metadata error: {}", resp.message)));
    }
    let meta: PluginMetadata = serde_json::from_value(Value::Object(resp.result))
        .map_err(|e| Error::Plugin(format!("metadata parse: {e}")))?;
    if meta.name.is_empty() || meta.actions.is_empty() {
        return Err(Error::Plugin("metadata missing name or actions".into()));
    }
    Ok(meta)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(dir: &Path, name: &str, meta_json: &str, action_json: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        let script = format!(
            "#!/bin/sh\nread line\ncase \"$line\" in\n*get_metadata*) printf '%s' '{meta_json}' ;;\n*) printf '%s' '{action_json}' ;;\nesac\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    const META: &str = r#"{"status":"success","message":"","result":{"name":"demo","description":"d","version":"1.0","author":"t","actions":[{"name":"deploy","description":"push"}]}}"#;
    const OK: &str = r#"{"status":"success","message":"done","result":{}}"#;

    #[tokio::test]
    async fn scan_registers_valid_plugins_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "demo", META, OK);
        std::fs::write(dir.path().join("not-a-plugin.txt"), "hello").unwrap();

        let host = PluginHost::new();
        let found = host.scan(dir.path()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "demo");
        assert!(host.plugins()[0].supports("deploy"));
    }

    #[tokio::test]
    async fn call_round_trips_and_rejects_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "demo", META, OK);
        let host = PluginHost::new();
        host.scan(dir.path()).await.unwrap();

        let resp = host
            .call(dir.path(), "demo", "deploy", Map::new())
            .await
            .unwrap();
        assert_eq!(resp.message, "done");

        let err = host
            .call(dir.path(), "demo", "rollback", Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support"), "got: {err}");
    }

    #[tokio::test]
    async fn miss_triggers_rescan_that_discovers_new_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let host = PluginHost::new();
        host.scan(dir.path()).await.unwrap();
        assert!(host.plugins().is_empty());

        // Plugin dropped in after the initial scan; the call-path rescan
        // must pick it up.
        write_plugin(dir.path(), "late", META.replace("demo", "late").as_str(), OK);
        let resp = host
            .call(dir.path(), "late", "deploy", Map::new())
            .await
            .unwrap();
        assert_eq!(resp.status, "success");
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let fail = r#"{"status":"error","message":"boom","result":{}}"#;
        write_plugin(dir.path(), "demo", META, fail);
        let host = PluginHost::new();
        host.scan(dir.path()).await.unwrap();
        let err = host
            .call(dir.path(), "demo", "deploy", Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"), "got: {err}");
    }
}
