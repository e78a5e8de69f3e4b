//! SSH host adapter: upload the bundle to fixed paths, with optional
//! shell commands before and after. SFTP is preferred; hosts without an
//! SFTP subsystem fall back to `mkdir -p` + base64 over the exec channel.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use cf_domain::error::{Error, Result};
use cf_store::Store;

use crate::{node_str, node_str_opt, DeployTarget};

#[derive(Debug, Clone, Deserialize)]
struct SshConfig {
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    /// Private key PEM; only honored in key mode.
    #[serde(default, rename = "key")]
    private_key: String,
    host: String,
    #[serde(default)]
    port: Value,
    /// `password` (default) or `key`.
    #[serde(default)]
    mode: String,
}

impl SshConfig {
    fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Deploy(format!("ssh credentials: {e}")))
    }

    fn port(&self) -> u16 {
        cf_domain::value::as_i64_loose(&self.port)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(22)
    }
}

struct RemoteFile {
    path: String,
    content: String,
}

pub(crate) async fn deploy(target: &DeployTarget<'_>) -> Result<()> {
    let cert_path = node_str(target.config, "certPath")?;
    let key_path = node_str(target.config, "keyPath")?;
    let before_cmd = node_str_opt(target.config, "beforeCmd");
    let after_cmd = node_str_opt(target.config, "afterCmd");

    let provider_id = node_str(target.config, "provider_id")?;
    let access = target.store.get_access(&provider_id)?;
    let config = SshConfig::parse(&access.config)?;

    let files = vec![
        RemoteFile {
            path: cert_path,
            content: target.cert.cert.clone(),
        },
        RemoteFile {
            path: key_path,
            content: target.cert.key.clone(),
        },
    ];

    // libssh2 is synchronous; run the whole session on the blocking pool
    // and replay its log lines afterwards.
    let outcome = tokio::task::spawn_blocking(move || {
        write_files_over_ssh(config, files, &before_cmd, &after_cmd)
    })
    .await
    .map_err(|e| Error::Deploy(format!("ssh task: {e}")))?;

    match outcome {
        Ok(lines) => {
            for (level, msg) in &lines {
                target.log.write(level, msg);
            }
            Ok(())
        }
        Err((lines, err)) => {
            for (level, msg) in &lines {
                target.log.write(level, msg);
            }
            Err(err)
        }
    }
}

/// Dial + authenticate + session-open, without writing anything. Used by
/// the access test endpoint.
pub async fn test_connection(store: &Store, provider_id: &str) -> Result<()> {
    let access = store.get_access(provider_id)?;
    let config = SshConfig::parse(&access.config)?;
    tokio::task::spawn_blocking(move || {
        let session = connect(&config)?;
        run_command(&session, "true").map(|_| ())
    })
    .await
    .map_err(|e| Error::Deploy(format!("ssh task: {e}")))?
}

type LogLines = Vec<(&'static str, String)>;

fn write_files_over_ssh(
    config: SshConfig,
    files: Vec<RemoteFile>,
    before_cmd: &str,
    after_cmd: &str,
) -> std::result::Result<LogLines, (LogLines, Error)> {
    let mut lines: LogLines = Vec::new();
    let session = connect(&config).map_err(|e| (Vec::new(), e))?;

    let mut run_logged = |cmd: &str, label: &str, lines: &mut LogLines| -> Result<()> {
        let (stdout, stderr, status) = run_command(&session, cmd)?;
        lines.push(("DEBUG", format!("[{label} stdout] {stdout}")));
        lines.push(("DEBUG", format!("[{label} stderr] {stderr}")));
        if status != 0 {
            return Err(Error::Deploy(format!("{label} exited with status {status}")));
        }
        Ok(())
    };

    if !before_cmd.is_empty() {
        if let Err(e) = run_logged(before_cmd, "before command", &mut lines) {
            return Err((lines, e));
        }
    }

    // SFTP first.
    let mut uploaded = false;
    match session.sftp() {
        Ok(sftp) => {
            let result = (|| -> Result<()> {
                for file in &files {
                    let dir = Path::new(&file.path).parent();
                    if let Some(dir) = dir {
                        mkdir_all(&sftp, dir);
                    }
                    let mut remote = sftp
                        .create(Path::new(&file.path))
                        .map_err(|e| Error::Deploy(format!("create {}: {e}", file.path)))?;
                    use std::io::Write;
                    remote
                        .write_all(file.content.as_bytes())
                        .map_err(|e| Error::Deploy(format!("write {}: {e}", file.path)))?;
                    lines.push(("INFO", format!("uploaded {} via SFTP", file.path)));
                }
                Ok(())
            })();
            match result {
                Ok(()) => uploaded = true,
                Err(e) => {
                    lines.push(("DEBUG", format!("SFTP upload failed, falling back to shell: {e}")));
                }
            }
        }
        Err(e) => {
            lines.push(("DEBUG", format!("no SFTP subsystem, falling back to shell: {e}")));
        }
    }

    // Shell fallback: mkdir -p + base64 decode.
    if !uploaded {
        for file in &files {
            let mkdir = format!("mkdir -p $(dirname \"{}\")", file.path);
            if let Err(e) = run_logged(&mkdir, "mkdir", &mut lines) {
                return Err((lines, e));
            }
            let encoded = base64::engine::general_purpose::STANDARD.encode(&file.content);
            let write = format!("echo {} | base64 -d > {}", encoded, file.path);
            if let Err(e) = run_logged(&write, "write file", &mut lines) {
                return Err((lines, e));
            }
            lines.push(("INFO", format!("uploaded {} via shell", file.path)));
        }
    }

    if !after_cmd.is_empty() {
        if let Err(e) = run_logged(after_cmd, "after command", &mut lines) {
            return Err((lines, e));
        }
    }
    Ok(lines)
}

fn connect(config: &SshConfig) -> Result<ssh2::Session> {
    if config.host.is_empty() {
        return Err(Error::Deploy("ssh credentials are missing host".into()));
    }
    let addr = (config.host.as_str(), config.port());
    let tcp = TcpStream::connect(addr)
        .map_err(|e| Error::Deploy(format!("ssh dial {}:{}: {e}", config.host, config.port())))?;
    let mut session = ssh2::Session::new().map_err(|e| Error::Deploy(format!("ssh session: {e}")))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| Error::Deploy(format!("ssh handshake: {e}")))?;

    let key_mode = config.mode == "key" && !config.private_key.is_empty();
    if key_mode {
        let passphrase = if config.password.is_empty() {
            None
        } else {
            Some(config.password.as_str())
        };
        session
            .userauth_pubkey_memory(&config.user, None, &config.private_key, passphrase)
            .map_err(|e| Error::Deploy(format!("ssh key auth: {e}")))?;
    } else {
        if config.password.is_empty() {
            return Err(Error::Deploy("ssh credentials provide no authentication".into()));
        }
        session
            .userauth_password(&config.user, &config.password)
            .map_err(|e| Error::Deploy(format!("ssh password auth: {e}")))?;
    }
    Ok(session)
}

fn run_command(session: &ssh2::Session, cmd: &str) -> Result<(String, String, i32)> {
    let mut channel = session
        .channel_session()
        .map_err(|e| Error::Deploy(format!("ssh channel: {e}")))?;
    channel
        .exec(cmd)
        .map_err(|e| Error::Deploy(format!("ssh exec: {e}")))?;
    let mut stdout = String::new();
    let mut stderr = String::new();
    channel.read_to_string(&mut stdout).ok();
    channel.stderr().read_to_string(&mut stderr).ok();
    channel
        .wait_close()
        .map_err(|e| Error::Deploy(format!("ssh close: {e}")))?;
    let status = channel.exit_status().unwrap_or(-1);
    Ok((stdout, stderr, status))
}

/// Best-effort recursive mkdir; existing components are fine.
fn mkdir_all(sftp: &ssh2::Sftp, dir: &Path) {
    let mut current = std::path::PathBuf::new();
    for component in dir.components() {
        current.push(component);
        let _ = sftp.mkdir(&current, 0o755);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_loose_port_and_defaults() {
        let config = SshConfig::parse(
            r#"{"user":"root","password":"pw","host":"10.0.0.1","port":2222}"#,
        )
        .unwrap();
        assert_eq!(config.port(), 2222);
        assert_eq!(config.mode, "");

        let config = SshConfig::parse(r#"{"user":"root","password":"pw","host":"h","port":"22"}"#).unwrap();
        assert_eq!(config.port(), 22);

        let config = SshConfig::parse(r#"{"user":"root","password":"pw","host":"h"}"#).unwrap();
        assert_eq!(config.port(), 22, "missing port defaults to 22");
    }

    #[test]
    fn missing_host_fails_early() {
        let config = SshConfig::parse(r#"{"user":"root","password":"pw","host":""}"#).unwrap();
        assert!(connect(&config).is_err());
    }
}
