//! Local filesystem adapter: write the bundle next to this process, with
//! optional shell commands around the write.

use std::path::Path;

use cf_domain::error::{Error, Result};

use crate::{node_str, node_str_opt, DeployTarget};

pub(crate) async fn deploy(target: &DeployTarget<'_>) -> Result<()> {
    let cert_path = node_str(target.config, "certPath")?;
    let key_path = node_str(target.config, "keyPath")?;

    let before_cmd = node_str_opt(target.config, "beforeCmd");
    if !before_cmd.is_empty() {
        run_shell(&before_cmd, "before command", target.log).await?;
    }

    for (path, content) in [(&cert_path, &target.cert.cert), (&key_path, &target.cert.key)] {
        if let Some(dir) = Path::new(path).parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Deploy(format!("create {}: {e}", dir.display())))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| Error::Deploy(format!("write {path}: {e}")))?;
        target.log.info(&format!("wrote {path}"));
    }

    let after_cmd = node_str_opt(target.config, "afterCmd");
    if !after_cmd.is_empty() {
        run_shell(&after_cmd, "after command", target.log).await?;
    }
    Ok(())
}

async fn run_shell(cmd: &str, label: &str, log: &dyn cf_domain::RunLogger) -> Result<()> {
    let output = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(cmd)
        .output()
        .await
        .map_err(|e| Error::Deploy(format!("{label}: {e}")))?;
    log.debug(&format!("[{label} stdout] {}", String::from_utf8_lossy(&output.stdout)));
    log.debug(&format!("[{label} stderr] {}", String::from_utf8_lossy(&output.stderr)));
    if !output.status.success() {
        return Err(Error::Deploy(format!(
            "{label} exited with status {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
