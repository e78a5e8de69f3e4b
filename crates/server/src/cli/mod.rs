//! Management CLI.
//!
//! `start` runs web + scheduler in the foreground; the numeric commands
//! manage a running instance: daemonize, stop/restart, settings writes,
//! and per-subsystem control signalled through `data/.env` + SIGHUP.

pub mod pid;

use std::collections::BTreeMap;
use std::path::Path;

use clap::{Parser, Subcommand};

use cf_domain::config::Config;
use cf_store::Store;

use crate::api::settings::validate_entrance;
use crate::auth::password_digest;

#[derive(Parser)]
#[command(name = "certfleet", about = "certificate lifecycle automation", disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run web + scheduler in the foreground.
    Start,
    #[command(name = "1", about = "run in the background (POSIX only)")]
    Daemon,
    #[command(name = "2", about = "stop the running instance")]
    Stop,
    #[command(name = "3", about = "restart the running instance")]
    Restart,
    #[command(name = "4", about = "set the security entrance path")]
    SetEntrance { path: String },
    #[command(name = "5", about = "set the admin username")]
    SetUsername { name: String },
    #[command(name = "6", about = "set the admin password")]
    SetPassword { password: String },
    #[command(name = "7", about = "set the web port")]
    SetPort { port: u16 },
    #[command(name = "8", about = "stop the web subsystem")]
    WebStop,
    #[command(name = "9", about = "start the web subsystem")]
    WebStart,
    #[command(name = "10", about = "restart the web subsystem")]
    WebRestart,
    #[command(name = "11", about = "stop the scheduler subsystem")]
    SchedStop,
    #[command(name = "12", about = "start the scheduler subsystem")]
    SchedStart,
    #[command(name = "13", about = "restart the scheduler subsystem")]
    SchedRestart,
    #[command(name = "14", about = "disable HTTPS")]
    DisableHttps,
    #[command(name = "15", about = "print panel address and user info")]
    Info,
}

/// Handle every command except `start`.
pub fn run_command(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Start => unreachable!("start is handled by the caller"),
        Command::Daemon => daemonize(config),
        Command::Stop => stop(config),
        Command::Restart => {
            let _ = stop(config);
            daemonize(config)
        }
        Command::SetEntrance { path } => {
            validate_entrance(&path)?;
            with_store(config, |store| store.set_setting("secure_entrance", &path))?;
            println!("security entrance set to {path}");
            Ok(())
        }
        Command::SetUsername { name } => {
            with_store(config, |store| store.set_setting("username", &name))?;
            println!("username updated");
            Ok(())
        }
        Command::SetPassword { password } => {
            with_store(config, |store| {
                let salt = store.setting_or("salt", "");
                store.set_setting("password", &password_digest(&password, &salt))
            })?;
            println!("password updated");
            Ok(())
        }
        Command::SetPort { port } => {
            with_store(config, |store| store.set_setting("port", &port.to_string()))?;
            println!("port set to {port}; restart the web subsystem to apply");
            Ok(())
        }
        Command::WebStop => control(config, "web", "stop"),
        Command::WebStart => control(config, "web", "start"),
        Command::WebRestart => control(config, "web", "restart"),
        Command::SchedStop => control(config, "scheduler", "stop"),
        Command::SchedStart => control(config, "scheduler", "start"),
        Command::SchedRestart => control(config, "scheduler", "restart"),
        Command::DisableHttps => {
            with_store(config, |store| store.set_setting("https", "0"))?;
            println!("HTTPS disabled");
            Ok(())
        }
        Command::Info => info(config),
    }
}

fn with_store<T>(
    config: &Config,
    f: impl FnOnce(&Store) -> cf_domain::Result<T>,
) -> anyhow::Result<T> {
    let store = Store::open(&config.paths.data_dir)?;
    Ok(f(&store)?)
}

fn daemonize(config: &Config) -> anyhow::Result<()> {
    if pid::read_pid(&config.pid_path()).is_some() {
        // A stale file is fine; the lock decides. A live instance will
        // refuse the second start anyway.
        println!("a PID file exists; if certfleet is already running this will be a no-op");
    }
    let exe = std::env::current_exe()?;
    std::process::Command::new("bash")
        .arg("-c")
        .arg(format!("nohup {} start > /dev/null 2>&1 &", exe.display()))
        .status()?;
    println!("certfleet started in the background");
    Ok(())
}

fn stop(config: &Config) -> anyhow::Result<()> {
    let pid = pid::signal(&config.pid_path(), "-9")?;
    let _ = std::fs::remove_file(config.pid_path());
    println!("stopped certfleet (pid {pid})");
    Ok(())
}

/// Subsystem control plane: write the desired state into `data/.env`,
/// then SIGHUP the running process, which re-reads the file.
fn control(config: &Config, key: &str, action: &str) -> anyhow::Result<()> {
    let env_path = config.env_path();
    let mut env = read_env(&env_path);
    env.insert(key.to_string(), action.to_string());
    write_env(&env_path, &env)?;
    pid::signal(&config.pid_path(), "-HUP")?;
    println!("{key}: {action}");
    Ok(())
}

fn info(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.paths.data_dir)?;
    let scheme = if store.setting_or("https", "0") == "1" {
        "https"
    } else {
        "http"
    };
    let port = store.setting_or("port", &config.server.port.to_string());
    let entrance = store.setting_or("secure_entrance", "/login");
    let username = store.setting_or("username", "admin");
    println!("panel:    {scheme}://127.0.0.1:{port}{entrance}");
    println!("username: {username}");
    Ok(())
}

// ── .env control file ───────────────────────────────────────────────

/// Parse `key=value` lines; missing file means defaults (both running).
pub fn read_env(path: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("web".to_string(), "start".to_string());
    env.insert("scheduler".to_string(), "start".to_string());
    if let Ok(raw) = std::fs::read_to_string(path) {
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                env.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
    }
    env
}

pub fn write_env(path: &Path, env: &BTreeMap<String, String>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for (k, v) in env {
        out.push_str(&format!("{k}={v}\n"));
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_round_trips_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let env = read_env(&path);
        assert_eq!(env.get("web").map(String::as_str), Some("start"));
        assert_eq!(env.get("scheduler").map(String::as_str), Some("start"));

        let mut env = env;
        env.insert("web".into(), "stop".into());
        write_env(&path, &env).unwrap();

        let reread = read_env(&path);
        assert_eq!(reread.get("web").map(String::as_str), Some("stop"));
        assert_eq!(reread.get("scheduler").map(String::as_str), Some("start"));
    }

    #[test]
    fn env_ignores_comments_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nweb=restart\nnot a pair\n").unwrap();
        let env = read_env(&path);
        assert_eq!(env.get("web").map(String::as_str), Some("restart"));
    }
}
