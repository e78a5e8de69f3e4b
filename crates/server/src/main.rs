use clap::Parser;
use tracing_subscriber::EnvFilter;

use cf_domain::config::Config;
use cf_server::bootstrap;
use cf_server::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(std::path::Path::new("certfleet.toml"))?;

    match cli.command {
        None | Some(Command::Start) => {
            init_tracing();
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(bootstrap::run_server(config))
        }
        Some(command) => cf_server::cli::run_command(command, &config),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cf_server=debug")),
        )
        .init();
}
