use anyhow::{Context, Result};
use camserve_lib::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// camserve - camera control web service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file, used instead of ./camserve.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the simulated camera
    #[arg(long)]
    debug: bool,

    /// HTTP port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.debug {
        config.debug_mode = true;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    camserve_lib::init_tracing(config.log_level.as_deref());
    for file in &sources.files {
        tracing::info!("Loaded config from {}", file.display());
    }
    if !sources.env_overrides.is_empty() {
        tracing::info!("Environment overrides: {}", sources.env_overrides.join(", "));
    }
    for warning in &sources.warnings {
        tracing::warn!("{}", warning);
    }

    camserve_lib::run(config).await
}
