use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volscope_server::cli::Cli;
use volscope_server::{LogFormat, ServerConfig};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config_path() {
        Some(path) if path.exists() => Some(ServerConfig::from_file(path)?),
        _ => None,
    };
    init_tracing(config.as_ref().map(|c| c.log_format).unwrap_or_default());

    tracing::info!("volscope starting...");
    if let (None, Some(path)) = (&config, cli.config_path()) {
        tracing::warn!("Config file not found, using defaults: {}", path.display());
    }

    cli.run(config.unwrap_or_default()).await
}
