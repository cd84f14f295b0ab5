use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use room_shuffle::api::Workspace;
use room_shuffle::config::EngineConfig;
use room_shuffle::server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Room assignment service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML engine configuration. Defaults apply when the file is absent.
    #[arg(long, default_value = "room-shuffle.toml")]
    config: PathBuf,

    /// Listen address, overriding `[server] bind`.
    #[arg(long)]
    bind: Option<String>,
}

fn load_config(path: &Path) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(EngineConfig::load(path)?)
    } else {
        warn!(event = "config_missing", path = %path.display(), "using defaults");
        Ok(EngineConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let cors = server::cors(&config.server);
    let bind = config.server.bind.clone();
    let workspace = Arc::new(Workspace::new(config));
    let app = server::router(Arc::clone(&workspace)).layer(cors);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(event = "listening", addr = %listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(event = "signal_error", error = %err);
            }
            info!(event = "shutdown");
            workspace.cancel_all();
        })
        .await?;
    Ok(())
}
