//! Waymark daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! waymark
//!
//! # Start with custom config
//! waymark --config /etc/waymark/waymark.toml
//!
//! # Override port and data directory
//! waymark --http-port 8085 --data-dir /var/lib/waymark
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use waymark::api::create_router;
use waymark::{Config, Db, Engine};

#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(about = "Completion-to-reward core for a gamified location-visiting platform")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the SQLite database
    #[arg(long, env = "WAYMARK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "WAYMARK_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("waymark=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading config from {:?}", config_path);
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.database.data_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    config.validate()?;

    let db = Arc::new(Db::open(&config.database.data_dir)?);
    info!(
        data_dir = %config.database.data_dir.display(),
        "Storage ready"
    );

    let http_port = config.server.http_port;
    let engine = Arc::new(Engine::new(db, config));
    let app = create_router(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
