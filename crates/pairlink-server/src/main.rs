//! pairlink relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development: any origin may connect
//! pairlink-server --bind 0.0.0.0:3001
//!
//! # Production: explicit origin allow-list
//! pairlink-server --bind 0.0.0.0:3001 \
//!     --allow-origin https://app.example.com \
//!     --allow-origin http://localhost:3000
//! ```

use clap::Parser;
use pairlink_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Presence and matchmaking relay
#[derive(Parser, Debug)]
#[command(name = "pairlink-server")]
#[command(about = "Presence and matchmaking relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3001")]
    bind: String,

    /// Browser origin allowed to connect (repeatable); none allows any
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("pairlink relay starting");
    tracing::info!("binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        allowed_origins: args.allow_origins,
        driver: DriverConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    server.run().await?;

    Ok(())
}
