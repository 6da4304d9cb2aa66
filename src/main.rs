//! Line Chat Server - Entry Point
//!
//! Binds the listener, starts the ChatServer actor and accepts connections
//! until interrupted.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use line_chat::cli::ServerArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    let args = ServerArgs::parse();

    tokio::select! {
        result = line_chat::start(&args.host, args.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
