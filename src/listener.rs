//! Connection accept loop
//!
//! Starts the ChatServer actor and spawns one handler task per accepted
//! connection, never waiting on any single client.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::ChatServer;

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Bind `host:port` and serve forever
///
/// Only a bind failure is returned; everything after that is handled per
/// connection.
pub async fn start(host: &str, port: u16) -> Result<(), AppError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("Chat server listening on {}", addr);

    serve(listener).await;
    Ok(())
}

/// Serve on an already-bound listener
pub async fn serve(listener: TcpListener) {
    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
