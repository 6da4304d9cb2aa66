//! TCP connection handler
//!
//! Handles individual client connections: reads the name line, registers
//! with the ChatServer, and runs a read task and a write task until either
//! side of the connection ends.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{ClientLine, ServerMessage};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Longest inbound line accepted, in bytes
pub const MAX_LINE_LENGTH: usize = 8192;

/// Lines queued per connection before the peer counts as stalled
pub const OUTBOUND_QUEUE_SIZE: usize = 64;

/// Handle a new TCP connection
///
/// Registers the connection once its name line arrives, then routes every
/// further line through the ChatServer until quit, peer close or error.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    // The first line is the display name
    let name = match lines.next().await {
        Some(Ok(name)) => name,
        Some(Err(e)) => return Err(e.into()),
        None => {
            debug!("{} closed before sending a name", peer_addr);
            return Ok(());
        }
    };

    let client_id = ClientId::new();
    info!("Client {} connected from {} as '{}'", client_id, peer_addr, name);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE_SIZE);

    // Cancelled by the ChatServer if it evicts this connection
    let evicted = CancellationToken::new();

    // Register with ChatServer
    cmd_tx
        .send(ServerCommand::Join {
            client_id,
            name,
            sender: msg_tx,
            evicted: evicted.clone(),
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (socket -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(line_result) = lines.next().await {
            let line = match line_result {
                Ok(line) => line,
                Err(e) => {
                    warn!("Read error for {}: {}", client_id, e);
                    break;
                }
            };

            let cmd = match ClientLine::parse(line) {
                ClientLine::Quit => {
                    debug!("Client {} sent quit", client_id);
                    break;
                }
                ClientLine::Whisper(raw) => ServerCommand::Whisper { client_id, raw },
                ClientLine::Chat(text) => ServerCommand::Chat { client_id, text },
            };

            if cmd_tx_read.send(cmd).await.is_err() {
                debug!("Server closed, ending read task for {}", client_id);
                break;
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> socket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = sink.send(msg.to_string()).await {
                debug!("Send failed for {}: {}", client_id, e);
                break;
            }
        }
        debug!("Write task ended for {}", client_id);

        let _ = SinkExt::<String>::close(&mut sink).await;
    });

    // Wait for either task to complete, or for eviction
    tokio::select! {
        _ = evicted.cancelled() => {
            debug!("Client {} evicted, closing", client_id);
        }
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    // Deregister first so the leave notice never goes back to this socket
    let _ = cmd_tx.send(ServerCommand::Leave { client_id }).await;

    // Dropping both halves closes the socket
    read_task.abort();
    write_task.abort();

    info!("Client {} disconnected", client_id);

    Ok(())
}
