//! Client session definition
//!
//! Represents one registered connection: its display name and the
//! channel feeding that connection's writer task.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Registered client session
///
/// Created when a connection has sent its name line. Evicting the session
/// cancels its token, which makes the connection's handler close the socket
/// without draining its queue.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Display name chosen at join (not unique)
    pub name: String,
    /// Join order, used to resolve duplicate names
    pub joined_seq: u64,
    /// Server → Client line channel
    sender: mpsc::Sender<ServerMessage>,
    /// Watched by the connection's handler
    evicted: CancellationToken,
}

impl Session {
    /// Create a new session with the given ID, name and sender channel
    pub fn new(
        id: ClientId,
        name: String,
        joined_seq: u64,
        sender: mpsc::Sender<ServerMessage>,
        evicted: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            joined_seq,
            sender,
            evicted,
        }
    }

    /// Tell the connection's handler to close the socket now
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Queue a message for this client without waiting
    ///
    /// Never blocks: a full queue is reported as a failure so one stalled
    /// peer cannot hold up delivery to everyone else.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}
