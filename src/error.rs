//! Error types for the chat server and client
//!
//! Defines application-level errors and single-session delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both fatal errors (startup abort or connection teardown) and
/// protocol misuse (reported back to the sender as a chat line).
#[derive(Debug, Error)]
pub enum AppError {
    /// Listener could not be bound (fatal to server startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server could not be reached (fatal to client startup)
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error: oversized line or invalid UTF-8 (fatal)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Whisper without a target or without a body
    #[error("Malformed whisper")]
    WhisperUsage,

    /// Whisper to a name nobody currently holds
    #[error("Whisper target not found: {0}")]
    WhisperTargetNotFound(String),
}

/// Message send errors
///
/// Occurs when a line cannot be queued for a single session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's outbound queue is full (peer is not draining)
    #[error("Outbound queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
