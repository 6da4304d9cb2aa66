//! Line protocol definitions
//!
//! Newline-delimited UTF-8 text in both directions. Inbound lines are
//! classified into [`ClientLine`]; outbound lines are rendered from
//! [`ServerMessage`] through its `Display` impl.

use std::fmt;

use crate::error::AppError;

/// Lines that end a session
pub const QUIT_COMMANDS: &[&str] = &["/quit", "/종료"];

/// First tokens that mark a whisper
pub const WHISPER_PREFIXES: &[&str] = &["/w", "/귓"];

/// Canonical quit sentinel sent by the client on interrupt or end of input
pub const QUIT_COMMAND: &str = "/quit";

/// Prefix for lines originated by the server itself
const SERVER_TAG: &str = "[server]";

/// Returns true if the line is one of the quit sentinels
pub fn is_quit(line: &str) -> bool {
    QUIT_COMMANDS.contains(&line)
}

/// Client → Server line, after the initial name line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Public message, broadcast as-is
    Chat(String),
    /// Raw whisper line, still carrying its prefix
    Whisper(String),
    /// Quit sentinel
    Quit,
}

impl ClientLine {
    /// Classify one inbound line
    pub fn parse(line: String) -> Self {
        if is_quit(&line) {
            return ClientLine::Quit;
        }
        let first = line.split(' ').next().unwrap_or_default();
        if WHISPER_PREFIXES.contains(&first) {
            ClientLine::Whisper(line)
        } else {
            ClientLine::Chat(line)
        }
    }
}

/// A whisper split into its addressing parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperRequest {
    pub target: String,
    pub body: String,
}

/// Split a raw whisper line into prefix, target and body
///
/// At most three parts are taken, so the body keeps its inner spaces.
/// A missing or empty target or body is a usage error.
pub fn parse_whisper(raw: &str) -> Result<WhisperRequest, AppError> {
    let mut parts = raw.splitn(3, ' ');
    let _prefix = parts.next();
    let target = parts.next().filter(|t| !t.is_empty());
    let body = parts.next().filter(|b| !b.trim().is_empty());

    match (target, body) {
        (Some(target), Some(body)) => Ok(WhisperRequest {
            target: target.to_string(),
            body: body.to_string(),
        }),
        _ => Err(AppError::WhisperUsage),
    }
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// A client registered
    Joined { name: String },
    /// A client was deregistered
    Left { name: String },
    /// Relayed public message
    Chat { from: String, text: String },
    /// Directed message, delivered to target and sender
    Whisper {
        from: String,
        to: String,
        text: String,
    },
    /// Protocol misuse reported to the sender only
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Whisper missing its target or body
    WhisperUsage,
    /// Whisper target is not online
    TargetNotFound,
    /// Anything else that reaches a client
    Internal,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Joined { name } => write!(f, "{} has joined.", name),
            ServerMessage::Left { name } => write!(f, "{} has left.", name),
            ServerMessage::Chat { from, text } => write!(f, "{}> {}", from, text),
            ServerMessage::Whisper { from, to, text } => {
                write!(f, "[whisper] {} → {}: {}", from, to, text)
            }
            ServerMessage::Error { message, .. } => write!(f, "{} {}", SERVER_TAG, message),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::WhisperUsage => (
                ErrorCode::WhisperUsage,
                format!("Usage: {} <name> <message>", WHISPER_PREFIXES[0]),
            ),
            AppError::WhisperTargetNotFound(target) => {
                (ErrorCode::TargetNotFound, format!("User '{}' not found.", target))
            }
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}
