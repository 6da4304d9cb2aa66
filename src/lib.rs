//! Line-oriented TCP Chat Library
//!
//! A multi-client chat server and its console client, speaking
//! newline-delimited UTF-8 text over plain TCP.
//!
//! # Features
//! - Display name sent as the first line
//! - Join and leave notices
//! - Public broadcast to everyone online
//! - Whispers (`/w <name> <message>`) to one named client, echoed to the sender
//! - Quit with `/quit`
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the single actor owning the Connection Registry
//! - Each connection has a `handler` with a read task and a write task
//! - The actor only enqueues outbound lines, so a stalled peer never holds
//!   up the registry
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     line_chat::serve(listener).await;
//! }
//! ```

pub mod cli;
pub mod client;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ConnectionState};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use listener::{serve, start};
pub use message::{ClientLine, ErrorCode, ServerMessage};
pub use registry::Registry;
pub use server::{ChatServer, ServerCommand};
pub use session::Session;
pub use types::ClientId;
