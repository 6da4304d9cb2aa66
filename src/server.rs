//! ChatServer Actor implementation
//!
//! The central actor that owns the Connection Registry and routes every
//! inbound line. Uses the Actor pattern with mpsc channels for message passing,
//! so the registry is only ever touched from this one task.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{parse_whisper, ServerMessage};
use crate::registry::Registry;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Connection sent its name line
    Join {
        client_id: ClientId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
        /// Cancelled when the server evicts this connection
        evicted: CancellationToken,
    },
    /// Connection ended (quit, peer close or I/O error)
    Leave {
        client_id: ClientId,
    },
    /// Public message
    Chat {
        client_id: ClientId,
        text: String,
    },
    /// Raw whisper line, prefix included
    Whisper {
        client_id: ClientId,
        raw: String,
    },
}

/// The main ChatServer actor
///
/// Processes commands one at a time. Delivery only enqueues onto each
/// session's outbound channel, so no network write happens here.
pub struct ChatServer {
    /// All registered connections
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                client_id,
                name,
                sender,
                evicted,
            } => {
                self.handle_join(client_id, name, sender, evicted);
            }
            ServerCommand::Leave { client_id } => {
                self.handle_leave(client_id);
            }
            ServerCommand::Chat { client_id, text } => {
                self.handle_chat(client_id, text);
            }
            ServerCommand::Whisper { client_id, raw } => {
                self.handle_whisper(client_id, raw);
            }
        }
    }

    /// Register a connection and announce it to everyone, itself included
    fn handle_join(
        &mut self,
        client_id: ClientId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
        evicted: CancellationToken,
    ) {
        info!("Client {} joined as '{}'", client_id, name);
        self.registry.insert(client_id, name.clone(), sender, evicted);
        debug!("Total clients: {}", self.registry.len());

        self.broadcast(ServerMessage::Joined { name });
    }

    /// Deregister a connection and announce the departure
    ///
    /// A connection already evicted by a failed send was announced then,
    /// so it is ignored here.
    fn handle_leave(&mut self, client_id: ClientId) {
        let Some(session) = self.registry.remove(&client_id) else {
            debug!("Client {} already deregistered", client_id);
            return;
        };

        info!("Client {} ('{}') left", client_id, session.name);
        debug!("Total clients: {}", self.registry.len());

        self.broadcast(ServerMessage::Left { name: session.name });
    }

    /// Relay a public message
    fn handle_chat(&mut self, client_id: ClientId, text: String) {
        let Some(session) = self.registry.get(&client_id) else {
            return;
        };

        let from = session.name.clone();
        debug!("Chat from '{}': {} bytes", from, text.len());

        self.broadcast(ServerMessage::Chat { from, text });
    }

    /// Deliver a whisper to its target and echo it to the sender
    ///
    /// Usage and not-found errors go back to the sender only.
    fn handle_whisper(&mut self, client_id: ClientId, raw: String) {
        let Some(session) = self.registry.get(&client_id) else {
            return;
        };
        let from = session.name.clone();

        let request = match parse_whisper(&raw) {
            Ok(request) => request,
            Err(err) => {
                self.reject(client_id, err);
                return;
            }
        };

        let Some(target_id) = self.registry.find_by_name(&request.target).map(|s| s.id) else {
            self.reject(client_id, AppError::WhisperTargetNotFound(request.target));
            return;
        };

        debug!("Whisper from '{}' to '{}'", from, request.target);
        let msg = ServerMessage::Whisper {
            from,
            to: request.target,
            text: request.body,
        };

        if target_id != client_id && !self.send_to(target_id, msg.clone()) {
            debug!("Whisper target {} dropped before delivery", target_id);
        }
        if !self.send_to(client_id, msg) {
            debug!("Whisper echo to {} not delivered", client_id);
        }
    }

    /// Report a protocol misuse back to its sender only
    fn reject(&mut self, client_id: ClientId, err: AppError) {
        let reply = ServerMessage::from(err);
        if let ServerMessage::Error { code, .. } = &reply {
            debug!("Rejecting request from {}: {:?}", client_id, code);
        }

        if !self.send_to(client_id, reply) {
            debug!("Rejection for {} not delivered", client_id);
        }
    }

    /// Send a message to every registered connection
    ///
    /// Connections that fail during a pass are deregistered after the pass,
    /// then their leave notices are broadcast in turn.
    fn broadcast(&mut self, msg: ServerMessage) {
        let mut pending = VecDeque::from([msg]);

        while let Some(msg) = pending.pop_front() {
            let failed: Vec<ClientId> = self
                .registry
                .iter()
                .filter_map(|session| match session.send(msg.clone()) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("Broadcast to '{}' failed: {}", session.name, e);
                        Some(session.id)
                    }
                })
                .collect();

            pending.extend(self.deregister(failed));
        }
    }

    /// Send a message to one connection
    ///
    /// Returns false if the connection is unknown or the send failed; a failed
    /// connection is deregistered and its departure announced.
    fn send_to(&mut self, client_id: ClientId, msg: ServerMessage) -> bool {
        let Some(session) = self.registry.get(&client_id) else {
            return false;
        };

        match session.send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to '{}' failed: {}", session.name, e);
                for notice in self.deregister(vec![client_id]) {
                    self.broadcast(notice);
                }
                false
            }
        }
    }

    /// Helper: Remove failed connections, returning their leave notices
    ///
    /// Each removed session is evicted, so its handler closes the socket at
    /// once instead of draining what is still queued.
    fn deregister(&mut self, client_ids: Vec<ClientId>) -> Vec<ServerMessage> {
        client_ids
            .into_iter()
            .filter_map(|id| self.registry.remove(&id))
            .map(|session| {
                info!("Client {} ('{}') evicted", session.id, session.name);
                session.evict();
                ServerMessage::Left { name: session.name }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    const QUEUE: usize = 32;

    struct TestPeer {
        id: ClientId,
        rx: mpsc::Receiver<ServerMessage>,
        evicted: CancellationToken,
    }

    impl TestPeer {
        async fn recv(&mut self) -> ServerMessage {
            timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for message")
                .expect("channel closed")
        }

        async fn recv_line(&mut self) -> String {
            self.recv().await.to_string()
        }
    }

    fn spawn_server() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    async fn join_with_queue(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        name: &str,
        queue: usize,
    ) -> TestPeer {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(queue);
        let evicted = CancellationToken::new();
        cmd_tx
            .send(ServerCommand::Join {
                client_id: id,
                name: name.to_string(),
                sender: tx,
                evicted: evicted.clone(),
            })
            .await
            .unwrap();
        TestPeer { id, rx, evicted }
    }

    async fn join(cmd_tx: &mpsc::Sender<ServerCommand>, name: &str) -> TestPeer {
        let mut peer = join_with_queue(cmd_tx, name, QUEUE).await;
        assert_eq!(peer.recv_line().await, format!("{} has joined.", name));
        peer
    }

    async fn chat(cmd_tx: &mpsc::Sender<ServerCommand>, peer: &TestPeer, text: &str) {
        cmd_tx
            .send(ServerCommand::Chat {
                client_id: peer.id,
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    async fn whisper(cmd_tx: &mpsc::Sender<ServerCommand>, peer: &TestPeer, raw: &str) {
        cmd_tx
            .send(ServerCommand::Whisper {
                client_id: peer.id,
                raw: raw.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_join_broadcast_reaches_everyone() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;

        assert_eq!(alice.recv_line().await, "bob has joined.");

        chat(&cmd_tx, &alice, "hello").await;
        assert_eq!(alice.recv_line().await, "alice> hello");
        assert_eq!(bob.recv_line().await, "alice> hello");
    }

    #[tokio::test]
    async fn test_whisper_reaches_only_target_and_sender() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;
        let mut carol = join(&cmd_tx, "carol").await;
        assert_eq!(alice.recv_line().await, "bob has joined.");
        assert_eq!(alice.recv_line().await, "carol has joined.");
        assert_eq!(bob.recv_line().await, "carol has joined.");

        whisper(&cmd_tx, &bob, "/w alice hi").await;
        assert_eq!(alice.recv_line().await, "[whisper] bob → alice: hi");
        assert_eq!(bob.recv_line().await, "[whisper] bob → alice: hi");

        // Carol's next line is the following broadcast, not the whisper
        chat(&cmd_tx, &alice, "sync").await;
        assert_eq!(carol.recv_line().await, "alice> sync");
    }

    #[tokio::test]
    async fn test_whisper_usage_only_to_sender() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;
        assert_eq!(alice.recv_line().await, "bob has joined.");

        whisper(&cmd_tx, &alice, "/w bob").await;
        assert_eq!(
            alice.recv_line().await,
            "[server] Usage: /w <name> <message>"
        );

        chat(&cmd_tx, &alice, "sync").await;
        assert_eq!(bob.recv_line().await, "alice> sync");
    }

    #[tokio::test]
    async fn test_whisper_unknown_target_only_to_sender() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;
        assert_eq!(alice.recv_line().await, "bob has joined.");

        whisper(&cmd_tx, &alice, "/w ghost hi").await;
        assert_eq!(alice.recv_line().await, "[server] User 'ghost' not found.");

        chat(&cmd_tx, &alice, "sync").await;
        assert_eq!(bob.recv_line().await, "alice> sync");
    }

    #[tokio::test]
    async fn test_whisper_to_self_delivered_once() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;

        whisper(&cmd_tx, &alice, "/w alice note").await;
        assert_eq!(alice.recv_line().await, "[whisper] alice → alice: note");

        chat(&cmd_tx, &alice, "sync").await;
        assert_eq!(alice.recv_line().await, "alice> sync");
    }

    #[tokio::test]
    async fn test_whisper_duplicate_name_first_joined_wins() {
        let cmd_tx = spawn_server();
        let mut first = join(&cmd_tx, "sam").await;
        let mut second = join(&cmd_tx, "sam").await;
        let mut bob = join(&cmd_tx, "bob").await;
        assert_eq!(first.recv_line().await, "sam has joined.");
        assert_eq!(first.recv_line().await, "bob has joined.");
        assert_eq!(second.recv_line().await, "bob has joined.");

        whisper(&cmd_tx, &bob, "/w sam psst").await;
        assert_eq!(first.recv_line().await, "[whisper] bob → sam: psst");
        assert_eq!(bob.recv_line().await, "[whisper] bob → sam: psst");

        chat(&cmd_tx, &bob, "sync").await;
        assert_eq!(second.recv_line().await, "bob> sync");
    }

    #[tokio::test]
    async fn test_leave_announced_once() {
        let cmd_tx = spawn_server();
        let alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;

        cmd_tx
            .send(ServerCommand::Leave { client_id: alice.id })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::Leave { client_id: alice.id })
            .await
            .unwrap();
        assert_eq!(bob.recv_line().await, "alice has left.");
        // A voluntary leave is not an eviction
        assert!(!alice.evicted.is_cancelled());

        // Messages from a departed connection are not routed
        chat(&cmd_tx, &alice, "ghost words").await;
        chat(&cmd_tx, &bob, "sync").await;
        assert_eq!(bob.recv_line().await, "bob> sync");
    }

    #[tokio::test]
    async fn test_closed_peer_evicted_after_broadcast() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let bob = join(&cmd_tx, "bob").await;
        assert_eq!(alice.recv_line().await, "bob has joined.");

        drop(bob.rx);
        chat(&cmd_tx, &alice, "anyone?").await;
        assert_eq!(alice.recv_line().await, "alice> anyone?");
        assert_eq!(alice.recv_line().await, "bob has left.");
        assert!(bob.evicted.is_cancelled());

        // The handler's own Leave afterwards does not announce again
        cmd_tx
            .send(ServerCommand::Leave { client_id: bob.id })
            .await
            .unwrap();
        chat(&cmd_tx, &alice, "sync").await;
        assert_eq!(alice.recv_line().await, "alice> sync");
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_block_others() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        // Queue of one, filled by its own join notice and never drained
        let slow = join_with_queue(&cmd_tx, "slow", 1).await;
        assert_eq!(alice.recv_line().await, "slow has joined.");

        chat(&cmd_tx, &alice, "first").await;
        assert_eq!(alice.recv_line().await, "alice> first");
        assert_eq!(alice.recv_line().await, "slow has left.");
        assert!(slow.evicted.is_cancelled());

        chat(&cmd_tx, &alice, "second").await;
        assert_eq!(alice.recv_line().await, "alice> second");
    }

    #[tokio::test]
    async fn test_failed_whisper_echo_evicts_sender() {
        let cmd_tx = spawn_server();
        let mut alice = join(&cmd_tx, "alice").await;
        let mut bob = join(&cmd_tx, "bob").await;
        assert_eq!(alice.recv_line().await, "bob has joined.");

        drop(std::mem::replace(&mut bob.rx, mpsc::channel(1).1));
        whisper(&cmd_tx, &bob, "/w alice hi").await;
        assert_eq!(alice.recv_line().await, "[whisper] bob → alice: hi");
        assert_eq!(alice.recv_line().await, "bob has left.");
        assert!(bob.evicted.is_cancelled());
    }
}
