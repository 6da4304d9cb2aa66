//! Connection Registry
//!
//! The authoritative mapping of live connections to display names.
//! Owned exclusively by the `ChatServer` actor, so every add, remove,
//! lookup and broadcast snapshot is serialized through it.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::ServerMessage;
use crate::session::Session;
use crate::types::ClientId;

/// Registry of active sessions keyed by connection
#[derive(Debug, Default)]
pub struct Registry {
    /// ClientId -> Session
    sessions: HashMap<ClientId, Session>,
    /// Next join sequence number
    next_seq: u64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a display name
    ///
    /// Duplicate names are accepted. Re-registering an id replaces its entry.
    pub fn insert(
        &mut self,
        id: ClientId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
        evicted: CancellationToken,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.sessions.insert(id, Session::new(id, name, seq, sender, evicted));
    }

    /// Deregister a connection, returning its session if it was present
    pub fn remove(&mut self, id: &ClientId) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Look up a session by connection
    pub fn get(&self, id: &ClientId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Find the session for a display name
    ///
    /// With duplicate names, the earliest joined live session wins.
    pub fn find_by_name(&self, name: &str) -> Option<&Session> {
        self.sessions
            .values()
            .filter(|s| s.name == name)
            .min_by_key(|s| s.joined_seq)
    }

    /// All current sessions, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if nobody is online
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
