//! Common test helpers for the integration tests
//!
//! Starts a server on an ephemeral loopback port and provides a raw
//! line-framed peer for driving it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Upper bound for any single expected line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Start a server on `127.0.0.1:0` and return its address
pub async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(line_chat::serve(listener));
    addr
}

/// A raw protocol peer
pub struct Peer {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Peer {
    /// Open a connection without sending anything
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
        }
    }

    /// Connect, send the name and wait for our own join notice
    pub async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.send(name).await;
        peer.expect(&format!("{} has joined.", name)).await;
        peer
    }

    pub async fn send(&mut self, line: &str) {
        self.framed.send(line).await.unwrap();
    }

    /// Send a line, reporting a dead connection instead of panicking
    pub async fn try_send(&mut self, line: &str) -> Result<(), LinesCodecError> {
        self.framed.send(line).await
    }

    /// The underlying framed stream, for concurrent reading and writing
    pub fn into_framed(self) -> Framed<TcpStream, LinesCodec> {
        self.framed
    }

    /// Next line from the server
    pub async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a line")
            .expect("connection closed")
            .expect("invalid line")
    }

    pub async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await, line);
    }

    /// Wait for the server to close this connection
    pub async fn expect_closed(&mut self) {
        match timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(None) | Ok(Some(Err(_))) => {}
            Ok(Some(Ok(line))) => panic!("expected close, got line {:?}", line),
            Err(_) => panic!("timed out waiting for close"),
        }
    }
}
