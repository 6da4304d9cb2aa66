//! Chat client
//!
//! Maintains one connection to the server and runs two loops over it:
//! a spawned receive loop printing server lines, and the foreground input
//! loop sending user lines. Both watch one shared [`ConnectionState`], so
//! whichever side ends first wakes the other.

use std::future::Future;
use std::io::BufRead;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{is_quit, QUIT_COMMAND};

/// Prompt written before the name line is read
pub const NAME_PROMPT: &str = "Enter your display name: ";

/// Buffered user lines between the stdin thread and the input loop
const INPUT_BUFFER_SIZE: usize = 16;

/// Shared connected/disconnected flag
///
/// Cloning yields a handle to the same state. Once disconnected it never
/// becomes connected again.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    closed: CancellationToken,
}

impl ConnectionState {
    /// Create a new state in the connected position
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the connection is still considered live
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Flip to disconnected, waking every waiter
    pub fn mark_disconnected(&self) {
        self.closed.cancel();
    }

    /// Wait until the connection is marked disconnected
    pub async fn disconnected(&self) {
        self.closed.cancelled().await;
    }
}

/// A connected chat client
pub struct ChatClient {
    /// Server address, for logging
    addr: String,
    /// Shared with the receive loop
    state: ConnectionState,
    /// Read half, handed to the receive loop on start
    reader: Option<FramedRead<OwnedReadHalf, LinesCodec>>,
    /// Write half, taken on disconnect
    writer: Option<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    /// Running receive loop
    receiver: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Open the connection to `host:port`
    ///
    /// No retry: failure aborts startup.
    pub async fn connect(host: &str, port: u16) -> Result<Self, AppError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| AppError::Connect {
                addr: addr.clone(),
                source,
            })?;

        info!("Connected to {}", addr);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            addr,
            state: ConnectionState::new(),
            reader: Some(FramedRead::new(read_half, LinesCodec::new())),
            writer: Some(FramedWrite::new(write_half, LinesCodec::new())),
            receiver: None,
        })
    }

    /// Handle to the shared connection state
    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    /// Run the session until quit, end of input, Ctrl-C or connection loss
    ///
    /// Prompts on `output`, sends the first `input` line as the display name,
    /// then prints server lines to `output` while sending further input.
    /// The connection is always closed on return.
    pub async fn start<W>(self, input: mpsc::Receiver<String>, output: W) -> Result<(), AppError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.start_with_shutdown(input, output, interrupted()).await
    }

    /// Like [`start`](Self::start), with `shutdown` standing in for Ctrl-C
    ///
    /// When `shutdown` resolves after the name was sent, the quit sentinel is
    /// sent before disconnecting.
    pub async fn start_with_shutdown<W, S>(
        mut self,
        mut input: mpsc::Receiver<String>,
        output: W,
        shutdown: S,
    ) -> Result<(), AppError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let result = self.run(&mut input, output, shutdown).await;

        self.disconnect().await;
        if let Some(receiver) = self.receiver.take() {
            if let Err(e) = receiver.await {
                warn!("Receive task failed: {}", e);
            }
        }

        info!("Disconnected from {}", self.addr);
        result
    }

    async fn run<W, S>(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        mut output: W,
        mut shutdown: Pin<&mut S>,
    ) -> Result<(), AppError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        output.write_all(NAME_PROMPT.as_bytes()).await?;
        output.flush().await?;

        let name = tokio::select! {
            name = input.recv() => name,
            _ = self.state.disconnected() => None,
            _ = shutdown.as_mut() => None,
        };
        let Some(name) = name else {
            debug!("No display name entered");
            return Ok(());
        };
        self.send_message(&name).await;

        if let Some(reader) = self.reader.take() {
            self.receiver = Some(tokio::spawn(receive_loop(reader, output, self.state.clone())));
        }

        self.input_loop(input, shutdown).await;
        Ok(())
    }

    /// Send user lines until quit, end of input, shutdown or disconnect
    async fn input_loop<S>(&mut self, input: &mut mpsc::Receiver<String>, mut shutdown: Pin<&mut S>)
    where
        S: Future<Output = ()>,
    {
        let state = self.state.clone();

        while state.is_connected() {
            tokio::select! {
                _ = state.disconnected() => break,
                _ = shutdown.as_mut() => {
                    debug!("Interrupted, sending quit");
                    self.send_message(QUIT_COMMAND).await;
                    break;
                }
                line = input.recv() => match line {
                    Some(line) => {
                        self.send_message(&line).await;
                        if is_quit(&line) {
                            break;
                        }
                    }
                    None => {
                        debug!("Input closed, sending quit");
                        self.send_message(QUIT_COMMAND).await;
                        break;
                    }
                },
            }
        }
    }

    /// Send one line to the server
    ///
    /// A write failure marks the connection disconnected instead of
    /// propagating; returns whether the line was written.
    pub async fn send_message(&mut self, text: &str) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        match writer.send(text).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Send failed: {}", e);
                self.state.mark_disconnected();
                false
            }
        }
    }

    /// Mark disconnected and close the socket if still open
    ///
    /// Safe to call any number of times; close errors are swallowed.
    pub async fn disconnect(&mut self) {
        self.state.mark_disconnected();
        self.reader.take();

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = SinkExt::<&str>::close(&mut writer).await {
                debug!("Error closing connection: {}", e);
            }
        }
    }
}

/// Resolves on Ctrl-C, or never if the signal handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Print server lines until the connection ends or is marked disconnected
async fn receive_loop<W>(
    mut reader: FramedRead<OwnedReadHalf, LinesCodec>,
    mut output: W,
    state: ConnectionState,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = state.disconnected() => break,
            frame = reader.next() => match frame {
                Some(Ok(line)) => {
                    if let Err(e) = write_line(&mut output, &line).await {
                        debug!("Output closed: {}", e);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Receive error: {}", e);
                    break;
                }
                None => {
                    debug!("Server closed the connection");
                    break;
                }
            },
        }
    }

    state.mark_disconnected();
}

async fn write_line<W>(output: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

/// Read stdin lines on a dedicated thread
///
/// Blocking console reads stay off the runtime; the thread ends with stdin
/// or when the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER_SIZE);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    rx
}
