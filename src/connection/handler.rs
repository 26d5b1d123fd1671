//! Connection Handler Module
//!
//! This module runs one client connection. Each connection is owned by its
//! own task, which loops reading bytes, decoding commands, executing them
//! and writing replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Reading ──► Decoding ──► Dispatching ──► Replying
//!    ▲            │                            │
//!    │  incomplete│                            │
//!    └────────────┴────────────────────────────┘
//!
//! Closed on: EOF, I/O error, QUIT, or the server's shutdown signal
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a `BytesMut`. TCP is a stream, so one read
//! may hold half a command or several pipelined ones; the decoder only
//! hands out complete frames and leaves the rest buffered.

use crate::commands::{is_quit, CommandHandler};
use crate::config::DEFAULT_MAX_BUFFER_SIZE;
use crate::protocol::{CommandDecoder, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Counts a connection as active until dropped, including when its task
/// is aborted.
struct ActiveConnection(Arc<ConnectionStats>);

impl ActiveConnection {
    fn open(stats: Arc<ConnectionStats>) -> Self {
        stats.connection_opened();
        Self(stats)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a single client connection.
///
/// Generic over the stream so anything readable and writable can be served;
/// the server uses `TcpStream`.
pub struct ConnectionHandler<S> {
    /// The client stream, with buffered writes
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    /// Incremental command decoder
    decoder: CommandDecoder,

    /// The command handler (shared state behind it)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Flips to `true` when the server is stopping
    shutdown: watch::Receiver<bool>,

    /// Limit on `buffer` before the connection is dropped
    max_buffer_size: usize,

    _active: ActiveConnection,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    /// * `shutdown` - Receiver for the server's shutdown signal
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let active = ActiveConnection::open(Arc::clone(&stats));

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            decoder: CommandDecoder::new(),
            command_handler,
            stats,
            shutdown,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            _active: active,
        }
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Runs the connection until the client leaves, an error occurs, or the
    /// server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            while let Some(args) = self.decoder.decode(&mut self.buffer) {
                let quit = args.first().is_some_and(|name| is_quit(name));

                let response = self.command_handler.execute(args).await;
                self.stats.command_processed();
                self.send_response(&response).await?;

                if quit || *self.shutdown.borrow() {
                    return Ok(());
                }
            }

            tokio::select! {
                result = read_more_data(&mut self.stream, &mut self.buffer, self.max_buffer_size) => {
                    let n = result?;
                    self.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
                _ = self.shutdown.changed() => {
                    debug!(client = %self.addr, "Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Reads more data from the stream into the buffer.
async fn read_more_data<S>(
    stream: &mut BufWriter<S>,
    buffer: &mut BytesMut,
    max_buffer_size: usize,
) -> Result<usize, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if buffer.len() >= max_buffer_size {
        error!(size = buffer.len(), "Buffer size limit exceeded");
        return Err(ConnectionError::BufferFull);
    }

    if buffer.capacity() - buffer.len() < 1024 {
        buffer.reserve(INITIAL_BUFFER_SIZE);
    }

    let n = stream.get_mut().read_buf(buffer).await?;

    if n == 0 {
        return if buffer.is_empty() {
            Err(ConnectionError::ClientDisconnected)
        } else {
            Err(ConnectionError::UnexpectedEof)
        };
    }

    Ok(n)
}
