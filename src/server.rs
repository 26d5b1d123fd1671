//! TCP acceptor and shutdown coordination.
//!
//! The [`Server`] owns the listening socket and every connection worker it
//! spawns. It moves through three states:
//!
//! ```text
//! Listening ──shutdown()──► Stopping ──all workers joined──► Stopped
//! ```
//!
//! `Stopping` closes the listener and broadcasts the shutdown signal over a
//! `watch` channel. Workers observe it between commands or while waiting
//! for input, finish what they are doing and exit. [`Server::run`] returns
//! only after the worker `JoinSet` is empty.

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{ConnectionHandler, ConnectionStats};
use crate::snapshot::SnapshotWriter;
use crate::storage::StorageEngine;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of the acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    Stopping,
    Stopped,
}

/// Requests a graceful stop of a running [`Server`].
///
/// Cheap to clone. Calling [`shutdown`](Self::shutdown) more than once is
/// harmless.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Accepts connections and serves each one on its own task.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    storage: Arc<StorageEngine>,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_timeout: Option<Duration>,
    max_buffer_size: usize,
}

impl Server {
    /// Binds the listener and builds the shared state from `config`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_storage(config, Arc::new(StorageEngine::new())).await
    }

    /// Like [`bind`](Self::bind), serving an existing store.
    pub async fn bind_with_storage(
        config: ServerConfig,
        storage: Arc<StorageEngine>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let snapshots = Arc::new(SnapshotWriter::new(config.snapshot_consistency));
        let commands = CommandHandler::new(
            Arc::clone(&storage),
            Arc::new(config.runtime),
            snapshots,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            local_addr,
            storage,
            commands,
            stats: Arc::new(ConnectionStats::new()),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            max_buffer_size: config.max_buffer_size,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Serves connections until shutdown is requested, then waits for every
    /// worker to exit.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut workers = JoinSet::new();

        info!(addr = %self.local_addr, state = ?ServerState::Listening, "Listening");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let worker = ConnectionHandler::new(
                            stream,
                            addr,
                            self.commands.clone(),
                            Arc::clone(&self.stats),
                            self.shutdown_tx.subscribe(),
                        )
                        .with_max_buffer_size(self.max_buffer_size);

                        workers.spawn(async move {
                            let _ = worker.run().await;
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    log_worker_exit(finished);
                }
            }
        }

        // No new connections from here on.
        drop(self.listener);
        self.shutdown_tx.send_replace(true);
        info!(
            state = ?ServerState::Stopping,
            active = workers.len(),
            "Shutdown requested, waiting for connections to finish"
        );

        let drained = match self.shutdown_timeout {
            Some(limit) => tokio::time::timeout(limit, join_all(&mut workers))
                .await
                .is_ok(),
            None => {
                join_all(&mut workers).await;
                true
            }
        };

        if !drained {
            warn!(remaining = workers.len(), "Shutdown timeout elapsed, aborting workers");
            workers.abort_all();
            join_all(&mut workers).await;
        }

        info!(
            state = ?ServerState::Stopped,
            connections = self.stats.connections_accepted.load(Ordering::Relaxed),
            commands = self.stats.commands_processed.load(Ordering::Relaxed),
            bytes_read = self.stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = self.stats.bytes_written.load(Ordering::Relaxed),
            "Server stopped"
        );

        Ok(())
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(finished) = workers.join_next().await {
        log_worker_exit(finished);
    }
}

fn log_worker_exit(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Connection worker panicked"),
        Err(e) => debug!(error = %e, "Connection worker cancelled"),
    }
}
