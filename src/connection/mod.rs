//! Connection Handler Module
//!
//! This module manages individual client connections. Each client is served
//! by its own task, so a slow or stuck client never holds up another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server (acceptor)                       │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn into JoinSet
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Decode RESP │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │         ▲                                     ▼             │
//! │         │                              ┌─────────────┐      │
//! │         └──────────────────────────────│ Send reply  │      │
//! │                                        └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: every complete command in the buffer is answered in order
//! - **Recovery**: malformed frames are skipped instead of dropping the client
//! - **Shutdown**: idle workers wake up on the server's shutdown signal
//! - **Statistics**: connection and command counters shared across workers
//!
//! ## Example
//!
//! ```ignore
//! use snapkv::connection::{ConnectionHandler, ConnectionStats};
//!
//! let (stream, addr) = listener.accept().await?;
//! let worker = ConnectionHandler::new(stream, addr, commands.clone(), stats.clone(), shutdown_rx.clone());
//! workers.spawn(worker.run());
//! ```

pub mod handler;

pub use handler::{ConnectionError, ConnectionHandler, ConnectionStats};
