//! # snapkv - A Small In-Memory Key-Value Server
//!
//! snapkv speaks a subset of the Redis protocol (RESP) over TCP. It keeps
//! string keys and values in memory with optional per-key expiry, and can
//! write a point-in-time snapshot of the data set to disk on request.
//!
//! ## Features
//!
//! - **Redis-Compatible**: array and inline RESP requests, usable from `redis-cli`
//! - **Sharded Storage**: 64 independent `RwLock`s, selected by FNV-1a hash
//! - **TTL Support**: expiry checked lazily on every read
//! - **Snapshots**: `SAVE` writes an RDB-style file with an atomic rename
//! - **Graceful Shutdown**: the server waits for every connection to finish
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               snapkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Acceptor)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──┬───────┬──┘                  │
//! │                            │              │       │                     │
//! │                            ▼              ▼       ▼                     │
//! │                     ┌─────────────┐  ┌─────────┐ ┌──────────────┐       │
//! │                     │   RESP      │  │ Storage │ │  Snapshot    │       │
//! │                     │   Decoder   │  │ Engine  │ │  Writer      │       │
//! │                     └─────────────┘  └─────────┘ └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapkv::config::{RuntimeConfig, ServerConfig};
//! use snapkv::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new()
//!         .with_port(6379)
//!         .with_runtime(RuntimeConfig::new().with_dir("/tmp/data").with_dbfilename("dump.rdb"));
//!
//!     let server = Server::bind(config).await?;
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [PX milliseconds | EX seconds]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `DBSIZE`
//! - `CONFIG GET parameter`
//! - `SAVE`
//! - `QUIT`
//!
//! Anything else is answered with `+PONG`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP reply encoding and incremental request decoding
//! - [`storage`]: thread-safe sharded store with TTL support
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client read/execute/reply loop
//! - [`server`]: TCP acceptor and shutdown coordination
//! - [`snapshot`]: RDB-style snapshot files
//! - [`config`]: server and runtime configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{RuntimeConfig, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{ConnectionHandler, ConnectionStats};
pub use protocol::{CommandDecoder, ParseError, RespValue};
pub use server::{Server, ServerError, ShutdownHandle};
pub use snapshot::{SnapshotError, SnapshotWriter};
pub use storage::{SnapshotConsistency, StorageEngine};

/// Version of snapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
