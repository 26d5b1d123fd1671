//! Command Handler Module
//!
//! This module receives decoded commands, executes them, and returns the
//! reply to send back.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandDecoder  │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<Bytes>
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └──┬──────┬────┬──┘
//!    │      │    │
//!    ▼      │    ▼
//! Storage   │  RuntimeConfig
//! Engine    ▼
//!     SnapshotWriter
//! ```

pub mod handler;

pub use handler::{is_quit, CommandHandler};
