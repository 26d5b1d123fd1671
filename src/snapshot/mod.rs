//! Snapshot Module
//!
//! This module writes a point-in-time copy of the store to disk when a
//! client sends `SAVE`. The file follows the RDB layout closely enough for
//! standard tooling to recognize it; there is no loader.
//!
//! ## Modules
//!
//! - `format`: the byte layout (header, aux fields, db selector, records)
//! - `writer`: copy-out, temp file, fsync and atomic rename
//!
//! ## Example
//!
//! ```
//! use snapkv::config::RuntimeConfig;
//! use snapkv::snapshot::SnapshotWriter;
//! use snapkv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = RuntimeConfig::new()
//!     .with_dir(dir.path().to_string_lossy())
//!     .with_dbfilename("dump.rdb");
//!
//! let storage = StorageEngine::new();
//! storage.insert(Bytes::from("foo"), Bytes::from("bar"), None);
//!
//! let summary = SnapshotWriter::default().save(&storage, &config).unwrap();
//! assert_eq!(summary.entries, 1);
//! ```

pub mod format;
pub mod writer;

pub use writer::{SnapshotError, SnapshotSummary, SnapshotWriter};
