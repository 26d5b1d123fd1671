//! Storage Engine Module
//!
//! This module provides the key-value store for snapkv: a sharded,
//! lock-per-shard map with lazy TTL expiry and copy-out snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **TTL Support**: Keys can carry a relative expiry
//! - **Lazy Expiry**: Expired keys read as absent; nothing sweeps them
//! - **Snapshots**: Per-shard or global copy of all live entries
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::{SnapshotConsistency, StorageEngine};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! engine.insert(Bytes::from("name"), Bytes::from("ferris"), None);
//!
//! let pairs = engine.snapshot(SnapshotConsistency::PerShard);
//! assert_eq!(pairs, vec![(Bytes::from("name"), Bytes::from("ferris"))]);
//! ```

pub mod engine;

pub use engine::{fnv1a, Entry, SnapshotConsistency, StorageEngine, NUM_SHARDS};
