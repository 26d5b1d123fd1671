//! Sharded Storage Engine with Lazy Expiry
//!
//! This module implements the key-value store behind every command.
//! Keys are spread over a fixed number of shards, each guarded by its own
//! `RwLock`, so commands on unrelated keys never wait on each other.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: one lock per shard; a key always maps to the same shard.
//! 2. **FNV-1a Routing**: shard selection is a pure function of the key bytes.
//! 3. **Lazy Expiry**: TTLs are checked on read only. Reads never mutate the map;
//!    an expired entry stays resident until it is overwritten or deleted.
//! 4. **Snapshot Copies**: snapshots copy shard contents out under the lock and
//!    serialize them after the lock is released.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲ fnv1a(key) % N
//! ```

use bytes::Bytes;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Default number of shards.
pub const NUM_SHARDS: usize = 64;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the key bytes.
#[inline]
pub fn fnv1a(key: &[u8]) -> u64 {
    key.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// How [`StorageEngine::snapshot`] trades consistency for latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotConsistency {
    /// Copy one shard at a time, releasing its lock before taking the next.
    /// Each shard is internally consistent; shards may reflect different instants.
    #[default]
    PerShard,
    /// Hold every shard's read lock while copying. Writers stall for the
    /// duration of the copy, but the result reflects a single instant.
    Global,
}

/// A stored value with optional expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored payload
    pub value: Bytes,
    /// Absolute expiry instant (None = never expires)
    pub expires_at: Option<Instant>,
    /// When the entry was last written
    pub set_at: Instant,
}

impl Entry {
    /// Creates an entry written now.
    ///
    /// A TTL too large to represent as an `Instant` is treated as no expiry.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            set_at: now,
        }
    }

    /// Checks whether the entry is expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Overwrites this entry in place.
    fn overwrite(&mut self, value: Bytes, ttl: Option<Duration>) {
        *self = Entry::new(value, ttl);
    }
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard owning a disjoint subset of the keys.
#[derive(Debug, Default)]
struct Shard {
    entries: RwLock<ShardMap>,
}

impl Shard {
    // Every critical section below leaves the map consistent, so a poisoned
    // lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The key-value store shared by all connections.
///
/// Wrap it in an `Arc` and hand a clone to each worker; every method takes
/// `&self` and is safe to call from any thread.
///
/// # Example
///
/// ```
/// use snapkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.insert(Bytes::from("name"), Bytes::from("ferris"), None);
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("ferris")));
///
/// engine.insert(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// assert_eq!(engine.len(), 2);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an engine with [`NUM_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(NUM_SHARDS)
    }

    /// Creates an engine with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| Shard::default()).collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        (fnv1a(key) % self.shards.len() as u64) as usize
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Inserts or overwrites `key`, resetting its write time and expiry.
    ///
    /// # Returns
    ///
    /// `true` if no live entry existed for the key beforehand.
    pub fn insert(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        let mut data = self.shard(&key).write();

        match data.entry(key) {
            MapEntry::Occupied(mut slot) => {
                let was_live = !slot.get().is_expired();
                slot.get_mut().overwrite(value, ttl);
                !was_live
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(value, ttl));
                true
            }
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key is missing or its TTL has elapsed. Expired
    /// entries are only detected here, never removed.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let data = self.shard(key).read();
        data.get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Gets a copy of the full entry for a key, if it is live.
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let data = self.shard(key).read();
        data.get(key).filter(|entry| !entry.is_expired()).cloned()
    }

    /// Removes a key.
    ///
    /// # Returns
    ///
    /// `true` if a live entry was removed. Expired leftovers are removed too
    /// but do not count.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.shard(key).write();
        data.remove(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Removes several keys, returning how many live entries were removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Number of live entries.
    ///
    /// Each shard is counted under its own read lock.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let data = shard.read();
                let now = Instant::now();
                data.values().filter(|entry| !entry.is_expired_at(now)).count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every live `(key, value)` pair out of the store.
    ///
    /// No ordering is guaranteed. See [`SnapshotConsistency`] for what
    /// "point in time" means under each mode.
    pub fn snapshot(&self, consistency: SnapshotConsistency) -> Vec<(Bytes, Bytes)> {
        let mut out = Vec::new();

        match consistency {
            SnapshotConsistency::PerShard => {
                for shard in &self.shards {
                    let data = shard.read();
                    collect_live(&data, Instant::now(), &mut out);
                }
            }
            SnapshotConsistency::Global => {
                // Locks are taken in index order; writers only ever hold one.
                let guards: Vec<_> = self.shards.iter().map(Shard::read).collect();
                let now = Instant::now();
                for data in &guards {
                    collect_live(data, now, &mut out);
                }
            }
        }

        out
    }
}

fn collect_live(data: &ShardMap, now: Instant, out: &mut Vec<(Bytes, Bytes)>) {
    out.extend(
        data.iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone())),
    );
}
