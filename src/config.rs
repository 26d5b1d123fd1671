//! Server and runtime configuration.
//!
//! [`RuntimeConfig`] holds the two values exposed through `CONFIG GET` and
//! consumed by `SAVE`. It is kept apart from the key space so configuration
//! never shows up in `GET`, `DBSIZE` or a snapshot. It is fixed once the
//! server starts and shared read-only behind an `Arc`.

use crate::storage::SnapshotConsistency;
use std::path::PathBuf;
use std::time::Duration;

/// Default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default cap on unparsed bytes buffered per connection (64 MB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Read-only parameters visible to clients.
///
/// # Example
///
/// ```
/// use snapkv::config::RuntimeConfig;
///
/// let config = RuntimeConfig::new()
///     .with_dir("/tmp/data")
///     .with_dbfilename("dump.rdb");
///
/// assert_eq!(config.get("DIR"), Some("/tmp/data"));
/// assert_eq!(config.get("maxmemory"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory snapshots are written into
    pub dir: Option<String>,
    /// File name of the snapshot inside `dir`
    pub dbfilename: Option<String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_dbfilename(mut self, name: impl Into<String>) -> Self {
        self.dbfilename = Some(name.into());
        self
    }

    /// Looks up a parameter by case-insensitive name.
    pub fn get(&self, param: &str) -> Option<&str> {
        if param.eq_ignore_ascii_case("dir") {
            self.dir.as_deref()
        } else if param.eq_ignore_ascii_case("dbfilename") {
            self.dbfilename.as_deref()
        } else {
            None
        }
    }

    /// Full path of the snapshot file, if both parts are set.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        match (&self.dir, &self.dbfilename) {
            (Some(dir), Some(name)) => Some(PathBuf::from(dir).join(name)),
            _ => None,
        }
    }
}

/// Everything needed to start a [`Server`](crate::server::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Parameters exposed through CONFIG GET and used by SAVE
    pub runtime: RuntimeConfig,
    /// How SAVE copies the store
    pub snapshot_consistency: SnapshotConsistency,
    /// Abort workers still running this long after shutdown starts.
    /// `None` waits for them indefinitely.
    pub shutdown_timeout: Option<Duration>,
    /// Per-connection cap on buffered, not yet decoded bytes
    pub max_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            runtime: RuntimeConfig::default(),
            snapshot_consistency: SnapshotConsistency::default(),
            shutdown_timeout: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_snapshot_consistency(mut self, consistency: SnapshotConsistency) -> Self {
        self.snapshot_consistency = consistency;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
