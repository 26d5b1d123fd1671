//! Command Handler Module
//!
//! This module maps decoded commands onto the storage engine, the runtime
//! configuration and the snapshot writer, and builds the reply for each.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - `+PONG`, or the message as a bulk string
//! - `ECHO message` - the message as a bulk string
//! - `SET key value [PX milliseconds | EX seconds]` - `+OK`
//! - `GET key` - the value, or a null bulk string if absent or expired
//! - `DEL key [key ...]` - number of keys removed
//! - `DBSIZE` - number of live keys
//! - `CONFIG GET parameter` - `[parameter, value]`, or an empty array
//! - `SAVE` - write a snapshot; `+OK` or an error reply
//! - `QUIT` - `+OK`; the connection closes afterwards
//!
//! Anything else gets `+PONG`.
//!
//! Command names are case-insensitive. Arguments after the ones a command
//! understands are ignored.

use crate::config::RuntimeConfig;
use crate::protocol::RespValue;
use crate::snapshot::SnapshotWriter;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Returns true if `name` is the QUIT command.
pub fn is_quit(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"QUIT")
}

fn wrong_args(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

/// Parses a strictly positive integer argument.
fn parse_positive(arg: &[u8]) -> Option<u64> {
    std::str::from_utf8(arg)
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
}

/// Executes commands against the shared server state.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    config: Arc<RuntimeConfig>,
    snapshots: Arc<SnapshotWriter>,
}

impl CommandHandler {
    pub fn new(
        storage: Arc<StorageEngine>,
        config: Arc<RuntimeConfig>,
        snapshots: Arc<SnapshotWriter>,
    ) -> Self {
        Self {
            storage,
            config,
            snapshots,
        }
    }

    /// Executes a command and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `args` - The decoded command; `args[0]` is the command name
    pub async fn execute(&self, args: Vec<Bytes>) -> RespValue {
        let Some((name, rest)) = args.split_first() else {
            return RespValue::error("ERR empty command");
        };

        let cmd = String::from_utf8_lossy(name).to_ascii_uppercase();

        match cmd.as_str() {
            "SAVE" => self.cmd_save().await,
            _ => self.dispatch(&cmd, rest),
        }
    }

    /// Dispatches every command that completes without blocking.
    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> RespValue {
        match cmd {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "DBSIZE" => self.cmd_dbsize(),
            "CONFIG" => self.cmd_config(args),
            "QUIT" => RespValue::ok(),
            _ => RespValue::pong(),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        match args.first() {
            Some(msg) => RespValue::bulk_string(msg.clone()),
            None => RespValue::pong(),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        match args.first() {
            Some(msg) => RespValue::bulk_string(msg.clone()),
            None => wrong_args("echo"),
        }
    }

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        let [key, value, options @ ..] = args else {
            return wrong_args("set");
        };

        let mut ttl = None;
        let mut i = 0;
        while i < options.len() {
            let millis_per_unit = if options[i].eq_ignore_ascii_case(b"PX") {
                1
            } else if options[i].eq_ignore_ascii_case(b"EX") {
                1000
            } else {
                i += 1;
                continue;
            };

            // A trailing PX/EX with no amount is ignored like any other extra
            let Some(amount) = options.get(i + 1) else {
                break;
            };

            match parse_positive(amount) {
                Some(n) => ttl = Some(Duration::from_millis(n.saturating_mul(millis_per_unit))),
                None => return RespValue::error("ERR invalid expire time in 'set' command"),
            }
            i += 2;
        }

        self.storage.insert(key.clone(), value.clone(), ttl);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let Some(key) = args.first() else {
            return wrong_args("get");
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return wrong_args("del");
        }

        RespValue::integer(self.storage.delete_many(args) as i64)
    }

    /// DBSIZE
    fn cmd_dbsize(&self) -> RespValue {
        RespValue::integer(self.storage.len() as i64)
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[Bytes]) -> RespValue {
        let Some((subcommand, rest)) = args.split_first() else {
            return wrong_args("config");
        };

        if !subcommand.eq_ignore_ascii_case(b"GET") {
            return RespValue::error(format!(
                "ERR unknown CONFIG subcommand '{}'",
                String::from_utf8_lossy(subcommand)
            ));
        }

        let Some(param) = rest.first() else {
            return wrong_args("config|get");
        };

        match self.config.get(&String::from_utf8_lossy(param)) {
            Some(value) => RespValue::array(vec![
                RespValue::bulk_string(param.clone()),
                RespValue::bulk_string(Bytes::copy_from_slice(value.as_bytes())),
            ]),
            None => RespValue::array(vec![]),
        }
    }

    /// SAVE
    ///
    /// The file I/O runs on the blocking pool so this worker's runtime
    /// thread stays free.
    async fn cmd_save(&self) -> RespValue {
        let storage = Arc::clone(&self.storage);
        let config = Arc::clone(&self.config);
        let snapshots = Arc::clone(&self.snapshots);

        let result =
            tokio::task::spawn_blocking(move || snapshots.save(&storage, &config)).await;

        match result {
            Ok(Ok(_)) => RespValue::ok(),
            Ok(Err(e)) => {
                warn!(error = %e, "SAVE failed");
                RespValue::error(format!("ERR {}", e))
            }
            Err(e) => {
                warn!(error = %e, "SAVE task did not complete");
                RespValue::error("ERR snapshot task did not complete")
            }
        }
    }
}
