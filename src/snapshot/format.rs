//! RDB-style snapshot encoding.
//!
//! ```text
//! "REDIS0011"
//! 0xFA <len>"redis-ver"  <len>"7.2.0"
//! 0xFA <len>"redis-bits" <len>"64"
//! 0xFA <len>"ctime"      <len><unix seconds>
//! 0xFE <db index>
//! 0xFB <live entries> <entries with expiry>
//! 0x00 <len>key <len>value        (once per entry)
//! 0xFF <8-byte checksum, zero = disabled>
//! ```
//!
//! Lengths use the RDB variable-width encoding: the top two bits of the
//! first byte select a 6-bit, 14-bit, 32-bit or 64-bit form.

use bytes::Bytes;
use std::io::{self, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Magic prefix of every snapshot file
pub const MAGIC: &[u8] = b"REDIS";

/// Four-digit format version following the magic
pub const RDB_VERSION: &[u8] = b"0011";

/// Server version recorded in the `redis-ver` aux field
pub const COMPAT_VERSION: &str = "7.2.0";

/// Type marker for a plain string value
pub const TYPE_STRING: u8 = 0x00;

/// Section markers
pub mod opcode {
    pub const AUX: u8 = 0xFA;
    pub const RESIZE_DB: u8 = 0xFB;
    pub const SELECT_DB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

const LEN_6BIT_MAX: u64 = (1 << 6) - 1;
const LEN_14BIT_MAX: u64 = (1 << 14) - 1;
const LEN_32BIT: u8 = 0x80;
const LEN_64BIT: u8 = 0x81;

/// Writes `len` in RDB length encoding.
pub fn write_length<W: Write>(w: &mut W, len: u64) -> io::Result<()> {
    if len <= LEN_6BIT_MAX {
        w.write_all(&[len as u8])
    } else if len <= LEN_14BIT_MAX {
        w.write_all(&[0x40 | (len >> 8) as u8, len as u8])
    } else if len <= u64::from(u32::MAX) {
        w.write_all(&[LEN_32BIT])?;
        w.write_all(&(len as u32).to_be_bytes())
    } else {
        w.write_all(&[LEN_64BIT])?;
        w.write_all(&len.to_be_bytes())
    }
}

/// Writes a length-prefixed string.
pub fn write_string<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    write_length(w, data.len() as u64)?;
    w.write_all(data)
}

fn write_aux<W: Write>(w: &mut W, key: &str, value: &str) -> io::Result<()> {
    w.write_all(&[opcode::AUX])?;
    write_string(w, key.as_bytes())?;
    write_string(w, value.as_bytes())
}

/// Writes a complete snapshot of `entries` as database 0.
pub fn write_snapshot<W: Write>(
    w: &mut W,
    entries: &[(Bytes, Bytes)],
    created_at: SystemTime,
) -> io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(RDB_VERSION)?;

    let ctime = created_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    write_aux(w, "redis-ver", COMPAT_VERSION)?;
    write_aux(w, "redis-bits", "64")?;
    write_aux(w, "ctime", &ctime.to_string())?;

    w.write_all(&[opcode::SELECT_DB])?;
    write_length(w, 0)?;

    // TTLs are not persisted, so the expiring-keys hint is always zero.
    w.write_all(&[opcode::RESIZE_DB])?;
    write_length(w, entries.len() as u64)?;
    write_length(w, 0)?;

    for (key, value) in entries {
        w.write_all(&[TYPE_STRING])?;
        write_string(w, key)?;
        write_string(w, value)?;
    }

    w.write_all(&[opcode::EOF])?;
    w.write_all(&[0u8; 8])
}
