//! Incremental RESP Command Parser
//!
//! This module turns the raw byte stream of a connection into commands,
//! each an ordered list of binary-safe arguments (argument 0 is the name).
//!
//! ## Accepted Frames
//!
//! 1. **Array**: `*<N>\r\n` followed by `N` bulk strings `$<len>\r\n<data>\r\n`
//! 2. **Single bulk**: one `$<len>\r\n<data>\r\n` with no array header,
//!    treated as a one-argument command
//! 3. **Inline**: any other line, split on whitespace (`PING\r\n`)
//!
//! ## How the Parser Works
//!
//! [`RespParser::parse`] looks at the start of a buffer and returns:
//! - `Ok(Some((args, consumed)))` - a complete command occupying `consumed` bytes
//! - `Ok(None)` - the frame is not complete yet, read more data
//! - `Err(ParseError)` - the frame at the start of the buffer is malformed
//!
//! [`CommandDecoder`] wraps the parser for a live connection. It consumes
//! parsed bytes from a `BytesMut` and recovers from malformed frames by
//! dropping the offending line. A bad array frame also leaves its elements
//! behind, so after one the decoder skips whole lines until the next line
//! that starts an array. Framing errors never reach the client.

use crate::protocol::types::{prefix, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tracing::{trace, warn};

/// Errors that can occur while parsing a command frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A length or count header is not a number
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// A header line is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array count is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// An array element does not start with `$`
    #[error("expected bulk string, found prefix {0:#04x}")]
    ExpectedBulkString(u8),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The frame exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Longest header or inline line accepted (64 KB, same as Redis)
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Upper bound on argument slots reserved ahead of parsing.
const MAX_PREALLOCATED_ARGS: usize = 1024;

/// Stateless parser for one command frame at the start of a buffer.
///
/// # Example
///
/// ```
/// use snapkv::protocol::RespParser;
/// use bytes::Bytes;
///
/// let (args, consumed) = RespParser::new()
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(args, vec![Bytes::from("GET"), Bytes::from("name")]);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RespParser;

impl RespParser {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to parse one command from the start of `buf`.
    ///
    /// An empty command (`*0\r\n` or a blank inline line) parses to an empty
    /// argument list.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        match buf.first() {
            None => Ok(None),
            Some(&prefix::ARRAY) => self.parse_array(buf),
            Some(&prefix::BULK_STRING) => Ok(self
                .parse_bulk_string(buf)?
                .map(|(data, consumed)| (vec![data], consumed))),
            Some(_) => self.parse_inline(buf),
        }
    }

    /// Parses an array of bulk strings: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, mut consumed) = match parse_header(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut args = Vec::with_capacity(count.min(MAX_PREALLOCATED_ARGS));

        for _ in 0..count {
            let rest = &buf[consumed..];
            match rest.first() {
                None => return Ok(None),
                Some(&prefix::BULK_STRING) => {}
                Some(&other) => return Err(ParseError::ExpectedBulkString(other)),
            }

            match self.parse_bulk_string(rest)? {
                Some((data, element_consumed)) => {
                    args.push(data);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((args, consumed)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (length, data_start) = match parse_header(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((data, total_needed)))
    }

    /// Parses a whitespace-separated inline command line.
    fn parse_inline(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let line_end = match find_line_end(buf)? {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let line = std::str::from_utf8(&buf[..line_end])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        let args = line
            .split_whitespace()
            .map(|part| Bytes::copy_from_slice(part.as_bytes()))
            .collect();

        Ok(Some((args, line_end + 2)))
    }
}

/// Parses the integer on a `<prefix><n>\r\n` header line.
///
/// Returns the integer and the number of bytes the header occupies.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_line_end(&buf[1..])? {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let text = std::str::from_utf8(&buf[1..1 + end])
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    let n: i64 = text
        .parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))?;

    // +1 for prefix, +2 for CRLF
    Ok(Some((n, 1 + end + 2)))
}

/// Finds the CRLF ending a header or inline line.
///
/// Only the first [`MAX_INLINE_SIZE`] bytes are searched, so a peer that
/// never sends a line ending costs a bounded scan per read.
fn find_line_end(buf: &[u8]) -> ParseResult<Option<usize>> {
    let limit = MAX_INLINE_SIZE + 2;
    match find_crlf(&buf[..buf.len().min(limit)]) {
        Some(pos) => Ok(Some(pos)),
        None if buf.len() >= limit => Err(ParseError::MessageTooLarge {
            size: buf.len(),
            max: MAX_INLINE_SIZE,
        }),
        None => Ok(None),
    }
}

/// Finds the position of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Parses a single command from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    RespParser::new().parse(buf)
}

/// Streaming decoder that pulls complete commands out of a read buffer.
///
/// # Example
///
/// ```
/// use snapkv::protocol::CommandDecoder;
/// use bytes::{Bytes, BytesMut};
///
/// let mut decoder = CommandDecoder::new();
/// let mut buffer = BytesMut::from(&b"*1\r\n$4\r\nPI"[..]);
/// assert!(decoder.decode(&mut buffer).is_none());
///
/// buffer.extend_from_slice(b"NG\r\n");
/// assert_eq!(decoder.decode(&mut buffer), Some(vec![Bytes::from("PING")]));
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct CommandDecoder {
    parser: RespParser,
    /// Set after a malformed array frame until the next array header is found
    resyncing: bool,
    /// Set while the rest of a dropped line has not arrived yet
    in_dropped_line: bool,
    /// Number of malformed frames discarded so far
    discarded: u64,
}

impl CommandDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the next complete command in `buf`.
    ///
    /// Returns `None` when `buf` holds no complete frame; the partial bytes
    /// are left in place for the next call.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<Vec<Bytes>> {
        loop {
            if self.in_dropped_line && !self.finish_dropped_line(buf) {
                return None;
            }
            if self.resyncing && !self.resync(buf) {
                return None;
            }

            match self.parser.parse(buf) {
                Ok(Some((args, consumed))) => {
                    buf.advance(consumed);
                    trace!(consumed, remaining = buf.len(), "Parsed command");
                    if args.is_empty() {
                        continue;
                    }
                    return Some(args);
                }
                Ok(None) => {
                    trace!(buffered = buf.len(), "Incomplete frame, need more data");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Discarding malformed frame");
                    self.discarded += 1;
                    // The elements of a bad array would otherwise parse as commands.
                    self.resyncing = buf.first() == Some(&prefix::ARRAY);
                    self.drop_line(buf);
                }
            }
        }
    }

    /// Whether the decoder is skipping input after a malformed frame.
    pub fn is_resyncing(&self) -> bool {
        self.resyncing || self.in_dropped_line
    }

    pub fn discarded_frames(&self) -> u64 {
        self.discarded
    }

    /// Drops the first line of `buf`, remembering if its end is still to come.
    fn drop_line(&mut self, buf: &mut BytesMut) {
        if !skip_line(buf) {
            self.in_dropped_line = true;
        }
    }

    /// Drops the remainder of a line whose start was already dropped.
    fn finish_dropped_line(&mut self, buf: &mut BytesMut) -> bool {
        if skip_line(buf) {
            self.in_dropped_line = false;
        }
        !self.in_dropped_line
    }

    /// Skips whole lines until one starts with `*`.
    ///
    /// Returns `true` once `buf` starts at an array header.
    fn resync(&mut self, buf: &mut BytesMut) -> bool {
        loop {
            match buf.first() {
                None => return false,
                Some(&prefix::ARRAY) => {
                    self.resyncing = false;
                    return true;
                }
                Some(_) => {
                    self.drop_line(buf);
                    if self.in_dropped_line {
                        return false;
                    }
                }
            }
        }
    }
}

/// Drops the first line (through its CRLF) from the buffer.
///
/// Returns `false` if there is no CRLF yet. Everything is dropped then,
/// except a trailing `\r` that may pair with the next read.
fn skip_line(buf: &mut BytesMut) -> bool {
    match find_crlf(buf) {
        Some(end) => {
            buf.advance(end + 2);
            true
        }
        None => {
            let keep = usize::from(buf.last() == Some(&b'\r'));
            buf.advance(buf.len() - keep);
            false
        }
    }
}
