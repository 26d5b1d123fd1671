//! RESP Protocol Implementation
//!
//! This module covers both directions of the wire protocol.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply enum and its serialization
//! - `parser`: incremental command parser and the resyncing `CommandDecoder`
//!
//! ## Example
//!
//! ```
//! use snapkv::protocol::{CommandDecoder, RespValue};
//! use bytes::{Bytes, BytesMut};
//!
//! // Decoding an incoming command
//! let mut decoder = CommandDecoder::new();
//! let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let args = decoder.decode(&mut buffer).unwrap();
//! assert_eq!(args[0], Bytes::from("GET"));
//!
//! // Encoding a reply
//! let response = RespValue::bulk_string(Bytes::from("ferris"));
//! assert_eq!(response.serialize(), b"$6\r\nferris\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_command, CommandDecoder, ParseError, ParseResult, RespParser};
pub use types::RespValue;
