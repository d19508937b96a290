//! # redpipe-resp - RESP2 wire protocol
//!
//! An incremental parser and encoder for the RESP2 protocol used by Redis
//! clients: type-tagged, length-prefixed, CRLF-delimited and binary-safe.
//!
//! The parser is a resumable state machine driven by an explicit frame
//! stack, so it can be fed arbitrarily fragmented network reads and never
//! loses state at a chunk boundary. Nesting depth is bounded only by the
//! configured array limit, never by the call stack.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::from(&b"+OK\r\n"[..]);
//! let reply = redpipe_resp::parse(&mut buf).unwrap();
//! assert_eq!(reply.as_str(), Some("OK"));
//! ```

mod encode;
mod error;
mod parser;
mod utils;
mod value;

pub use encode::Encode;
pub use encode::encode_command;
pub use error::ParseError;
pub use parser::ParseOutcome;
pub use parser::Parser;
pub use parser::ParserLimits;
pub use parser::parse;
pub use value::Value;
