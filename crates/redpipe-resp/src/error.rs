//! Error types for RESP parsing.

use thiserror::Error;

/// Errors that can occur while parsing the RESP byte stream.
///
/// All of these mean the stream can no longer be resynchronized; a
/// connection that observes one must be torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unexpected end of input while parsing a single value
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// Invalid type marker encountered
    #[error("Invalid type marker: {0:?}")]
    InvalidTypeMarker(char),

    /// Invalid format for the current type
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Payload of an integer value is not a valid signed decimal
    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid bulk string length
    #[error("Invalid bulk string length: {0}")]
    InvalidBulkStringLength(i64),

    /// Invalid array length
    #[error("Invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Declared bulk string length exceeds the configured maximum
    #[error("Bulk string length {0} exceeds maximum of {1} bytes")]
    BulkStringTooLarge(i64, usize),

    /// Declared array length exceeds the configured maximum
    #[error("Array length {0} exceeds maximum of {1} elements")]
    ArrayTooLarge(i64, usize),
}

impl From<std::str::Utf8Error> for ParseError {
    fn from(e: std::str::Utf8Error) -> Self {
        ParseError::InvalidInteger(e.to_string())
    }
}
