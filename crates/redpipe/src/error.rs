//! Connection-level error taxonomy.

use std::sync::Arc;

use redpipe_resp::ParseError;
use thiserror::Error;

/// Errors surfaced by a [`crate::Connection`].
///
/// The type is `Clone` so one fatal cause can resolve every outstanding
/// reply slot: `Protocol`, `Io`, `Closed` and `Timeout` are fatal and tear
/// the connection down, while `Server` is delivered only to the slot whose
/// command the server rejected.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed bytes on the wire; the stream cannot be resynchronized
    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Underlying transport read or write failure
    #[error("Transport error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The peer closed the stream
    #[error("Connection closed")]
    Closed,

    /// No inbound bytes arrived within the configured read timeout
    #[error("Read timed out")]
    Timeout,

    /// A reply arrived with no command outstanding
    #[error("Reply received with no outstanding command")]
    UnexpectedReply,

    /// An error reply from the server; not fatal, delivered to one caller
    #[error("Server error: {0}")]
    Server(String),

    /// The connection is in the terminal broken state; carries the cause
    #[error("Connection broken: {0}")]
    Broken(Arc<Error>),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    /// Whether this error tears down the connection when observed by the
    /// reader or writer.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Server(_))
    }

    /// The broken-connection error delivered to outstanding and future
    /// callers once this cause has shut the connection down.
    pub(crate) fn broken(cause: Arc<Error>) -> Error {
        Error::Broken(cause)
    }
}
