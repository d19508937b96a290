//! # redpipe - pipelined RESP connection core
//!
//! The transport half of a Redis client: commands submitted through a
//! [`Connection`] are written to a duplex byte stream in submission order
//! while their replies are still in flight, and each parsed reply is
//! routed back to exactly the caller that issued the command. Push
//! notifications received while subscribed flow through a separate sink
//! instead of the reply queue.
//!
//! Wire-format concerns live in the [`redpipe_resp`] crate; this crate
//! owns ordering, correlation and failure propagation. Cluster topology,
//! connection pooling and typed command builders are deliberately out of
//! scope.
//!
//! ## Example
//!
//! ```rust,no_run
//! use redpipe::Command;
//! use redpipe::Connection;
//!
//! # async fn demo() -> Result<(), redpipe::Error> {
//! let conn = Connection::connect("127.0.0.1:6379").await?;
//!
//! // Pipelined: both commands are on the wire before either reply.
//! let set = conn.submit(Command::new("SET").arg("foo").arg("bar"))?;
//! let get = conn.submit(Command::new("GET").arg("foo"))?;
//!
//! set.await?;
//! let reply = get.await?;
//! assert_eq!(reply.as_str(), Some("bar"));
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod connection;
mod error;

pub use command::Command;
pub use config::ConnectionConfig;
pub use config::PushMatcher;
pub use connection::Connection;
pub use connection::ReplyHandle;
pub use error::Error;
pub use redpipe_resp::Value;
