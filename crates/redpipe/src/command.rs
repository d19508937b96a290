//! Request construction.

use bytes::Bytes;
use redpipe_resp::encode_command;

/// A single request: a command name followed by binary-safe arguments.
///
/// On the wire a request is always an array of bulk strings; a `Command`
/// can only ever encode to that shape.
///
/// ```rust
/// use redpipe::Command;
///
/// let cmd = Command::new("SET").arg("foo").arg("bar");
/// assert_eq!(cmd.name(), Some("SET"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![Bytes::copy_from_slice(name.as_ref())],
        }
    }

    /// Append one binary-safe argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// The command name, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.args.first().and_then(|n| std::str::from_utf8(n).ok())
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encode to the protocol's request shape.
    pub fn encode(&self) -> Bytes {
        encode_command(&self.args)
    }
}

impl<A: AsRef<[u8]>> FromIterator<A> for Command {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self {
            args: iter
                .into_iter()
                .map(|a| Bytes::copy_from_slice(a.as_ref()))
                .collect(),
        }
    }
}
