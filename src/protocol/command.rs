//! Command definitions
//!
//! Represents requests sent to the server: a command name followed by
//! binary-safe arguments.

use bytes::Bytes;

/// A request: the command name plus its arguments, all binary-safe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    args: Vec<Bytes>,
}

impl CommandRequest {
    /// Start a request with the given command name
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![Bytes::copy_from_slice(name.as_ref())],
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args
            .extend(args.into_iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        self
    }

    /// Append an owned argument without copying
    pub fn push(&mut self, arg: Bytes) {
        self.args.push(arg);
    }

    /// The command name
    pub fn name(&self) -> &[u8] {
        self.args.first().map(|n| &n[..]).unwrap_or(&[])
    }

    /// True if the command name matches `name`, ignoring ASCII case
    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.as_bytes())
    }

    /// Name and arguments, in wire order
    pub fn parts(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of wire elements (name + arguments)
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    // =========================================================================
    // Fixed command table
    // =========================================================================

    pub fn ping() -> Self {
        Self::new("PING")
    }

    pub fn get(key: impl AsRef<[u8]>) -> Self {
        Self::new("GET").arg(key)
    }

    pub fn set(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self::new("SET").arg(key).arg(value)
    }

    pub fn del(key: impl AsRef<[u8]>) -> Self {
        Self::new("DEL").arg(key)
    }

    pub fn incr(key: impl AsRef<[u8]>) -> Self {
        Self::new("INCR").arg(key)
    }

    pub fn multi() -> Self {
        Self::new("MULTI")
    }

    pub fn exec() -> Self {
        Self::new("EXEC")
    }

    pub fn discard() -> Self {
        Self::new("DISCARD")
    }

    pub fn quit() -> Self {
        Self::new("QUIT")
    }

    /// `COMMAND`: the server's command table, for callers that want to
    /// inspect it. Nothing in this crate generates methods from it.
    pub fn command() -> Self {
        Self::new("COMMAND")
    }
}

/// Split a whitespace-separated line such as `SET foo bar` into a request.
/// A blank line yields an empty request, which the encoder rejects.
impl std::str::FromStr for CommandRequest {
    type Err = std::convert::Infallible;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let request = match words.next() {
            Some(name) => CommandRequest::new(name).args(words),
            None => CommandRequest { args: Vec::new() },
        };
        Ok(request)
    }
}

impl<A: AsRef<[u8]>> From<&[A]> for CommandRequest {
    fn from(parts: &[A]) -> Self {
        Self {
            args: parts
                .iter()
                .map(|p| Bytes::copy_from_slice(p.as_ref()))
                .collect(),
        }
    }
}

impl<A: AsRef<[u8]>, const N: usize> From<[A; N]> for CommandRequest {
    fn from(parts: [A; N]) -> Self {
        Self::from(&parts[..])
    }
}

impl<A: AsRef<[u8]>> From<Vec<A>> for CommandRequest {
    fn from(parts: Vec<A>) -> Self {
        Self::from(parts.as_slice())
    }
}
