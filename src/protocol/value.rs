//! Reply definitions
//!
//! Represents decoded replies from the server.

use std::fmt;

use bytes::Bytes;

use crate::config::StatusMode;
use crate::error::{RedwireError, ReplyError, Result};

/// A decoded RESP2 reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyValue {
    /// `+OK\r\n`
    Status(String),

    /// `-ERR message\r\n`
    Error(String),

    /// `:1000\r\n`
    Integer(i64),

    /// `$6\r\nfoobar\r\n`, `None` for `$-1\r\n`
    Bulk(Option<Bytes>),

    /// `*2\r\n...`, `None` for `*-1\r\n`
    Array(Option<Vec<ReplyValue>>),
}

impl ReplyValue {
    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn status(text: impl Into<String>) -> Self {
        ReplyValue::Status(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ReplyValue::Error(message.into())
    }

    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        ReplyValue::Bulk(Some(Bytes::copy_from_slice(data.as_ref())))
    }

    pub fn array(items: Vec<ReplyValue>) -> Self {
        ReplyValue::Array(Some(items))
    }

    pub fn null_bulk() -> Self {
        ReplyValue::Bulk(None)
    }

    pub fn null_array() -> Self {
        ReplyValue::Array(None)
    }

    // =========================================================================
    // Type checks
    // =========================================================================

    pub fn is_error(&self) -> bool {
        matches!(self, ReplyValue::Error(_))
    }

    pub fn is_status(&self) -> bool {
        matches!(self, ReplyValue::Status(_))
    }

    /// True for both the null bulk string and the null array.
    pub fn is_null(&self) -> bool {
        matches!(self, ReplyValue::Bulk(None) | ReplyValue::Array(None))
    }

    /// True if this is `text` as either a status or a bulk string.
    ///
    /// Used to recognise acknowledgments regardless of `StatusMode`.
    pub fn is_ack(&self, text: &str) -> bool {
        match self {
            ReplyValue::Status(s) => s == text,
            ReplyValue::Bulk(Some(b)) => b.as_ref() == text.as_bytes(),
            _ => false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Payload of a status, error or non-null bulk reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ReplyValue::Status(s) | ReplyValue::Error(s) => Some(s.as_bytes()),
            ReplyValue::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ReplyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ReplyValue]> {
        match self {
            ReplyValue::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Turn an error reply into `Err(RedwireError::Reply)`.
    pub fn into_result(self) -> Result<ReplyValue> {
        match self {
            ReplyValue::Error(message) => Err(RedwireError::Reply(ReplyError::new(message))),
            other => Ok(other),
        }
    }

    /// Apply a status presentation mode to this reply and everything nested
    /// inside it.
    pub fn apply_status_mode(mut self, mode: StatusMode) -> Self {
        if mode == StatusMode::Tagged {
            return self;
        }

        let mut stack: Vec<&mut ReplyValue> = vec![&mut self];
        while let Some(value) = stack.pop() {
            match value {
                ReplyValue::Status(text) => {
                    let text = std::mem::take(text);
                    *value = ReplyValue::Bulk(Some(Bytes::from(text)));
                }
                ReplyValue::Array(Some(items)) => stack.extend(items.iter_mut()),
                _ => {}
            }
        }
        self
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            ReplyValue::Status(s) => write!(f, "{}", s),
            ReplyValue::Error(e) => write!(f, "(error) {}", e),
            ReplyValue::Integer(n) => write!(f, "(integer) {}", n),
            ReplyValue::Bulk(Some(b)) => write!(f, "\"{}\"", b.escape_ascii()),
            ReplyValue::Bulk(None) | ReplyValue::Array(None) => write!(f, "(nil)"),
            ReplyValue::Array(Some(items)) if items.is_empty() => write!(f, "(empty array)"),
            ReplyValue::Array(Some(items)) => {
                let width = items.len().to_string().len();
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "\n{:indent$}", "", indent = indent)?;
                    }
                    write!(f, "{:>width$}) ", idx + 1, width = width)?;
                    item.write_indented(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders replies the way redis-cli does.
impl fmt::Display for ReplyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl From<i64> for ReplyValue {
    fn from(n: i64) -> Self {
        ReplyValue::Integer(n)
    }
}

impl From<&str> for ReplyValue {
    fn from(s: &str) -> Self {
        ReplyValue::bulk(s)
    }
}

impl From<Vec<ReplyValue>> for ReplyValue {
    fn from(items: Vec<ReplyValue>) -> Self {
        ReplyValue::Array(Some(items))
    }
}
