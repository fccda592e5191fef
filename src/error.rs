//! Error types for redwire
//!
//! Provides a unified error type for all client operations.

use std::fmt;

use thiserror::Error;

use crate::protocol::ReplyValue;

/// Result type alias using RedwireError
pub type Result<T> = std::result::Result<T, RedwireError>;

/// Unified error type for redwire operations
#[derive(Debug, Error)]
pub enum RedwireError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection. A specialization of an I/O failure.
    #[error("End of stream: server closed the connection")]
    Eof,

    #[error("Not connected")]
    NotConnected,

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Reply Errors
    // -------------------------------------------------------------------------
    #[error("Reply error: {0}")]
    Reply(ReplyError),

    #[error("Transaction aborted by reply: {cause}")]
    TransactionAborted { cause: ReplyValue },

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Nothing queued yet")]
    NothingQueued,

    #[error("Cannot call while {pending} queued replies are unread")]
    PipelineBusy { pending: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RedwireError {
    /// True for transport faults, including an orderly close by the peer.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, RedwireError::Io(_) | RedwireError::Eof)
    }

    /// True when the peer closed the connection.
    pub fn is_eof(&self) -> bool {
        matches!(self, RedwireError::Eof)
    }

    /// Errors after which the connection must not be used for further I/O.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RedwireError::Io(_) | RedwireError::Eof | RedwireError::Protocol(_)
        )
    }
}

/// An application-level error reply sent by the server, e.g.
/// `-ERR unknown command 'foo'` or `-WRONGTYPE Operation against a key...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyError {
    message: String,
}

impl ReplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Full message as sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The leading upper-case word, conventionally the error class.
    pub fn kind(&self) -> &str {
        self.message.split_whitespace().next().unwrap_or("")
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
