//! Connection Module
//!
//! Blocking client connections.
//!
//! ## Usage Modes
//! - `call`: encode, flush, and wait for exactly one reply
//! - `queue` / `append` + `reply` / `bulk_reply`: explicit pipelining
//! - `transaction`: MULTI / queued commands / EXEC with acknowledgment checks
//!
//! ## Ownership
//! A connection is owned by one thread at a time; blocking operations take
//! `&mut self`, so overlapping calls on the same connection do not compile.

mod transport;
mod blocking;
mod transaction;

pub use transport::{Endpoint, Transport, DEFAULT_PORT, UNIX_SOCKET_PORT};
pub use blocking::Connection;
pub use transaction::TransactionOutcome;

use std::fmt;

/// Lifecycle of a connection
///
/// ```text
/// Disconnected ──open──▶ Connecting ──ok──▶ Connected ──disconnect / fatal──▶ Closing
///                             │                                                 │
///                             └──────fail──────▶ ClosedWithError ◀──────────────┤
///                                                  Disconnected ◀───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    ClosedWithError,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::ClosedWithError => "closed with error",
        };
        f.write_str(name)
    }
}
