//! # redwire
//!
//! A client for RESP-speaking key-value servers with:
//! - Blocking connections over TCP or Unix sockets
//! - Explicit pipelining with ordered reply reads
//! - MULTI / EXEC transactions with acknowledgment checks
//! - A non-blocking client driven by any readiness reactor
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │      Connection (sync)       │   │      AsyncClient (!Send)     │
//! │ call / queue / transaction   │   │ queue_with / handle_read ..  │
//! └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                │                                  │  Hooks
//!                │                                  ▼
//!                │                       ┌──────────────────────┐
//!                │                       │ EventLoop (embedder) │
//!                │                       └──────────┬───────────┘
//!                ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Protocol (encoder / decoder)                     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Transport (TCP / Unix socket)                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod connection;
pub mod async_client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RedwireError, ReplyError, Result};
pub use config::{Config, ReplyMode, StatusMode, TransactionReplies};
pub use protocol::{CommandRequest, ReplyValue};
pub use connection::{Connection, ConnectionState, Endpoint, TransactionOutcome};
pub use async_client::{AsyncClient, EventLoop, Hooks, Interest, InterestHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of redwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
