//! Configuration for redwire
//!
//! Centralized configuration with sensible defaults.

use crate::connection::Endpoint;
use crate::protocol::DecoderLimits;

/// Main configuration for a connection or async client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Where to connect: TCP host/port or a Unix socket path
    pub endpoint: Endpoint,

    /// Disable Nagle's algorithm on TCP connections
    pub nodelay: bool,

    /// Size of each socket read (bytes)
    pub read_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Reply Configuration
    // -------------------------------------------------------------------------
    /// How status replies and transaction results are surfaced
    pub reply_mode: ReplyMode,

    /// Limits applied while decoding replies
    pub decoder_limits: DecoderLimits,
}

/// Reply presentation settings.
///
/// Status replies and transaction results have two incompatible but equally
/// common conventions, so both are selectable rather than fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyMode {
    pub status: StatusMode,
    pub transaction: TransactionReplies,
}

/// How `+OK`-style status replies are returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusMode {
    /// Keep them as `ReplyValue::Status`
    #[default]
    Tagged,

    /// Return them as plain bulk strings, indistinguishable from `$` replies
    Text,
}

/// What a successful transaction returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionReplies {
    /// `[OK, QUEUED, ..., [results]]`: every acknowledgment plus the commit array
    #[default]
    Full,

    /// Only the commit array's elements
    ResultsOnly,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            nodelay: true,
            read_chunk_size: 16 * 1024, // 16 KB
            reply_mode: ReplyMode::default(),
            decoder_limits: DecoderLimits::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the endpoint to connect to
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set the socket read size (in bytes)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Set both reply presentation settings
    pub fn reply_mode(mut self, mode: ReplyMode) -> Self {
        self.config.reply_mode = mode;
        self
    }

    /// Set how status replies are returned
    pub fn status_mode(mut self, mode: StatusMode) -> Self {
        self.config.reply_mode.status = mode;
        self
    }

    /// Set what a successful transaction returns
    pub fn transaction_replies(mut self, replies: TransactionReplies) -> Self {
        self.config.reply_mode.transaction = replies;
        self
    }

    /// Set the decoder limits
    pub fn decoder_limits(mut self, limits: DecoderLimits) -> Self {
        self.config.decoder_limits = limits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
