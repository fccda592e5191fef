//! Blocking Connection
//!
//! One transport, an outbound buffer and an inbound decode cursor.

use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;

use crate::config::Config;
use crate::error::{RedwireError, Result};
use crate::protocol::{encode_command, CommandRequest, ReplyDecoder, ReplyValue};

use super::{ConnectionState, Endpoint, Transport};

/// A blocking client connection
///
/// Server error replies are returned as `ReplyValue::Error` values rather
/// than `Err`, so a pipeline with one failing command still yields one
/// reply per request. Use [`ReplyValue::into_result`] to turn them into
/// errors.
pub struct Connection {
    /// Socket, `None` once the connection is closed
    transport: Option<Transport>,

    /// Where to reconnect to; `None` for externally supplied transports
    endpoint: Option<Endpoint>,

    config: Config,

    /// Encoded requests not yet written
    write_buf: BytesMut,

    /// Scratch space for socket reads
    read_buf: Vec<u8>,

    decoder: ReplyDecoder,

    /// Requests written or buffered whose replies have not been read
    pending: usize,

    state: ConnectionState,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Connect to `host:port`, or to a Unix socket when `port` is `-1`
    ///
    /// Host and port are validated before any I/O; bad shapes are reported
    /// as `RedwireError::TypeMismatch`.
    pub fn connect(host: &str, port: i64) -> Result<Self> {
        let endpoint = Endpoint::from_parts(host, port)?;
        Self::open(Config::builder().endpoint(endpoint).build())
    }

    /// Connect to the endpoint in `config`
    pub fn open(config: Config) -> Result<Self> {
        tracing::debug!("Connecting to {}", config.endpoint);

        let transport = config.endpoint.connect(&config).map_err(|e| {
            tracing::warn!("Failed to connect to {}: {}", config.endpoint, e);
            e
        })?;

        let endpoint = config.endpoint.clone();
        let mut conn = Self::from_transport(transport, config);
        conn.endpoint = Some(endpoint);
        Ok(conn)
    }

    /// Wrap an already connected transport
    ///
    /// Such a connection cannot `reconnect`.
    pub fn from_transport(transport: Transport, config: Config) -> Self {
        let peer_addr = transport.peer_description();
        tracing::debug!("Connection established to {}", peer_addr);

        Self {
            transport: Some(transport),
            endpoint: None,
            write_buf: BytesMut::with_capacity(4 * 1024),
            read_buf: vec![0u8; config.read_chunk_size],
            decoder: ReplyDecoder::with_limits(config.decoder_limits),
            pending: 0,
            state: ConnectionState::Connected,
            peer_addr,
            config,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Send one command and wait for its reply
    ///
    /// Fails with `PipelineBusy` if queued replies have not been read yet,
    /// since the next reply on the wire would belong to an earlier request.
    pub fn call(&mut self, command: impl Into<CommandRequest>) -> Result<ReplyValue> {
        if self.pending > 0 {
            return Err(RedwireError::PipelineBusy {
                pending: self.pending,
            });
        }
        self.append(command)?;
        self.reply()
    }

    /// Buffer a command without writing it
    pub fn append(&mut self, command: impl Into<CommandRequest>) -> Result<()> {
        self.ensure_connected()?;
        let command = command.into();
        encode_command(&command, &mut self.write_buf)?;
        self.pending += 1;
        tracing::trace!(
            "Queued {} for {} ({} pending)",
            String::from_utf8_lossy(command.name()),
            self.peer_addr,
            self.pending
        );
        Ok(())
    }

    /// Buffer a command for pipelining; same as [`append`](Self::append)
    pub fn queue(&mut self, command: impl Into<CommandRequest>) -> Result<()> {
        self.append(command)
    }

    /// Write any buffered commands, then block until the next reply arrives
    pub fn reply(&mut self) -> Result<ReplyValue> {
        let value = self.next_raw_reply()?;
        Ok(value.apply_status_mode(self.config.reply_mode.status))
    }

    /// Read one reply for every command queued since the last drain
    pub fn bulk_reply(&mut self) -> Result<Vec<ReplyValue>> {
        if self.pending == 0 {
            return Err(RedwireError::NothingQueued);
        }

        let count = self.pending;
        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            replies.push(self.reply()?);
        }
        Ok(replies)
    }

    /// Write all buffered commands
    pub fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }

        let transport = self.transport.as_mut().ok_or(RedwireError::NotConnected)?;
        let result = transport
            .write_all(&self.write_buf)
            .and_then(|_| transport.flush());

        match result {
            Ok(()) => {
                self.write_buf.clear();
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the connection; pending replies are discarded
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            self.state = ConnectionState::Closing;
            let _ = transport.shutdown();
            tracing::debug!("Disconnected from {}", self.peer_addr);
        }
        self.reset_buffers();
        self.state = ConnectionState::Disconnected;
    }

    /// Explicitly re-establish the connection to the configured endpoint
    ///
    /// Buffered commands and unread replies are dropped.
    pub fn reconnect(&mut self) -> Result<()> {
        let endpoint = self.endpoint.clone().ok_or_else(|| {
            RedwireError::Config("connection was not opened from an endpoint".to_string())
        })?;

        self.disconnect();
        self.state = ConnectionState::Connecting;
        tracing::debug!("Reconnecting to {}", endpoint);

        match endpoint.connect(&self.config) {
            Ok(transport) => {
                self.peer_addr = transport.peer_description();
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to reconnect to {}: {}", endpoint, e);
                self.state = ConnectionState::ClosedWithError;
                Err(e)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of requests whose replies have not been read
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Next reply exactly as decoded, before any status presentation
    pub(super) fn next_raw_reply(&mut self) -> Result<ReplyValue> {
        self.ensure_connected()?;
        if self.pending == 0 {
            return Err(RedwireError::NothingQueued);
        }

        self.flush()?;
        let value = self.read_reply()?;
        self.pending -= 1;
        Ok(value)
    }

    /// Queue pre-encoded requests, counting `count` replies
    pub(super) fn append_encoded(&mut self, encoded: &[u8], count: usize) -> Result<()> {
        self.ensure_connected()?;
        self.write_buf.extend_from_slice(encoded);
        self.pending += count;
        Ok(())
    }

    /// Tear the connection down after a fatal error and hand the error back
    pub(super) fn fail(&mut self, err: RedwireError) -> RedwireError {
        match &err {
            RedwireError::Eof => tracing::debug!("Server {} closed the connection", self.peer_addr),
            other => tracing::warn!("Connection to {} failed: {}", self.peer_addr, other),
        }
        self.state = ConnectionState::Closing;
        self.transport = None;
        self.reset_buffers();
        self.state = ConnectionState::ClosedWithError;
        err
    }

    fn read_reply(&mut self) -> Result<ReplyValue> {
        loop {
            match self.decoder.decode() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e)),
            }

            let Some(transport) = self.transport.as_mut() else {
                return Err(RedwireError::NotConnected);
            };
            match transport.read(&mut self.read_buf) {
                Ok(0) => return Err(self.fail(RedwireError::Eof)),
                Ok(n) => self.decoder.feed(&self.read_buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.is_connected() && self.transport.is_some() {
            Ok(())
        } else {
            Err(RedwireError::NotConnected)
        }
    }

    fn reset_buffers(&mut self) {
        self.write_buf.clear();
        self.decoder.reset();
        self.pending = 0;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.pending > 0 {
            tracing::debug!(
                "Dropping connection to {} with {} unread replies",
                self.peer_addr,
                self.pending
            );
        }
    }
}
