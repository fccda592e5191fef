//! Reply decoder
//!
//! Incremental, resumable parser for RESP2 replies.
//!
//! ## Reply Grammar
//! ```text
//! +<text>\r\n                 status
//! -<message>\r\n              error
//! :<i64>\r\n                  integer
//! $<len>\r\n<bytes>\r\n       bulk string   ($-1\r\n = null)
//! *<count>\r\n<reply>...      array         (*-1\r\n = null)
//! ```
//!
//! ## Resumption
//! Bytes are consumed one complete token at a time. Arrays that are still
//! waiting for elements live on an explicit frame stack, so a reply split
//! across any number of reads resumes exactly where it stopped, and nesting
//! depth never touches the native call stack.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{RedwireError, Result};
use super::ReplyValue;

/// Default maximum bulk string size (512 MB, the server's own default)
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Default maximum declared element count of one array
pub const DEFAULT_MAX_ARRAY_LEN: usize = 16 * 1024 * 1024;

/// Default maximum array nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default maximum length of a status/error/integer/length line (64 KB)
pub const DEFAULT_MAX_INLINE_LEN: usize = 64 * 1024;

/// Elements preallocated per array regardless of its declared count
const MAX_PREALLOC: usize = 1024;

/// Limits that keep a hostile or broken server from exhausting memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Maximum bulk string payload in bytes
    pub max_bulk_len: usize,

    /// Maximum declared element count of a single array
    pub max_array_len: usize,

    /// Maximum number of arrays open at once
    pub max_depth: usize,

    /// Maximum length of a line-terminated token before its CRLF
    pub max_inline_len: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            max_inline_len: DEFAULT_MAX_INLINE_LEN,
        }
    }
}

/// An array still collecting its elements
#[derive(Debug)]
struct Frame {
    remaining: usize,
    items: Vec<ReplyValue>,
}

/// Result of parsing one token from the front of the buffer
enum Token {
    /// A complete value (scalar, null, or empty array)
    Value(ReplyValue),
    /// An array header with this many (non-zero) elements to follow
    ArrayStart(usize),
}

/// Resumable reply decoder
///
/// Feed raw socket bytes with [`feed`](Self::feed), then call
/// [`decode`](Self::decode) until it returns `Ok(None)`.
#[derive(Debug)]
pub struct ReplyDecoder {
    buf: BytesMut,
    stack: Vec<Frame>,
    limits: DecoderLimits,
    broken: bool,
}

impl ReplyDecoder {
    /// Create a decoder with default limits
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    /// Create a decoder with explicit limits
    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self {
            buf: BytesMut::with_capacity(16 * 1024),
            stack: Vec::new(),
            limits,
            broken: false,
        }
    }

    /// Append bytes read from the transport
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Decode the next complete reply
    ///
    /// Returns `Ok(None)` when more bytes are needed. A protocol error is
    /// fatal: the decoder refuses to parse anything afterwards.
    pub fn decode(&mut self) -> Result<Option<ReplyValue>> {
        if self.broken {
            return Err(RedwireError::Protocol(
                "decoder is broken by an earlier protocol error".to_string(),
            ));
        }

        match self.decode_inner() {
            Ok(value) => Ok(value),
            Err(e) => {
                self.broken = true;
                self.stack.clear();
                self.buf.clear();
                Err(e)
            }
        }
    }

    /// Number of bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True while an array reply is partially decoded
    pub fn in_progress(&self) -> bool {
        !self.stack.is_empty()
    }

    /// True after a protocol error
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Drop all buffered bytes and partial state
    pub fn reset(&mut self) {
        self.buf.clear();
        self.stack.clear();
        self.broken = false;
    }

    fn decode_inner(&mut self) -> Result<Option<ReplyValue>> {
        loop {
            let mut value = match self.parse_token()? {
                None => return Ok(None),
                Some(Token::ArrayStart(count)) => {
                    if self.stack.len() >= self.limits.max_depth {
                        return Err(RedwireError::Protocol(format!(
                            "array nesting exceeds depth limit of {}",
                            self.limits.max_depth
                        )));
                    }
                    self.stack.push(Frame {
                        remaining: count,
                        items: Vec::with_capacity(count.min(MAX_PREALLOC)),
                    });
                    continue;
                }
                Some(Token::Value(value)) => value,
            };

            // Attach the finished value to its parent, closing every array
            // that this value completes.
            loop {
                let Some(frame) = self.stack.last_mut() else {
                    return Ok(Some(value));
                };
                frame.items.push(value);
                frame.remaining -= 1;
                if frame.remaining > 0 {
                    break;
                }
                let items = self.stack.pop().map(|done| done.items).unwrap_or_default();
                value = ReplyValue::Array(Some(items));
            }
        }
    }

    /// Parse one token from the front of the buffer, consuming it only when
    /// it is complete.
    fn parse_token(&mut self) -> Result<Option<Token>> {
        let Some(line_end) = self.find_crlf()? else {
            return Ok(None);
        };

        let marker = self.buf[0];
        let token = match marker {
            b'+' => {
                let text = String::from_utf8_lossy(&self.buf[1..line_end]).into_owned();
                self.buf.advance(line_end + 2);
                Token::Value(ReplyValue::Status(text))
            }
            b'-' => {
                let message = String::from_utf8_lossy(&self.buf[1..line_end]).into_owned();
                self.buf.advance(line_end + 2);
                Token::Value(ReplyValue::Error(message))
            }
            b':' => {
                let n = parse_i64(&self.buf[1..line_end])?;
                self.buf.advance(line_end + 2);
                Token::Value(ReplyValue::Integer(n))
            }
            b'$' => {
                let len = parse_i64(&self.buf[1..line_end])?;
                if len == -1 {
                    self.buf.advance(line_end + 2);
                    Token::Value(ReplyValue::Bulk(None))
                } else {
                    let len = self.check_len(len, self.limits.max_bulk_len, "bulk string")?;
                    let total = line_end + 2 + len + 2;
                    if self.buf.len() < total {
                        return Ok(None);
                    }
                    if &self.buf[total - 2..total] != b"\r\n" {
                        return Err(RedwireError::Protocol(
                            "bulk string payload not terminated by CRLF".to_string(),
                        ));
                    }
                    self.buf.advance(line_end + 2);
                    let data: Bytes = self.buf.split_to(len).freeze();
                    self.buf.advance(2);
                    Token::Value(ReplyValue::Bulk(Some(data)))
                }
            }
            b'*' => {
                let count = parse_i64(&self.buf[1..line_end])?;
                self.buf.advance(line_end + 2);
                if count == -1 {
                    Token::Value(ReplyValue::Array(None))
                } else {
                    match self.check_len(count, self.limits.max_array_len, "array")? {
                        0 => Token::Value(ReplyValue::Array(Some(Vec::new()))),
                        n => Token::ArrayStart(n),
                    }
                }
            }
            other => {
                return Err(RedwireError::Protocol(format!(
                    "unknown reply type marker: 0x{:02x}",
                    other
                )))
            }
        };

        Ok(Some(token))
    }

    /// Position of the first CRLF, or `None` if the line is incomplete
    fn find_crlf(&self) -> Result<Option<usize>> {
        let window = self.buf.len().min(self.limits.max_inline_len + 2);
        match self.buf[..window].windows(2).position(|w| w == b"\r\n") {
            Some(pos) => Ok(Some(pos)),
            None if self.buf.len() > self.limits.max_inline_len + 1 => {
                Err(RedwireError::Protocol(format!(
                    "reply line exceeds {} bytes without CRLF",
                    self.limits.max_inline_len
                )))
            }
            None => Ok(None),
        }
    }

    fn check_len(&self, len: i64, max: usize, what: &str) -> Result<usize> {
        if len < 0 {
            return Err(RedwireError::Protocol(format!(
                "invalid {} length: {}",
                what, len
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| RedwireError::Protocol(format!("{} length overflows: {}", what, len)))?;
        if len > max {
            return Err(RedwireError::Protocol(format!(
                "{} length {} exceeds limit of {}",
                what, len, max
            )));
        }
        Ok(len)
    }
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict decimal parse: optional leading '-', then one or more digits
fn parse_i64(data: &[u8]) -> Result<i64> {
    std::str::from_utf8(data)
        .ok()
        .filter(|s| {
            let digits = s.strip_prefix('-').unwrap_or(s);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        })
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            RedwireError::Protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(data)
            ))
        })
}
