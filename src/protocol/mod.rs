//! Protocol Module
//!
//! Defines the RESP2 wire protocol spoken with the server.
//!
//! ## Request Format
//! Every request is an array of bulk strings:
//! ```text
//! ┌──────────┬──────────────────┬──────────────────┬─────┐
//! │ *<argc>  │ $<len> <name>    │ $<len> <arg1>    │ ... │
//! └──────────┴──────────────────┴──────────────────┴─────┘
//! ```
//!
//! ## Reply Types
//! - `+` Status:   `+OK\r\n`
//! - `-` Error:    `-ERR message\r\n`
//! - `:` Integer:  `:1000\r\n`
//! - `$` Bulk:     `$6\r\nfoobar\r\n`, null as `$-1\r\n`
//! - `*` Array:    `*2\r\n<reply><reply>`, null as `*-1\r\n`

mod command;
mod value;
mod encoder;
mod decoder;

pub use command::CommandRequest;
pub use value::ReplyValue;
pub use encoder::{encode_command, encode_to_vec};
pub use decoder::{
    DecoderLimits, ReplyDecoder,
    DEFAULT_MAX_ARRAY_LEN, DEFAULT_MAX_BULK_LEN, DEFAULT_MAX_DEPTH, DEFAULT_MAX_INLINE_LEN,
};
