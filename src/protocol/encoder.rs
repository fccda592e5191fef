//! Request encoder
//!
//! Turns a `CommandRequest` into the RESP request format.
//!
//! ## Wire Format
//! ```text
//! *<argc>\r\n
//! $<len(arg0)>\r\n<arg0>\r\n
//! $<len(arg1)>\r\n<arg1>\r\n
//! ...
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{RedwireError, Result};
use super::CommandRequest;

/// Digits plus sign and CRLF for the largest usize prefix
const PREFIX_OVERHEAD: usize = 1 + 20 + 2;

/// Encode a command and append it to `out`
///
/// Arguments are never inspected; only an empty command name is rejected.
pub fn encode_command(command: &CommandRequest, out: &mut BytesMut) -> Result<()> {
    if command.name().is_empty() {
        return Err(RedwireError::TypeMismatch(
            "command name must be a non-empty string".to_string(),
        ));
    }

    out.reserve(encoded_len(command));

    write_prefix(out, b'*', command.len());
    for arg in command.parts() {
        write_prefix(out, b'$', arg.len());
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }

    Ok(())
}

/// Encode a command into a fresh buffer
pub fn encode_to_vec(command: &CommandRequest) -> Result<Vec<u8>> {
    let mut out = BytesMut::with_capacity(encoded_len(command));
    encode_command(command, &mut out)?;
    Ok(out.to_vec())
}

/// Upper bound on the encoded size, used to reserve once per command
fn encoded_len(command: &CommandRequest) -> usize {
    command
        .parts()
        .iter()
        .map(|arg| PREFIX_OVERHEAD + arg.len() + 2)
        .sum::<usize>()
        + PREFIX_OVERHEAD
}

fn write_prefix(out: &mut BytesMut, marker: u8, len: usize) {
    let mut digits = [0u8; 20];
    let mut idx = digits.len();
    let mut value = len;
    loop {
        idx -= 1;
        digits[idx] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }

    out.put_u8(marker);
    out.put_slice(&digits[idx..]);
    out.put_slice(b"\r\n");
}
