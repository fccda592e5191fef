//! Encoder Tests
//!
//! Tests for request encoding and command construction.

use bytes::{Bytes, BytesMut};
use redwire::protocol::{encode_command, encode_to_vec, CommandRequest, ReplyDecoder, ReplyValue};
use redwire::RedwireError;

// =============================================================================
// Wire Format
// =============================================================================

#[test]
fn test_encode_name_only() {
    let bytes = encode_to_vec(&CommandRequest::ping()).unwrap();
    assert_eq!(bytes, b"*1\r\n$4\r\nPING\r\n");
}

#[test]
fn test_encode_set() {
    let bytes = encode_to_vec(&CommandRequest::set("foo", "bar")).unwrap();
    assert_eq!(bytes, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
}

#[test]
fn test_encode_binary_argument_unchanged() {
    let value = b"\x00\r\n\xff*$";
    let bytes = encode_to_vec(&CommandRequest::new("SET").arg("k").arg(value)).unwrap();

    let mut expected = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\n".to_vec();
    expected.extend_from_slice(value);
    expected.extend_from_slice(b"\r\n");
    assert_eq!(bytes, expected);
}

#[test]
fn test_encode_appends_back_to_back() {
    let mut out = BytesMut::new();
    encode_command(&CommandRequest::incr("n"), &mut out).unwrap();
    encode_command(&CommandRequest::get("n"), &mut out).unwrap();

    assert_eq!(
        &out[..],
        &b"*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n*2\r\n$3\r\nGET\r\n$1\r\nn\r\n"[..]
    );
}

#[test]
fn test_encode_large_argument_prefix() {
    let payload = vec![b'x'; 70_000];
    let bytes = encode_to_vec(&CommandRequest::new("ECHO").arg(&payload)).unwrap();
    assert!(bytes.starts_with(b"*2\r\n$4\r\nECHO\r\n$70000\r\n"));
    assert_eq!(bytes.len(), 14 + 8 + 70_000 + 2);
}

#[test]
fn test_empty_name_rejected() {
    let empty: CommandRequest = "   ".parse().unwrap();
    assert!(empty.is_empty());

    let mut out = BytesMut::new();
    match encode_command(&empty, &mut out) {
        Err(RedwireError::TypeMismatch(_)) => {}
        other => panic!("Expected type mismatch, got {:?}", other),
    }
    assert!(out.is_empty());

    let blank_name = CommandRequest::new("");
    assert!(matches!(
        encode_to_vec(&blank_name),
        Err(RedwireError::TypeMismatch(_))
    ));
}

/// Requests use the same grammar as array replies of bulk strings
#[test]
fn test_request_readable_by_reply_decoder() {
    let request = CommandRequest::new("MSET").args(["a", "1", "b", "2"]);
    let mut decoder = ReplyDecoder::new();
    decoder.feed(&encode_to_vec(&request).unwrap());

    let expected = ReplyValue::array(
        ["MSET", "a", "1", "b", "2"]
            .into_iter()
            .map(ReplyValue::bulk)
            .collect(),
    );
    assert_eq!(decoder.decode().unwrap(), Some(expected));
}

// =============================================================================
// Command Construction
// =============================================================================

#[test]
fn test_parse_splits_on_whitespace() {
    let request: CommandRequest = "  set  foo\tbar ".parse().unwrap();
    assert_eq!(request.len(), 3);
    assert_eq!(request.name(), b"set");
    assert!(request.is("SET"));
    assert_eq!(request.parts()[2], Bytes::from_static(b"bar"));
}

#[test]
fn test_from_conversions_agree() {
    let from_array = CommandRequest::from(["GET", "key"]);
    let from_vec = CommandRequest::from(vec!["GET".to_string(), "key".to_string()]);
    let from_slice = CommandRequest::from(&[b"GET".to_vec(), b"key".to_vec()][..]);

    assert_eq!(from_array, CommandRequest::get("key"));
    assert_eq!(from_vec, CommandRequest::get("key"));
    assert_eq!(from_slice, CommandRequest::get("key"));
}

#[test]
fn test_push_owned_argument() {
    let mut request = CommandRequest::new("DEL");
    request.push(Bytes::from_static(b"a"));
    request.push(Bytes::from_static(b"b"));
    assert_eq!(
        encode_to_vec(&request).unwrap(),
        b"*3\r\n$3\r\nDEL\r\n$1\r\na\r\n$1\r\nb\r\n"
    );
}

#[test]
fn test_command_table_names() {
    for (request, name) in [
        (CommandRequest::multi(), "MULTI"),
        (CommandRequest::exec(), "EXEC"),
        (CommandRequest::discard(), "DISCARD"),
        (CommandRequest::quit(), "QUIT"),
        (CommandRequest::command(), "COMMAND"),
        (CommandRequest::del("k"), "DEL"),
    ] {
        assert!(request.is(name), "{:?}", request);
    }
}
